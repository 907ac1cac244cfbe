// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reachability closure of transient states under concurrent peer activity.
//!
//! While a cache sits in a transient state, other caches keep issuing reads
//! and writes. These passes give every pre-ordered and post-ordered state an
//! outcome for `OtherRead`/`OtherWrite`, synthesizing further transients
//! when the peer move changes where the waiting cache will land. Both loops
//! process states appended during their own run, so closure is reached in a
//! single sweep.

use log::debug;

use crate::latency::{requires_transient, SystemModel};
use crate::protocol::{Protocol, ProtocolError};
use crate::state::State;
use crate::transition::{Action, Event};

const OTHER_EVENTS: [Event; 2] = [Event::OtherRead, Event::OtherWrite];

/// Closes every pre-ordered transient over the other-events.
///
/// With `src` the transient's stable source, `dst` its intended destination
/// and `next = δ(src, evt)`:
///
/// 1. `next` weighing the same as the transient itself: stationary
///    self-loop.
/// 2. Intended upgrade overtaken by an invalidation (`src.AP < dst.AP`,
///    `next.AP = 0`): the request is reissued from `next`, chaining a new
///    `<next><dst>_AD`.
/// 3. Intended downgrade (`src.AP > dst.AP`) from an active source, when
///    either side reaches invalid: under `memory` the line retreats to the
///    invalid stable state through `<I><I>_A`, sending data along; under
///    `direct` a `<src><next>_A` re-targets `next`, writing back when the
///    source was dirty and otherwise communicating the hand-off.
/// 4. Loss of peer-copy authority (`src.PCP > next.PCP`): a chained
///    `<next><dst>_AD` takes over, sending data to the new requestor.
pub fn interleave_pre_ordered(
    protocol: &mut Protocol,
    model: SystemModel,
) -> Result<(), ProtocolError> {
    let mut index = 0;
    while index < protocol.pre_ordered_states().len() {
        let ts = protocol.pre_ordered_states()[index];
        index += 1;
        for event in OTHER_EVENTS {
            let source = protocol.effective_source(ts);
            let Some(next) = protocol.input_destination(source, event) else {
                continue;
            };
            let Some(dst) = protocol.intended_destination(ts) else {
                continue;
            };

            if protocol.raw_encoding(next).same_weights(&protocol.raw_encoding(ts)) {
                let still = protocol.new_transition(ts, event, ts);
                protocol.add_transition(still);
                continue;
            }

            let source_weight = protocol.raw_encoding(source).ap_weight();
            let dst_weight = protocol.raw_encoding(dst).ap_weight();
            let next_weight = protocol.raw_encoding(next).ap_weight();

            if source_weight < dst_weight && next_weight == 0 {
                let label = format!("{}{}_AD", protocol.label(next), protocol.label(dst));
                debug!("reissuing {} as {label} on {event}", protocol.label(ts));
                let reissued = protocol.add_pre_ordered_state(State::transient(
                    label,
                    next,
                    dst,
                    Some(ts),
                    true,
                    protocol.copied_encoding(next),
                ));
                let t = protocol.new_transition(ts, event, reissued);
                protocol.add_transition(t);
            } else if source_weight > dst_weight {
                let active = protocol.raw_encoding(source).pcp_weight() == 1;
                if active && (next_weight == 0 || dst_weight == 0) {
                    match model {
                        SystemModel::Memory => {
                            let invalid = protocol.invalid_stable_state()?;
                            let label = format!(
                                "{}{}_A",
                                protocol.label(invalid),
                                protocol.label(invalid)
                            );
                            let retreat = protocol.add_pre_ordered_state(State::transient(
                                label,
                                ts,
                                invalid,
                                Some(ts),
                                true,
                                protocol.copied_encoding(invalid),
                            ));
                            let supply = protocol
                                .new_transition(ts, event, retreat)
                                .with_action(Action::SendData);
                            protocol.add_transition(supply);
                            let settle =
                                protocol.new_transition(retreat, Event::Ordered, invalid);
                            protocol.add_transition(settle);
                        }
                        SystemModel::Direct => {
                            if dst_weight != next_weight {
                                let label = format!(
                                    "{}{}_A",
                                    protocol.label(source),
                                    protocol.label(next)
                                );
                                let retarget = protocol.add_pre_ordered_state(State::transient(
                                    label,
                                    ts,
                                    next,
                                    Some(ts),
                                    true,
                                    protocol.copied_encoding(source),
                                ));
                                let t = protocol.new_transition(ts, event, retarget);
                                protocol.add_transition(t);
                                let action = if protocol.raw_encoding(source).smp_weight() > 0 {
                                    Action::WriteBackData
                                } else {
                                    Action::CommunicateMessage
                                };
                                let settle = protocol
                                    .new_transition(retarget, Event::Ordered, next)
                                    .with_action(action);
                                protocol.add_transition(settle);
                            } else {
                                let still = protocol.new_transition(ts, event, ts);
                                protocol.add_transition(still);
                            }
                        }
                    }
                } else {
                    let still = protocol.new_transition(ts, event, ts);
                    protocol.add_transition(still);
                }
            } else if protocol.raw_encoding(source).pcp_weight()
                > protocol.raw_encoding(next).pcp_weight()
            {
                let label = format!("{}{}_AD", protocol.label(next), protocol.label(dst));
                let handoff = protocol.add_pre_ordered_state(State::transient(
                    label,
                    ts,
                    dst,
                    Some(ts),
                    true,
                    protocol.copied_encoding(next),
                ));
                let supply = protocol
                    .new_transition(ts, event, handoff)
                    .with_action(Action::SendData);
                protocol.add_transition(supply);
            }
        }
    }
    Ok(())
}

/// Closes every post-ordered transient over the other-events.
///
/// A post-ordered state is already ordered, so a peer move matters only when
/// it changes the access permission of the intended destination. When it
/// does, a chained `<ts><next>_D` tracks the new landing point; the latency
/// analyzer then decides whether the final `Data` hop may go straight to
/// `next` or has to pass through a pre-ordered `<rootDst><next>_A` first.
pub fn interleave_post_ordered(
    protocol: &mut Protocol,
    model: SystemModel,
) -> Result<(), ProtocolError> {
    let mut index = 0;
    while index < protocol.post_ordered_states().len() {
        let ts = protocol.post_ordered_states()[index];
        index += 1;
        for event in OTHER_EVENTS {
            let Some(dst) = protocol.intended_destination(ts) else {
                continue;
            };
            let Some(next) = protocol.input_destination(dst, event) else {
                continue;
            };
            if protocol.raw_encoding(next).ap_weight() == protocol.raw_encoding(dst).ap_weight() {
                let still = protocol.new_transition(ts, event, ts);
                protocol.add_transition(still);
                continue;
            }

            let label = format!("{}{}_D", protocol.label(ts), protocol.label(next));
            let retargeted = protocol.add_post_ordered_state(State::transient(
                label,
                ts,
                next,
                Some(ts),
                false,
                protocol.copied_encoding(next),
            ));
            let t = protocol.new_transition(ts, event, retargeted);
            protocol.add_transition(t);

            // Root of the transient chain, full walk.
            let mut root = ts;
            while let Some(parent) = protocol.parent(root) {
                root = parent;
            }

            let probe = protocol.new_transition(dst, event, next);
            if requires_transient(protocol, &probe, model)? {
                let root_dst = protocol.intended_destination(root).unwrap_or(root);
                let label = format!("{}{}_A", protocol.label(root_dst), protocol.label(next));
                debug!(
                    "non-linear data return for {}, interposing {label}",
                    protocol.label(retargeted)
                );
                let guarded = protocol.add_pre_ordered_state(State::transient(
                    label,
                    retargeted,
                    next,
                    Some(ts),
                    true,
                    protocol.copied_encoding(retargeted),
                ));
                let data = protocol.new_transition(retargeted, Event::Data, guarded);
                protocol.add_transition(data);
            } else {
                let data = protocol.new_transition(retargeted, Event::Data, next);
                protocol.add_transition(data);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elaborate::{atomic_other, atomic_own};
    use crate::parse::parse_protocol;
    use crate::transition::Transition;

    const MSI: &str = "\
# @ State modeling
M -> (write, active, dirty)
S -> (read, passive, clean)
I -> (invalid, passive, clean)
# @ Txn specs
(I, OwnReadM) -> S
(I, OwnReadP) -> S
(I, OwnWriteM) -> M
(I, OwnWriteP) -> M
(I, OtherRead) -> I
(I, OtherWrite) -> I
(S, OwnReadM) -> S
(S, OwnReadP) -> S
(S, OwnWriteM) -> M
(S, OwnWriteP) -> M
(S, OtherRead) -> S
(S, OtherWrite) -> I
(M, OwnReadM) -> M
(M, OwnReadP) -> M
(M, OwnWriteM) -> M
(M, OwnWriteP) -> M
(M, OtherRead) -> S
(M, OtherWrite) -> I
";

    fn bus_elaborated(model: SystemModel) -> Protocol {
        let mut protocol = parse_protocol(MSI).unwrap();
        atomic_own(&mut protocol);
        atomic_other(&mut protocol, model).unwrap();
        protocol
    }

    fn edge<'a>(
        protocol: &'a Protocol,
        src: &str,
        event: Event,
        dst: &str,
    ) -> Option<&'a Transition> {
        let src = protocol.find_state(src)?;
        let dst = protocol.find_state(dst)?;
        protocol
            .transitions()
            .iter()
            .find(|t| t.source == src && t.event == event && t.destination == dst)
    }

    #[test]
    fn stationary_transients_self_loop() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();

        for label in ["IS_AD", "IM_AD"] {
            assert!(edge(&protocol, label, Event::OtherRead, label).is_some());
            assert!(edge(&protocol, label, Event::OtherWrite, label).is_some());
        }
        assert!(edge(&protocol, "MS_A", Event::OtherRead, "MS_A").is_some());
    }

    #[test]
    fn overtaken_upgrade_chains_a_new_request() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();

        // An invalidation under SM_AD restarts the write request from I.
        assert!(edge(&protocol, "SM_AD", Event::OtherWrite, "IM_AD").is_some());
        let im_ad = protocol.find_state("IM_AD").unwrap();
        assert!(protocol.state(im_ad).is_pre_ordered());
    }

    #[test]
    fn active_downgrade_retargets_under_direct() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();

        // MS_A overtaken by a write: the dirty owner re-targets I.
        assert!(edge(&protocol, "MS_A", Event::OtherWrite, "MI_A").is_some());
        let ordered = edge(&protocol, "MI_A", Event::Ordered, "I").unwrap();
        assert_eq!(ordered.action, Some(Action::WriteBackData));
        // The synthesized MI_A folds back into MS_A when a read overtakes.
        assert!(edge(&protocol, "MI_A", Event::OtherRead, "MS_A").is_some());
        assert!(edge(&protocol, "MI_A", Event::OtherWrite, "MI_A").is_some());
    }

    #[test]
    fn active_downgrade_retreats_to_invalid_under_memory() {
        let mut protocol = bus_elaborated(SystemModel::Memory);
        interleave_pre_ordered(&mut protocol, SystemModel::Memory).unwrap();

        let supply = edge(&protocol, "MS_A", Event::OtherWrite, "II_A").unwrap();
        assert_eq!(supply.action, Some(Action::SendData));
        assert!(edge(&protocol, "II_A", Event::Ordered, "I").is_some());
        assert!(edge(&protocol, "MI_A", Event::OtherRead, "II_A").is_some());
    }

    #[test]
    fn post_ordered_tracks_destination_changes() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();
        interleave_post_ordered(&mut protocol, SystemModel::Direct).unwrap();

        // Waiting for S, a peer write moves the landing point to I.
        assert!(edge(&protocol, "IS_D", Event::OtherWrite, "IS_DI_D").is_some());
        assert!(edge(&protocol, "IS_DI_D", Event::Data, "I").is_some());
        // Waiting for S while nothing changes: self-loop.
        assert!(edge(&protocol, "IS_D", Event::OtherRead, "IS_D").is_some());
    }

    #[test]
    fn post_ordered_guards_non_linear_data_return() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();
        interleave_post_ordered(&mut protocol, SystemModel::Direct).unwrap();

        // Waiting for M, a peer read drops the landing point to S, and the
        // M -> S hand-off itself is non-linear: the Data hop detours through
        // the pre-ordered MS_A named after the chain root's destination.
        assert!(edge(&protocol, "IM_D", Event::OtherRead, "IM_DS_D").is_some());
        let data = edge(&protocol, "IM_DS_D", Event::Data, "MS_A").unwrap();
        assert_eq!(data.action, None);
        assert!(edge(&protocol, "SM_DS_D", Event::Data, "MS_A").is_some());
    }

    #[test]
    fn interleaving_is_idempotent() {
        let mut protocol = bus_elaborated(SystemModel::Direct);
        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();
        interleave_post_ordered(&mut protocol, SystemModel::Direct).unwrap();
        let transitions = protocol.transitions().len();
        let states = protocol.states().len();

        interleave_pre_ordered(&mut protocol, SystemModel::Direct).unwrap();
        interleave_post_ordered(&mut protocol, SystemModel::Direct).unwrap();
        assert_eq!(protocol.transitions().len(), transitions);
        assert_eq!(protocol.states().len(), states);
    }
}
