// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Protocol elaboration: rewrites stable-to-stable transitions into chains
//! through synthesized transient states so that no cache ever stalls waiting
//! on an in-flight peer transaction.
//!
//! Pre-ordered transients (`_A`, `_AD`) have issued a request and await the
//! interconnect's ordering acknowledgement; post-ordered transients (`_D`)
//! are ordered and await data. Own-events that acquire permission become an
//! `_AD`/`_D` chain; other-events that degrade a source non-linearly get an
//! `_A` interposed.

use log::debug;

use crate::interleave::{interleave_post_ordered, interleave_pre_ordered};
use crate::latency::{requires_transient, SystemModel};
use crate::protocol::{Protocol, ProtocolError};
use crate::state::State;
use crate::transition::{Action, Event};

/// Runs the full elaboration pipeline over a loaded protocol, returning the
/// number of stall self-loops added by the completion pass.
pub fn elaborate(protocol: &mut Protocol, model: SystemModel) -> Result<usize, ProtocolError> {
    atomic_own(protocol);
    atomic_other(protocol, model)?;
    interleave_pre_ordered(protocol, model)?;
    interleave_post_ordered(protocol, model)?;
    synthesize_replacements(protocol)?;
    // Replacements introduce fresh pre-ordered states whose other-event
    // reachability still has to be closed.
    interleave_pre_ordered(protocol, model)?;
    Ok(complete_stalls(protocol))
}

/// Expands own-events that acquire access permission into the canonical
/// request-issued / ordered / data-received chain:
///
/// ```text
/// src --evt--> <src><dst>_AD --Ordered--> <src><dst>_D --Data--> dst
/// ```
///
/// Sources that already hold full permission upgrade silently and keep their
/// stable transition.
pub fn atomic_own(protocol: &mut Protocol) {
    let snapshot = protocol.transitions().to_vec();
    for t in snapshot {
        if !t.event.is_own() {
            continue;
        }
        let source_weight = protocol.raw_encoding(t.source).ap_weight();
        if source_weight >= 2 || source_weight == protocol.raw_encoding(t.destination).ap_weight() {
            continue;
        }

        let src_label = protocol.label(t.source).to_string();
        let dst_label = protocol.label(t.destination).to_string();
        let ordered = protocol.add_pre_ordered_state(State::transient(
            format!("{src_label}{dst_label}_AD"),
            t.source,
            t.destination,
            None,
            true,
            protocol.copied_encoding(t.source),
        ));
        let waiting = protocol.add_post_ordered_state(State::transient(
            format!("{src_label}{dst_label}_D"),
            t.source,
            t.destination,
            Some(ordered),
            false,
            protocol.copied_encoding(t.destination),
        ));

        protocol.remove_transition(&t);
        let issue = protocol.new_transition(t.source, t.event, ordered);
        protocol.add_transition(issue);
        let acked = protocol.new_transition(ordered, Event::Ordered, waiting);
        protocol.add_transition(acked);
        let filled = protocol.new_transition(waiting, Event::Data, t.destination);
        protocol.add_transition(filled);
    }
}

/// Interposes a pre-ordered transient on every non-linear other-event that
/// degrades a non-invalid source:
///
/// ```text
/// src --evt--> <src><dst>_A --Ordered--> dst
/// ```
///
/// The `Ordered` edge sends data directly under `direct` and writes back
/// through memory under `memory`. Linear transitions from an active source
/// are annotated with `Send data` under `direct` and otherwise left alone.
pub fn atomic_other(protocol: &mut Protocol, model: SystemModel) -> Result<(), ProtocolError> {
    let snapshot = protocol.transitions().to_vec();
    for t in snapshot {
        if !t.event.is_other() {
            continue;
        }
        if t.source == t.destination || protocol.raw_encoding(t.source).ap_weight() == 0 {
            continue;
        }

        if requires_transient(protocol, &t, model)? {
            let label = format!(
                "{}{}_A",
                protocol.label(t.source),
                protocol.label(t.destination)
            );
            let transient = protocol.add_pre_ordered_state(State::transient(
                label,
                t.source,
                t.destination,
                None,
                true,
                protocol.copied_encoding(t.source),
            ));
            protocol.remove_transition(&t);
            let issue = protocol.new_transition(t.source, t.event, transient);
            protocol.add_transition(issue);
            let action = match model {
                SystemModel::Direct => Action::SendData,
                SystemModel::Memory => Action::WriteBackData,
            };
            let ordered = protocol
                .new_transition(transient, Event::Ordered, t.destination)
                .with_action(action);
            protocol.add_transition(ordered);
        } else if protocol.raw_encoding(t.source).pcp_weight() > 0 && model == SystemModel::Direct {
            protocol.set_action(&t, Action::SendData);
        }
    }
    Ok(())
}

/// Adds an eviction path from every stable non-invalid state to the invalid
/// stable state. States holding data authority or dirty data go through a
/// pre-ordered transient; the `Ordered` edge writes back exactly when the
/// evicted state was dirty. Plain readers drop straight to invalid.
pub fn synthesize_replacements(protocol: &mut Protocol) -> Result<(), ProtocolError> {
    let invalid = protocol.invalid_stable_state()?;
    let stable: Vec<_> = protocol
        .states()
        .iter()
        .copied()
        .filter(|&id| !protocol.is_transient(id))
        .collect();

    for s in stable {
        let encoding = protocol.raw_encoding(s);
        if encoding.pcp_weight() > 0 || encoding.smp_weight() > 0 {
            let label = format!("{}{}_A", protocol.label(s), protocol.label(invalid));
            let transient = protocol.add_pre_ordered_state(State::transient(
                label,
                s,
                invalid,
                None,
                true,
                protocol.copied_encoding(s),
            ));
            let evict = protocol.new_transition(s, Event::Replacement, transient);
            protocol.add_transition(evict);
            let mut ordered = protocol.new_transition(transient, Event::Ordered, invalid);
            if encoding.smp_weight() > 0 {
                ordered = ordered.with_action(Action::WriteBackData);
            }
            protocol.add_transition(ordered);
        } else if encoding.ap_weight() > 0 {
            let evict = protocol.new_transition(s, Event::Replacement, invalid);
            protocol.add_transition(evict);
        }
    }
    Ok(())
}

/// Totality pass: any transient still missing an `OtherRead` or `OtherWrite`
/// entry after elaboration receives a `Stall` self-loop. Returns how many
/// loops were added.
pub fn complete_stalls(protocol: &mut Protocol) -> usize {
    let mut added = 0;
    let states: Vec<_> = protocol.states().to_vec();
    for s in states {
        if !protocol.is_transient(s) {
            continue;
        }
        for event in [Event::OtherRead, Event::OtherWrite] {
            let covered = protocol
                .transitions()
                .iter()
                .any(|t| t.source == s && t.event == event);
            if !covered {
                debug!("stalling {} on {event}", protocol.label(s));
                protocol.push_stall(s);
                added += 1;
            }
        }
    }
    added
}
