// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asymptotic worst-case-access-latency analysis. A transition is
//! *non-linear* when a racing own-event at a peer cache can strictly degrade
//! the shared-memory or peer-copy observability of the party that did not
//! trigger it, which means the transition cannot complete atomically at the
//! chosen interconnect level and elaboration must interpose a transient.

use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::protocol::{Protocol, ProtocolError};
use crate::transition::{Event, Transition};
use crate::view::StateView;

/// Interconnect model: `Direct` is point-to-point cache-to-cache
/// communication, `Memory` routes every peer interaction through shared
/// memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemModel {
    Direct,
    Memory,
}

impl fmt::Display for SystemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SystemModel::Direct => "direct",
            SystemModel::Memory => "memory",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown system model `{0}` (expected `direct` or `memory`)")]
pub struct UnknownModelError(String);

impl FromStr for SystemModel {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(SystemModel::Direct),
            "memory" => Ok(SystemModel::Memory),
            _ => Err(UnknownModelError(s.to_string())),
        }
    }
}

/// Classifies every input transition, recording the split on the protocol.
pub fn classify(protocol: &mut Protocol, model: SystemModel) -> Result<(), ProtocolError> {
    let input = protocol.input_transitions().to_vec();
    for transition in input {
        if requires_transient(protocol, &transition, model)? {
            debug!(
                "non-linear under {model}: {}",
                protocol.describe_transition(&transition)
            );
            protocol.record_non_linear(transition);
        } else {
            protocol.record_linear(transition);
        }
    }
    Ok(())
}

/// Decides whether `transition` needs a transient state under `model`.
///
/// Only other-events are analysed. For each racing (own, other) event pair
/// and each candidate peer state, the pre-view pairs the peer with the
/// analysed source and the post-view pairs the two δ destinations; the
/// transition is non-linear as soon as one such move monotonically loses
/// SMP or PCP standing for the cache under analysis.
pub fn requires_transient(
    protocol: &Protocol,
    transition: &Transition,
    model: SystemModel,
) -> Result<bool, ProtocolError> {
    let source_active = protocol.raw_encoding(transition.source).pcp_weight() > 0;
    let (pairs, candidates, base, broadcast_skip) = match transition.event {
        Event::OtherRead => {
            let pairs: Vec<(Event, Event)> = if source_active {
                vec![(Event::OwnReadP, Event::OtherRead)]
            } else {
                vec![
                    (Event::OwnReadM, Event::OtherRead),
                    (Event::OwnReadP, Event::OtherRead),
                ]
            };
            // An active source can only race an invalid peer: any other
            // concurrent holder would break the view budget anyway.
            let candidates = if source_active {
                vec![protocol.invalid_stable_state()?]
            } else {
                protocol.states().to_vec()
            };
            (pairs, candidates, transition.stable_source, true)
        }
        Event::OtherWrite => {
            let pairs: Vec<(Event, Event)> = if source_active {
                vec![(Event::OwnWriteP, Event::OtherWrite)]
            } else {
                vec![
                    (Event::OwnWriteM, Event::OtherWrite),
                    (Event::OwnWriteP, Event::OtherWrite),
                ]
            };
            (pairs, protocol.states().to_vec(), transition.source, false)
        }
        _ => return Ok(false),
    };

    for (own_event, other_event) in pairs {
        for &candidate in &candidates {
            let peer = if protocol.is_transient(candidate) {
                protocol.effective_source(candidate)
            } else {
                candidate
            };
            let pre = StateView::new(peer, base);
            if !pre.is_valid(protocol) {
                continue;
            }
            let Some(d1) = protocol.input_destination(peer, own_event) else {
                continue;
            };
            let Some(d2) = protocol.input_destination(base, other_event) else {
                continue;
            };
            // Self-loop destinations are broadcasts, not races.
            if broadcast_skip && (d1 == peer || d2 == base) {
                continue;
            }
            let cua = usize::from(other_event.is_own());

            match model {
                SystemModel::Memory => {
                    let (after, before) = if cua == 1 { (d1, peer) } else { (d2, base) };
                    let after = protocol.raw_encoding(after);
                    let before = protocol.raw_encoding(before);
                    if after.smp_weight() < before.smp_weight()
                        || after.pcp_weight() < before.pcp_weight()
                    {
                        return Ok(true);
                    }
                }
                SystemModel::Direct => {
                    let post = StateView::new(d1, d2);
                    let smp_delta =
                        post.smp_weight(protocol) as i64 - pre.smp_weight(protocol) as i64;
                    let pcp_delta =
                        post.pcp_weight(protocol) as i64 - pre.pcp_weight(protocol) as i64;
                    let after = protocol.effective_encoding(post.state(cua));
                    let before = protocol.effective_encoding(pre.state(cua));
                    if smp_delta < 0 && after.smp == before.smp {
                        return Ok(true);
                    }
                    if pcp_delta < 0 && after.pcp == before.pcp {
                        return Ok(true);
                    }
                }
            }
        }
    }
    Ok(false)
}
