// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Derives the shared-memory / directory state machine from features of the
//! elaborated cache machine. `SM_I` and `SM_M` always exist; `SM_X` is added
//! when the cache protocol has an exclusive-read state, `SM_F` when it has a
//! clean forwarding state. Transient memory states append `_D` (waiting for
//! data) or `_A` (waiting for acknowledgement) to their parent label.

use crate::latency::SystemModel;
use crate::protocol::Protocol;
use crate::state::{
    AccessPermission, Encoding, PeerCopyPresence, SharedMemoryPermission, State, StateId,
};
use crate::transition::{Action, Event};

const MEM_EVENTS: [Event; 3] = [Event::GetS, Event::GetM, Event::PutM];

struct MemStates {
    invalid: StateId,
    modified: StateId,
    exclusive: Option<StateId>,
    forwarding: Option<StateId>,
}

impl MemStates {
    /// Where the directory rests once a dirty line has been returned.
    fn data_return(&self) -> StateId {
        match self {
            MemStates {
                forwarding: Some(f),
                ..
            } => *f,
            MemStates {
                exclusive: Some(x), ..
            } => *x,
            MemStates { invalid, .. } => *invalid,
        }
    }
}

/// Builds the memory-side machine for the chosen interconnect model.
pub fn synthesize_memory_machine(protocol: &mut Protocol, model: SystemModel) {
    let invalid = protocol.add_mem_state(State::stable(
        "SM_I",
        Encoding::new(
            AccessPermission::Invalid,
            SharedMemoryPermission::Clean,
            PeerCopyPresence::Passive,
        ),
    ));
    let modified = protocol.add_mem_state(State::stable(
        "SM_M",
        Encoding::new(
            AccessPermission::Write,
            SharedMemoryPermission::Dirty,
            PeerCopyPresence::Active,
        ),
    ));
    let exclusive = protocol.has_exclusive_state().then(|| {
        protocol.add_mem_state(State::stable(
            "SM_X",
            Encoding::new(
                AccessPermission::Read,
                SharedMemoryPermission::Clean,
                PeerCopyPresence::Passive,
            ),
        ))
    });
    let forwarding = protocol.has_forwarding_state().then(|| {
        protocol.add_mem_state(State::stable(
            "SM_F",
            Encoding::new(
                AccessPermission::Read,
                SharedMemoryPermission::Clean,
                PeerCopyPresence::Active,
            ),
        ))
    });
    let mem = MemStates {
        invalid,
        modified,
        exclusive,
        forwarding,
    };

    // Transient memory states are appended while this loop runs and are
    // picked up by it.
    let mut index = 0;
    while index < protocol.mem_states().len() {
        let s = protocol.mem_states()[index];
        index += 1;
        for event in MEM_EVENTS {
            match model {
                SystemModel::Memory => memory_model_step(protocol, &mem, s, event),
                SystemModel::Direct => direct_model_step(protocol, &mem, s, event),
            }
        }
    }
}

fn add_mem(protocol: &mut Protocol, src: StateId, event: Event, dst: StateId, action: Option<Action>) {
    let mut t = protocol.new_transition(src, event, dst);
    t.action = action;
    protocol.add_mem_transition(t);
}

fn data_transient(protocol: &mut Protocol, s: StateId, resting: StateId) -> StateId {
    let label = format!("{}_D", protocol.label(s));
    let encoding = protocol.copied_encoding(s);
    protocol.add_mem_state(State::transient(label, s, resting, None, false, encoding))
}

/// All communication is mediated by shared memory: the directory answers
/// every request itself, and in-flight states simply stall.
fn memory_model_step(protocol: &mut Protocol, mem: &MemStates, s: StateId, event: Event) {
    if protocol.is_transient(s) {
        add_mem(protocol, s, event, s, Some(Action::Stall));
        return;
    }
    let encoding = protocol.raw_encoding(s);
    if encoding.ap_weight() < 1 {
        match event {
            Event::GetS => {
                if mem.exclusive.is_some() {
                    add_mem(protocol, s, event, mem.modified, Some(Action::SetOwnerSendData));
                } else {
                    add_mem(protocol, s, event, s, Some(Action::SendData));
                }
            }
            Event::GetM => {
                add_mem(protocol, s, event, mem.modified, Some(Action::SetOwnerSendData));
            }
            _ => {}
        }
    } else if encoding.smp_weight() > 0 {
        // A dirty owner exists; memory must collect the line first.
        let resting = mem.exclusive.unwrap_or(mem.invalid);
        match event {
            Event::PutM => {
                let transient = data_transient(protocol, s, mem.invalid);
                add_mem(protocol, s, event, transient, None);
                add_mem(
                    protocol,
                    transient,
                    Event::Ordered,
                    mem.invalid,
                    Some(Action::WriteBackData),
                );
            }
            _ => {
                let transient = data_transient(protocol, s, resting);
                add_mem(protocol, s, event, transient, None);
                add_mem(protocol, transient, Event::ReceiveData, resting, None);
            }
        }
    } else {
        match event {
            Event::GetS => add_mem(protocol, s, event, s, Some(Action::SendData)),
            Event::GetM => add_mem(protocol, s, event, mem.modified, Some(Action::SendData)),
            _ => {}
        }
    }
}

/// Cache-to-cache communication: the directory mostly tracks ownership and
/// only supplies data when no cache can.
fn direct_model_step(protocol: &mut Protocol, mem: &MemStates, s: StateId, event: Event) {
    if protocol.is_transient(s) {
        match event {
            Event::GetS => add_mem(protocol, s, event, s, Some(Action::Stall)),
            Event::GetM => add_mem(protocol, s, event, mem.modified, None),
            _ => {}
        }
        return;
    }
    let encoding = protocol.raw_encoding(s);
    if encoding.ap_weight() < 1 {
        match event {
            Event::GetS => {
                if mem.exclusive.is_some() {
                    add_mem(protocol, s, event, mem.modified, Some(Action::SendData));
                } else if let Some(f) = mem.forwarding {
                    add_mem(protocol, s, event, f, Some(Action::SendData));
                } else {
                    add_mem(protocol, s, event, s, Some(Action::SendData));
                }
            }
            Event::GetM => add_mem(protocol, s, event, mem.modified, Some(Action::SendData)),
            _ => {}
        }
    } else if encoding.smp_weight() > 0 {
        match event {
            Event::GetM => add_mem(protocol, s, event, mem.modified, None),
            Event::PutM => {
                let transient = data_transient(protocol, s, mem.invalid);
                add_mem(protocol, s, event, transient, None);
                add_mem(
                    protocol,
                    transient,
                    Event::Ordered,
                    mem.invalid,
                    Some(Action::WriteBackData),
                );
            }
            _ => {
                let resting = mem.data_return();
                let transient = data_transient(protocol, s, resting);
                add_mem(protocol, s, event, transient, None);
                add_mem(protocol, transient, Event::ReceiveData, resting, None);
            }
        }
    } else if encoding.pcp_weight() < 1 {
        match event {
            Event::GetS => {
                if let Some(f) = mem.forwarding {
                    add_mem(protocol, s, event, f, Some(Action::SetOwnerSendData));
                } else {
                    add_mem(protocol, s, event, s, Some(Action::SendData));
                }
            }
            Event::GetM => add_mem(protocol, s, event, mem.modified, Some(Action::SendData)),
            _ => {}
        }
    } else {
        // Clean forwarder: it supplies data, memory only tracks ownership.
        match event {
            Event::GetS => add_mem(protocol, s, event, s, Some(Action::SetOwner)),
            Event::GetM => {
                add_mem(protocol, s, event, mem.modified, Some(Action::SetOwnerSendData));
            }
            Event::PutM => {
                let resting = mem.exclusive.unwrap_or(mem.invalid);
                let label = format!("{}_A", protocol.label(s));
                let encoding = protocol.copied_encoding(s);
                let transient = protocol.add_mem_state(State::transient(
                    label, s, resting, None, true, encoding,
                ));
                add_mem(protocol, s, event, transient, None);
                add_mem(protocol, transient, Event::Ordered, resting, None);
            }
            _ => {}
        }
    }
}
