// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The protocol aggregate: an append-only arena of states plus the cache and
//! memory transition tables. All cross-references are arena indices, so the
//! graph needs no shared ownership; iteration order is insertion order
//! everywhere to keep artifacts reproducible.

use std::fmt::Write as _;

use crate::state::{Encoding, State, StateId};
use crate::transition::{Action, Event, Transition};
use crate::view::{enumerate_views, StateView};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol has no invalid stable state")]
    NoInvalidStableState,
}

#[derive(Debug, Default)]
pub struct Protocol {
    arena: Vec<State>,
    states: Vec<StateId>,
    pre_ordered: Vec<StateId>,
    post_ordered: Vec<StateId>,
    mem_states: Vec<StateId>,
    transitions: Vec<Transition>,
    mem_transitions: Vec<Transition>,
    input_transitions: Vec<Transition>,
    views: Vec<StateView>,
    linear: Vec<Transition>,
    non_linear: Vec<Transition>,
}

impl Protocol {
    pub fn new() -> Protocol {
        Protocol::default()
    }

    fn intern(&mut self, state: State) -> StateId {
        let id = StateId(self.arena.len());
        self.arena.push(state);
        id
    }

    fn find_in(&self, ids: &[StateId], label: &str) -> Option<StateId> {
        ids.iter()
            .copied()
            .find(|&id| self.arena[id.0].label() == label)
    }

    /// Adds a stable cache state; idempotent by label.
    pub fn add_stable_state(&mut self, label: &str, encoding: Encoding) -> StateId {
        if let Some(existing) = self.find_in(&self.states, label) {
            return existing;
        }
        let id = self.intern(State::stable(label, encoding));
        self.states.push(id);
        id
    }

    /// Adds a pre-ordered transient to the cache machine; idempotent by
    /// label, returning the already-registered state when one exists.
    pub fn add_pre_ordered_state(&mut self, state: State) -> StateId {
        if let Some(existing) = self.find_in(&self.pre_ordered, state.label()) {
            return existing;
        }
        let id = self.intern(state);
        self.pre_ordered.push(id);
        self.states.push(id);
        id
    }

    /// Adds a post-ordered transient to the cache machine; idempotent by
    /// label.
    pub fn add_post_ordered_state(&mut self, state: State) -> StateId {
        if let Some(existing) = self.find_in(&self.post_ordered, state.label()) {
            return existing;
        }
        let id = self.intern(state);
        self.post_ordered.push(id);
        self.states.push(id);
        id
    }

    /// Adds a memory-machine state; idempotent by label.
    pub fn add_mem_state(&mut self, state: State) -> StateId {
        if let Some(existing) = self.find_in(&self.mem_states, state.label()) {
            return existing;
        }
        let id = self.intern(state);
        self.mem_states.push(id);
        id
    }

    /// Appends a cache transition unless an edge with the same
    /// (source, event, destination) triple is already present.
    pub fn add_transition(&mut self, transition: Transition) {
        if !self.transitions.iter().any(|t| t.same_edge(&transition)) {
            self.transitions.push(transition);
        }
    }

    pub fn add_mem_transition(&mut self, transition: Transition) {
        if !self.mem_transitions.iter().any(|t| t.same_edge(&transition)) {
            self.mem_transitions.push(transition);
        }
    }

    /// Appends a stall self-loop without edge dedup; the stall-completion
    /// pass reports one loop per missing (state, other-event) entry.
    pub(crate) fn push_stall(&mut self, state: StateId) {
        let loop_back = self.new_transition(state, Event::Stall, state);
        self.transitions.push(loop_back);
    }

    pub fn remove_transition(&mut self, transition: &Transition) {
        self.transitions.retain(|t| !t.same_edge(transition));
    }

    /// Sets the action of the live transition matching `transition`'s edge.
    pub fn set_action(&mut self, transition: &Transition, action: Action) {
        if let Some(t) = self.transitions.iter_mut().find(|t| t.same_edge(transition)) {
            t.action = Some(action);
        }
    }

    /// Builds a transition, projecting transient endpoints onto their stable
    /// source (one parent hop) and intended destination.
    pub fn new_transition(&self, source: StateId, event: Event, destination: StateId) -> Transition {
        let stable_source = if self.is_transient(source) {
            self.effective_source(source)
        } else {
            source
        };
        let stable_destination = self
            .intended_destination(destination)
            .unwrap_or(destination);
        Transition {
            source,
            event,
            destination,
            action: None,
            stable_source,
            stable_destination,
        }
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.arena[id.0]
    }

    pub fn label(&self, id: StateId) -> &str {
        self.arena[id.0].label()
    }

    pub fn is_transient(&self, id: StateId) -> bool {
        self.arena[id.0].is_transient()
    }

    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.arena[id.0].parent()
    }

    pub fn intended_destination(&self, id: StateId) -> Option<StateId> {
        self.arena[id.0].intended_destination()
    }

    /// The state's recorded triple (a transient's copied encoding). Weight
    /// queries and view validity go through this.
    pub fn raw_encoding(&self, id: StateId) -> Encoding {
        self.arena[id.0].encoding()
    }

    /// The coordinate triple observed by the latency analyzer: a parentless
    /// transient reads its source, a chained transient reads its parent's
    /// source. The walk is exactly one hop.
    pub fn effective_encoding(&self, id: StateId) -> Encoding {
        match &self.arena[id.0] {
            State::Stable { encoding, .. } => *encoding,
            State::Transient {
                parent: None,
                source,
                ..
            } => self.raw_encoding(*source),
            State::Transient {
                parent: Some(parent),
                ..
            } => {
                let anchor = self.arena[parent.0].source().unwrap_or(*parent);
                self.raw_encoding(anchor)
            }
        }
    }

    /// The stable state a transient travels from, walking one parent hop.
    pub fn effective_source(&self, id: StateId) -> StateId {
        match &self.arena[id.0] {
            State::Stable { .. } => id,
            State::Transient {
                parent: None,
                source,
                ..
            } => *source,
            State::Transient {
                parent: Some(parent),
                ..
            } => self.arena[parent.0].source().unwrap_or(*parent),
        }
    }

    /// The triple a fresh transient copies when constructed from `id`: a
    /// stable state's own encoding, a parentless transient's source
    /// encoding, or a chained transient's parent encoding.
    pub fn copied_encoding(&self, id: StateId) -> Encoding {
        match &self.arena[id.0] {
            State::Stable { encoding, .. } => *encoding,
            State::Transient {
                parent: None,
                source,
                ..
            } => self.raw_encoding(*source),
            State::Transient {
                parent: Some(parent),
                ..
            } => self.raw_encoding(*parent),
        }
    }

    pub fn find_state(&self, label: &str) -> Option<StateId> {
        self.find_in(&self.states, label)
    }

    pub fn find_mem_state(&self, label: &str) -> Option<StateId> {
        self.find_in(&self.mem_states, label)
    }

    /// Looks up δ(source, event) in the input-transition snapshot, returning
    /// the stable destination.
    pub fn input_destination(&self, source: StateId, event: Event) -> Option<StateId> {
        self.input_transitions
            .iter()
            .find(|t| t.source == source && t.event == event)
            .map(|t| t.stable_destination)
    }

    /// Captures the current cache-transition table as the input snapshot
    /// used by δ lookups. Must happen before elaboration mutates the live
    /// table; the loader does this when it finishes.
    pub fn snapshot_input(&mut self) {
        self.input_transitions = self.transitions.clone();
    }

    /// The unique stable state with AP = invalid, the universal target of
    /// evictions.
    pub fn invalid_stable_state(&self) -> Result<StateId, ProtocolError> {
        self.states
            .iter()
            .copied()
            .find(|&id| {
                self.arena[id.0].is_stable() && self.raw_encoding(id).ap_weight() == 0
            })
            .ok_or(ProtocolError::NoInvalidStableState)
    }

    pub fn has_exclusive_state(&self) -> bool {
        self.states.iter().any(|&id| {
            self.effective_encoding(id).ap == crate::state::AccessPermission::ExclusiveRead
        })
    }

    pub fn has_forwarding_state(&self) -> bool {
        self.states.iter().any(|&id| {
            let e = self.effective_encoding(id);
            e.ap == crate::state::AccessPermission::Read
                && e.pcp == crate::state::PeerCopyPresence::Active
                && e.smp == crate::state::SharedMemoryPermission::Clean
        })
    }

    pub fn construct_views(&mut self) {
        self.views = enumerate_views(self);
    }

    pub fn record_linear(&mut self, transition: Transition) {
        self.linear.push(transition);
    }

    pub fn record_non_linear(&mut self, transition: Transition) {
        self.non_linear.push(transition);
    }

    pub fn is_non_linear(&self) -> bool {
        !self.non_linear.is_empty()
    }

    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    pub fn pre_ordered_states(&self) -> &[StateId] {
        &self.pre_ordered
    }

    pub fn post_ordered_states(&self) -> &[StateId] {
        &self.post_ordered
    }

    pub fn mem_states(&self) -> &[StateId] {
        &self.mem_states
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn mem_transitions(&self) -> &[Transition] {
        &self.mem_transitions
    }

    pub fn input_transitions(&self) -> &[Transition] {
        &self.input_transitions
    }

    pub fn views(&self) -> &[StateView] {
        &self.views
    }

    pub fn linear_transitions(&self) -> &[Transition] {
        &self.linear
    }

    pub fn non_linear_transitions(&self) -> &[Transition] {
        &self.non_linear
    }

    pub fn describe_transition(&self, transition: &Transition) -> String {
        format!(
            "{} -- {} --> {}",
            self.label(transition.source),
            transition.event,
            self.label(transition.destination)
        )
    }

    pub fn dump_transitions(&self) -> String {
        let mut out = String::new();
        for t in &self.transitions {
            let _ = writeln!(out, "{}", self.describe_transition(t));
        }
        out
    }
}
