// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Two-cache concurrent-state views. A view pairs the states of two caches
//! holding the same line; latency analysis explores the views reachable
//! under racing event pairs.

use crate::protocol::Protocol;
use crate::state::StateId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateView {
    pub first: StateId,
    pub second: StateId,
}

impl StateView {
    pub fn new(first: StateId, second: StateId) -> StateView {
        StateView { first, second }
    }

    /// Indexed access: 0 is the first cache, anything else the second.
    pub fn state(&self, index: usize) -> StateId {
        if index == 0 {
            self.first
        } else {
            self.second
        }
    }

    pub fn ap_weight(&self, protocol: &Protocol) -> u32 {
        protocol.raw_encoding(self.first).ap_weight()
            + protocol.raw_encoding(self.second).ap_weight()
    }

    pub fn smp_weight(&self, protocol: &Protocol) -> u32 {
        protocol.raw_encoding(self.first).smp_weight()
            + protocol.raw_encoding(self.second).smp_weight()
    }

    pub fn pcp_weight(&self, protocol: &Protocol) -> u32 {
        protocol.raw_encoding(self.first).pcp_weight()
            + protocol.raw_encoding(self.second).pcp_weight()
    }

    /// A view is valid when the pair could actually coexist: at most one
    /// writer (AP-weight sum ≤ 2) and at most one active data supplier
    /// (PCP-weight sum ≤ 1).
    pub fn is_valid(&self, protocol: &Protocol) -> bool {
        self.ap_weight(protocol) <= 2 && self.pcp_weight(protocol) <= 1
    }
}

/// Enumerates every valid ordered pair over the protocol's current state
/// set, in insertion order.
pub fn enumerate_views(protocol: &Protocol) -> Vec<StateView> {
    let mut views = Vec::new();
    for &si in protocol.states() {
        for &sj in protocol.states() {
            let view = StateView::new(si, sj);
            if view.is_valid(protocol) {
                views.push(view);
            }
        }
    }
    views
}
