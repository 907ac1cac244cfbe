// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Synthesis of non-stalling, linear-latency cache-coherence protocols.
//!
//! Given a stable-state protocol (MSI, MESI, MOESI, ...) described as states
//! plus stable-to-stable transitions, this crate classifies every transition
//! as linear or non-linear with respect to worst-case access latency under a
//! chosen interconnect model, elaborates the protocol with transient states
//! so that no cache ever stalls on an in-flight peer transaction, derives
//! the companion shared-memory state machine, and emits both machines as CSV
//! and DOT artifacts.
//!
//! The pipeline is a deterministic in-memory transformation:
//!
//! ```no_run
//! use coherence_protocol::{
//!     classify, elaborate, emit_artifacts, parse_protocol, synthesize_memory_machine,
//!     SystemModel,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = std::fs::read_to_string("protocols/msi.txt")?;
//! let mut protocol = parse_protocol(&input)?;
//! protocol.construct_views();
//! classify(&mut protocol, SystemModel::Direct)?;
//! let stalls = elaborate(&mut protocol, SystemModel::Direct)?;
//! synthesize_memory_machine(&mut protocol, SystemModel::Direct);
//! emit_artifacts(&protocol, std::path::Path::new("."))?;
//! println!("total transitions: {}", protocol.transitions().len());
//! println!("stall transitions: {stalls}");
//! # Ok(())
//! # }
//! ```

pub mod elaborate;
pub mod emit;
pub mod interleave;
pub mod latency;
pub mod memory;
pub mod parse;
pub mod protocol;
pub mod state;
pub mod transition;
pub mod view;

pub use elaborate::{
    atomic_other, atomic_own, complete_stalls, elaborate, synthesize_replacements,
};
pub use emit::{emit_artifacts, render_dot, write_csv, EmitError};
pub use interleave::{interleave_post_ordered, interleave_pre_ordered};
pub use latency::{classify, requires_transient, SystemModel};
pub use memory::synthesize_memory_machine;
pub use parse::{parse_protocol, ParseError};
pub use protocol::{Protocol, ProtocolError};
pub use state::{
    AccessPermission, Encoding, PeerCopyPresence, SharedMemoryPermission, State, StateId,
};
pub use transition::{Action, Event, Transition};
pub use view::{enumerate_views, StateView};
