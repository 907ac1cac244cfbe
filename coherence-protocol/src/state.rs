// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

/// Access permission coordinate. `ExclusiveRead` weighs the same as `Write`
/// because it implies silent upgrade capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessPermission {
    Invalid,
    Read,
    ExclusiveRead,
    Write,
}

impl AccessPermission {
    pub fn weight(self) -> u32 {
        match self {
            AccessPermission::Invalid => 0,
            AccessPermission::Read => 1,
            AccessPermission::ExclusiveRead | AccessPermission::Write => 2,
        }
    }
}

impl fmt::Display for AccessPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessPermission::Invalid => "invalid",
            AccessPermission::Read => "read",
            AccessPermission::ExclusiveRead => "exclusiveRead",
            AccessPermission::Write => "write",
        })
    }
}

/// Shared-memory cleanliness coordinate; `Dirty` means memory is stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharedMemoryPermission {
    Clean,
    Dirty,
}

impl SharedMemoryPermission {
    pub fn weight(self) -> u32 {
        match self {
            SharedMemoryPermission::Clean => 0,
            SharedMemoryPermission::Dirty => 1,
        }
    }
}

impl fmt::Display for SharedMemoryPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SharedMemoryPermission::Clean => "clean",
            SharedMemoryPermission::Dirty => "dirty",
        })
    }
}

/// Peer-copy-presence coordinate; an `Active` cache is obliged to supply
/// data to requesting peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerCopyPresence {
    Passive,
    Active,
}

impl PeerCopyPresence {
    pub fn weight(self) -> u32 {
        match self {
            PeerCopyPresence::Passive => 0,
            PeerCopyPresence::Active => 1,
        }
    }
}

impl fmt::Display for PeerCopyPresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerCopyPresence::Passive => "passive",
            PeerCopyPresence::Active => "active",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value `{value}`")]
pub struct CoordinateError {
    kind: &'static str,
    value: String,
}

impl FromStr for AccessPermission {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(AccessPermission::Invalid),
            "read" => Ok(AccessPermission::Read),
            "exclusiveRead" => Ok(AccessPermission::ExclusiveRead),
            "write" => Ok(AccessPermission::Write),
            _ => Err(CoordinateError {
                kind: "access permission",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for SharedMemoryPermission {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(SharedMemoryPermission::Clean),
            "dirty" => Ok(SharedMemoryPermission::Dirty),
            _ => Err(CoordinateError {
                kind: "shared-memory permission",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for PeerCopyPresence {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passive" => Ok(PeerCopyPresence::Passive),
            "active" => Ok(PeerCopyPresence::Active),
            _ => Err(CoordinateError {
                kind: "peer-copy presence",
                value: s.to_string(),
            }),
        }
    }
}

/// The (AP, SMP, PCP) triple characterizing a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Encoding {
    pub ap: AccessPermission,
    pub smp: SharedMemoryPermission,
    pub pcp: PeerCopyPresence,
}

impl Encoding {
    pub fn new(
        ap: AccessPermission,
        smp: SharedMemoryPermission,
        pcp: PeerCopyPresence,
    ) -> Encoding {
        Encoding { ap, smp, pcp }
    }

    pub fn ap_weight(&self) -> u32 {
        self.ap.weight()
    }

    pub fn smp_weight(&self) -> u32 {
        self.smp.weight()
    }

    pub fn pcp_weight(&self) -> u32 {
        self.pcp.weight()
    }

    /// Weight-level equality, used by the pre-ordered interleaver to decide
    /// whether a peer move leaves a transient stationary.
    pub fn same_weights(&self, other: &Encoding) -> bool {
        self.ap_weight() == other.ap_weight()
            && self.pcp_weight() == other.pcp_weight()
            && self.smp_weight() == other.smp_weight()
    }
}

/// Index of a state in the protocol arena. States are never removed, so ids
/// stay valid for the lifetime of the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

/// A cache or memory state. Stable states come from the input specification;
/// transient states are synthesized during elaboration and record where they
/// came from (`source`), where they are headed (`intended_dest`), and the
/// transient they were chained onto, if any.
#[derive(Clone, Debug)]
pub enum State {
    Stable {
        label: String,
        encoding: Encoding,
    },
    Transient {
        label: String,
        source: StateId,
        intended_dest: StateId,
        parent: Option<StateId>,
        pre_ordered: bool,
        encoding: Encoding,
    },
}

impl State {
    pub fn stable(label: impl Into<String>, encoding: Encoding) -> State {
        State::Stable {
            label: label.into(),
            encoding,
        }
    }

    pub fn transient(
        label: impl Into<String>,
        source: StateId,
        intended_dest: StateId,
        parent: Option<StateId>,
        pre_ordered: bool,
        encoding: Encoding,
    ) -> State {
        State::Transient {
            label: label.into(),
            source,
            intended_dest,
            parent,
            pre_ordered,
            encoding,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            State::Stable { label, .. } | State::Transient { label, .. } => label,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, State::Transient { .. })
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, State::Stable { .. })
    }

    pub fn is_pre_ordered(&self) -> bool {
        matches!(
            self,
            State::Transient {
                pre_ordered: true,
                ..
            }
        )
    }

    /// The state's own recorded triple: a stable state's declared encoding,
    /// or the triple copied into a transient at construction time.
    pub fn encoding(&self) -> Encoding {
        match self {
            State::Stable { encoding, .. } | State::Transient { encoding, .. } => *encoding,
        }
    }

    pub fn source(&self) -> Option<StateId> {
        match self {
            State::Stable { .. } => None,
            State::Transient { source, .. } => Some(*source),
        }
    }

    pub fn intended_destination(&self) -> Option<StateId> {
        match self {
            State::Stable { .. } => None,
            State::Transient { intended_dest, .. } => Some(*intended_dest),
        }
    }

    pub fn parent(&self) -> Option<StateId> {
        match self {
            State::Stable { .. } => None,
            State::Transient { parent, .. } => *parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_permission_weights() {
        assert_eq!(AccessPermission::Invalid.weight(), 0);
        assert_eq!(AccessPermission::Read.weight(), 1);
        assert_eq!(AccessPermission::ExclusiveRead.weight(), 2);
        assert_eq!(AccessPermission::Write.weight(), 2);
    }

    #[test]
    fn coordinate_round_trips() {
        for s in ["invalid", "read", "exclusiveRead", "write"] {
            let ap: AccessPermission = s.parse().unwrap();
            assert_eq!(ap.to_string(), s);
        }
        for s in ["clean", "dirty"] {
            let smp: SharedMemoryPermission = s.parse().unwrap();
            assert_eq!(smp.to_string(), s);
        }
        for s in ["passive", "active"] {
            let pcp: PeerCopyPresence = s.parse().unwrap();
            assert_eq!(pcp.to_string(), s);
        }
    }

    #[test]
    fn unknown_coordinate_is_rejected() {
        let err = "shared".parse::<AccessPermission>().unwrap_err();
        assert!(err.to_string().contains("shared"));
        assert!("stale".parse::<SharedMemoryPermission>().is_err());
        assert!("owner".parse::<PeerCopyPresence>().is_err());
    }

    #[test]
    fn same_weights_ignores_exclusive_vs_write() {
        let e = Encoding::new(
            AccessPermission::ExclusiveRead,
            SharedMemoryPermission::Clean,
            PeerCopyPresence::Passive,
        );
        let w = Encoding::new(
            AccessPermission::Write,
            SharedMemoryPermission::Clean,
            PeerCopyPresence::Passive,
        );
        assert!(e.same_weights(&w));
    }
}
