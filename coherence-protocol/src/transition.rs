// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use crate::state::StateId;

/// Trigger events. The `P`/`M` suffix on processor-side events distinguishes
/// requests served by a peer cache from requests served by memory.
/// `Ordered`, `Data`, `ReceiveData` and `Stall` are synthetic events
/// introduced by elaboration; `GetS`/`GetM`/`PutM` drive the memory machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    OwnReadP,
    OwnReadM,
    OwnWriteP,
    OwnWriteM,
    OtherRead,
    OtherWrite,
    Replacement,
    Ordered,
    Data,
    ReceiveData,
    Stall,
    GetS,
    GetM,
    PutM,
}

impl Event {
    pub fn is_own(self) -> bool {
        matches!(
            self,
            Event::OwnReadP | Event::OwnReadM | Event::OwnWriteP | Event::OwnWriteM
        )
    }

    pub fn is_other(self) -> bool {
        matches!(self, Event::OtherRead | Event::OtherWrite)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Event::OwnReadP => "OwnReadP",
            Event::OwnReadM => "OwnReadM",
            Event::OwnWriteP => "OwnWriteP",
            Event::OwnWriteM => "OwnWriteM",
            Event::OtherRead => "OtherRead",
            Event::OtherWrite => "OtherWrite",
            Event::Replacement => "Replacement",
            Event::Ordered => "Ordered",
            Event::Data => "Data",
            Event::ReceiveData => "Receive data",
            Event::Stall => "Stall",
            Event::GetS => "GetS",
            Event::GetM => "GetM",
            Event::PutM => "PutM",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event `{0}`")]
pub struct UnknownEventError(String);

impl FromStr for Event {
    type Err = UnknownEventError;

    /// Parses the events legal in an input specification. Synthetic events
    /// are never read back in.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OwnReadP" => Ok(Event::OwnReadP),
            "OwnReadM" => Ok(Event::OwnReadM),
            "OwnWriteP" => Ok(Event::OwnWriteP),
            "OwnWriteM" => Ok(Event::OwnWriteM),
            "OtherRead" => Ok(Event::OtherRead),
            "OtherWrite" => Ok(Event::OtherWrite),
            "Replacement" => Ok(Event::Replacement),
            _ => Err(UnknownEventError(s.to_string())),
        }
    }
}

/// Annotations carried by elaborated transitions and rendered into the
/// artifact `Action` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    SendData,
    WriteBackData,
    CommunicateMessage,
    SetOwner,
    SetOwnerSendData,
    Stall,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::SendData => "Send data",
            Action::WriteBackData => "Write-back data",
            Action::CommunicateMessage => "Communicate message",
            Action::SetOwner => "Set owner",
            Action::SetOwnerSendData => "Set owner, Send data",
            Action::Stall => "Stall",
        })
    }
}

/// A directed edge of a state machine. `stable_source` and
/// `stable_destination` project transient endpoints back onto the stable
/// states they travel between; they are fixed at construction.
///
/// Two transitions are considered the same edge when their
/// (source, event, destination) triples match, regardless of action.
#[derive(Clone, Debug)]
pub struct Transition {
    pub source: StateId,
    pub event: Event,
    pub destination: StateId,
    pub action: Option<Action>,
    pub stable_source: StateId,
    pub stable_destination: StateId,
}

impl Transition {
    pub fn with_action(mut self, action: Action) -> Transition {
        self.action = Some(action);
        self
    }

    pub fn same_edge(&self, other: &Transition) -> bool {
        self.source == other.source
            && self.event == other.event
            && self.destination == other.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_and_other_events() {
        assert!(Event::OwnReadP.is_own());
        assert!(Event::OwnWriteM.is_own());
        assert!(!Event::OtherRead.is_own());
        assert!(Event::OtherWrite.is_other());
        assert!(!Event::Replacement.is_other());
        assert!(!Event::Ordered.is_own());
    }

    #[test]
    fn input_event_parsing() {
        assert_eq!("OwnReadM".parse::<Event>().unwrap(), Event::OwnReadM);
        assert_eq!("Replacement".parse::<Event>().unwrap(), Event::Replacement);
        assert!("Ordered".parse::<Event>().is_err());
        assert!("GetS".parse::<Event>().is_err());
    }

    #[test]
    fn action_labels() {
        assert_eq!(Action::WriteBackData.to_string(), "Write-back data");
        assert_eq!(Action::SetOwnerSendData.to_string(), "Set owner, Send data");
    }

    #[test]
    fn edge_identity_ignores_action() {
        let a = Transition {
            source: StateId(0),
            event: Event::OtherRead,
            destination: StateId(1),
            action: None,
            stable_source: StateId(0),
            stable_destination: StateId(1),
        };
        let b = a.clone().with_action(Action::SendData);
        assert!(a.same_edge(&b));
    }
}
