// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loader for the line-oriented protocol input format:
//!
//! ```text
//! # @ State modeling
//! <label> -> (<AP>, <PCP>, <SMP>)
//! # @ Txn specs
//! (<src-label>, <event>) -> <dst-label>
//! ```
//!
//! Lines starting with `#` outside the two section markers are comments.
//! The loader rejects the whole input on the first schema error; it never
//! half-populates a protocol.

use crate::protocol::Protocol;
use crate::state::{CoordinateError, Encoding};
use crate::transition::{Event, UnknownEventError};

const STATE_SECTION_MARKER: &str = "@ State modeling";
const TXN_SECTION_MARKER: &str = "@ Txn specs";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: unparseable input `{text}`")]
    Unparseable { line: usize, text: String },
    #[error("line {line}: unknown state label `{label}`")]
    UnknownLabel { line: usize, label: String },
    #[error("line {line}: {source} in `{text}`")]
    Coordinate {
        line: usize,
        text: String,
        #[source]
        source: CoordinateError,
    },
    #[error("line {line}: {source} in `{text}`")]
    Event {
        line: usize,
        text: String,
        #[source]
        source: UnknownEventError,
    },
    #[error("input must declare exactly one invalid stable state, found {count}")]
    InvalidStableStates { count: usize },
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Idle,
    States,
    Transitions,
}

/// Parses an input specification into a protocol populated with stable
/// states and stable-to-stable transitions. The input-transition snapshot
/// used by latency analysis is captured before returning.
pub fn parse_protocol(input: &str) -> Result<Protocol, ParseError> {
    let mut protocol = Protocol::new();
    let mut section = Section::Idle;

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.contains(STATE_SECTION_MARKER) {
            section = Section::States;
            continue;
        }
        if line.contains(TXN_SECTION_MARKER) {
            section = Section::Transitions;
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match section {
            Section::Idle => {
                return Err(ParseError::Unparseable {
                    line: line_no,
                    text: line.to_string(),
                })
            }
            Section::States => parse_state_line(&mut protocol, line, line_no)?,
            Section::Transitions => parse_transition_line(&mut protocol, line, line_no)?,
        }
    }

    let invalid_count = protocol
        .states()
        .iter()
        .filter(|&&id| protocol.raw_encoding(id).ap_weight() == 0)
        .count();
    if invalid_count != 1 {
        return Err(ParseError::InvalidStableStates {
            count: invalid_count,
        });
    }

    protocol.snapshot_input();
    Ok(protocol)
}

/// `<label> -> (<AP>, <PCP>, <SMP>)`
fn parse_state_line(protocol: &mut Protocol, line: &str, line_no: usize) -> Result<(), ParseError> {
    let unparseable = || ParseError::Unparseable {
        line: line_no,
        text: line.to_string(),
    };
    let (label, encoding) = line.split_once("->").ok_or_else(unparseable)?;
    let label = label.trim();
    let triple = encoding
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(unparseable)?;
    let fields: Vec<&str> = triple.split(',').map(str::trim).collect();
    if label.is_empty() || fields.len() != 3 {
        return Err(unparseable());
    }

    let coordinate = |source: CoordinateError| ParseError::Coordinate {
        line: line_no,
        text: line.to_string(),
        source,
    };
    let ap = fields[0].parse().map_err(coordinate)?;
    let pcp = fields[1].parse().map_err(coordinate)?;
    let smp = fields[2].parse().map_err(coordinate)?;

    protocol.add_stable_state(label, Encoding { ap, smp, pcp });
    Ok(())
}

/// `(<src-label>, <event>) -> <dst-label>`
fn parse_transition_line(
    protocol: &mut Protocol,
    line: &str,
    line_no: usize,
) -> Result<(), ParseError> {
    let unparseable = || ParseError::Unparseable {
        line: line_no,
        text: line.to_string(),
    };
    let (pair, destination) = line.split_once("->").ok_or_else(unparseable)?;
    let pair = pair
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(unparseable)?;
    let (source, event) = pair.split_once(',').ok_or_else(unparseable)?;

    let lookup = |label: &str| {
        protocol
            .find_state(label)
            .ok_or_else(|| ParseError::UnknownLabel {
                line: line_no,
                label: label.to_string(),
            })
    };
    let source = lookup(source.trim())?;
    let destination = lookup(destination.trim())?;
    let event: Event = event
        .trim()
        .parse()
        .map_err(|source| ParseError::Event {
            line: line_no,
            text: line.to_string(),
            source,
        })?;

    let transition = protocol.new_transition(source, event, destination);
    protocol.add_transition(transition);
    Ok(())
}
