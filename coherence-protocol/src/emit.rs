// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Artifact emission: tabular CSV for external model-checking tooling and
//! Graphviz DOT (with a best-effort PDF render) for inspection. CSV files
//! are opened in append mode so successive runs accumulate, each starting
//! with its own header row.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Command;

use log::warn;

use crate::protocol::Protocol;
use crate::transition::Transition;

pub const CACHE_CSV: &str = "output-private-cache.csv";
pub const MEMORY_CSV: &str = "output-shared-memory.csv";
pub const CACHE_DOT: &str = "private-cache-state-machine.viz";
pub const MEMORY_DOT: &str = "shared-memory-state-machine.viz";

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write CSV row: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes both machines' CSV and DOT artifacts into `dir` and attempts to
/// render the graphs to PDF with Graphviz.
pub fn emit_artifacts(protocol: &Protocol, dir: &Path) -> Result<(), EmitError> {
    write_csv(protocol, protocol.transitions(), &dir.join(CACHE_CSV))?;
    write_csv(protocol, protocol.mem_transitions(), &dir.join(MEMORY_CSV))?;

    let cache_dot = render_dot(protocol, protocol.transitions(), "circle");
    std::fs::write(dir.join(CACHE_DOT), &cache_dot)?;
    let memory_dot = render_dot(protocol, protocol.mem_transitions(), "square");
    std::fs::write(dir.join(MEMORY_DOT), &memory_dot)?;

    render_pdf(&dir.join(CACHE_DOT));
    render_pdf(&dir.join(MEMORY_DOT));
    Ok(())
}

/// Appends a `Source,Event,Action,Destination` table for `transitions`.
pub fn write_csv(
    protocol: &Protocol,
    transitions: &[Transition],
    path: &Path,
) -> Result<(), EmitError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["Source", "Event", "Action", "Destination"])?;
    for t in transitions {
        let event = t.event.to_string();
        let action = t.action.map(|a| a.to_string()).unwrap_or_default();
        writer.write_record([
            protocol.label(t.source),
            event.as_str(),
            action.as_str(),
            protocol.label(t.destination),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Renders a left-to-right digraph with `event/action` edge labels.
pub fn render_dot(protocol: &Protocol, transitions: &[Transition], shape: &str) -> String {
    let mut out = String::from("digraph \"Protocol visualization\" {\n");
    out.push_str("\trankdir=LR\n");
    out.push_str("\tsize=\"10,10\"\n");
    out.push_str(&format!("\tnode [shape={shape}]\n"));
    for t in transitions {
        let action = t.action.map(|a| a.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "\t\"{}\" -> \"{}\" [label=\"{}/{}\"]\n",
            protocol.label(t.source),
            protocol.label(t.destination),
            t.event,
            action
        ));
    }
    out.push_str("}\n");
    out
}

/// PDF rendering is best-effort: a missing Graphviz install downgrades to a
/// warning rather than failing the run.
fn render_pdf(dot_path: &Path) {
    let pdf = dot_path.with_extension("pdf");
    match Command::new("dot")
        .arg("-Tpdf")
        .arg("-o")
        .arg(&pdf)
        .arg(dot_path)
        .status()
    {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("graphviz exited with {status} rendering {}", pdf.display()),
        Err(err) => warn!("skipping PDF render for {}: {err}", pdf.display()),
    }
}
