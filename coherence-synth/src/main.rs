// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::debug;

use coherence_protocol::{
    classify, elaborate, emit_artifacts, parse_protocol, synthesize_memory_machine, Protocol,
    SystemModel,
};

/// Synthesizes a non-stalling coherence protocol and its shared-memory state
/// machine from a stable-state specification.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input protocol file (stable states plus stable-to-stable transitions)
    #[arg(short = 'i', long = "ifile")]
    ifile: PathBuf,

    /// Interconnect model: direct (cache-to-cache) or memory (through
    /// shared memory)
    #[arg(short = 's', long = "system-model", default_value = "direct")]
    system_model: SystemModel,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("@@@@@ Predictable protocol analyzer @@@@@");
    println!(" ----- Step 1: Analyze protocol -----");
    let mut protocol = analyze(&cli.ifile, cli.system_model)?;

    println!(" ----- Step 2: Non-stalling protocol implementation ----");
    let stalls = elaborate(&mut protocol, cli.system_model)?;
    synthesize_memory_machine(&mut protocol, cli.system_model);
    debug!("elaborated cache machine:\n{}", protocol.dump_transitions());

    emit_artifacts(&protocol, Path::new(".")).context("failed to write output artifacts")?;

    println!("Total transitions: {}", protocol.transitions().len());
    println!("Total stall transitions: {stalls}");
    Ok(())
}

/// Loads the input protocol and reports its latency classification.
fn analyze(ifile: &Path, model: SystemModel) -> anyhow::Result<Protocol> {
    let input = fs::read_to_string(ifile)
        .with_context(|| format!("failed to read input protocol {}", ifile.display()))?;
    let mut protocol = parse_protocol(&input)
        .with_context(|| format!("failed to parse input protocol {}", ifile.display()))?;

    protocol.construct_views();
    classify(&mut protocol, model)?;

    if protocol.is_non_linear() {
        println!("Input protocol has non-linear WCAL bound");
        for transition in protocol.non_linear_transitions() {
            println!("{}", protocol.describe_transition(transition));
        }
    } else {
        println!("Input protocol has linear WCAL bound");
    }
    Ok(protocol)
}
