// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline tests over the shipped protocol fixtures.

use std::fs;
use std::path::Path;

use coherence_protocol::{
    classify, elaborate, parse_protocol, synthesize_memory_machine, write_csv, Action, Event,
    Protocol, SystemModel, Transition,
};

fn load(name: &str) -> Protocol {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../protocols")
        .join(name);
    let input = fs::read_to_string(&path).unwrap();
    parse_protocol(&input).unwrap()
}

fn run(name: &str, model: SystemModel) -> (Protocol, usize) {
    let mut protocol = load(name);
    protocol.construct_views();
    classify(&mut protocol, model).unwrap();
    let stalls = elaborate(&mut protocol, model).unwrap();
    synthesize_memory_machine(&mut protocol, model);
    (protocol, stalls)
}

fn edge<'a>(
    protocol: &'a Protocol,
    src: &str,
    event: Event,
    dst: &str,
) -> Option<&'a Transition> {
    let src = protocol.find_state(src)?;
    let dst = protocol.find_state(dst)?;
    protocol
        .transitions()
        .iter()
        .find(|t| t.source == src && t.event == event && t.destination == dst)
}

#[test]
fn msi_direct_elaboration() {
    let (protocol, stalls) = run("msi.txt", SystemModel::Direct);
    assert_eq!(stalls, 0);
    assert_eq!(protocol.views().len(), 6);
    assert!(protocol.is_non_linear());

    // The dirty owner's downgrade goes through MS_A, supplying data.
    let ordered = edge(&protocol, "MS_A", Event::Ordered, "S").unwrap();
    assert_eq!(ordered.action, Some(Action::SendData));

    // Evictions: M through a write-back transient, S straight to I.
    assert!(edge(&protocol, "M", Event::Replacement, "MI_A").is_some());
    let writeback = edge(&protocol, "MI_A", Event::Ordered, "I").unwrap();
    assert_eq!(writeback.action, Some(Action::WriteBackData));
    assert!(edge(&protocol, "S", Event::Replacement, "I").is_some());

    // Every transient is total over the other-events and can make progress.
    for &s in protocol.states() {
        if !protocol.is_transient(s) {
            continue;
        }
        for event in [Event::OtherRead, Event::OtherWrite] {
            assert!(
                protocol
                    .transitions()
                    .iter()
                    .any(|t| t.source == s && (t.event == event || t.event == Event::Stall)),
                "{} is missing {event}",
                protocol.label(s)
            );
        }
        assert!(protocol
            .transitions()
            .iter()
            .any(|t| t.source == s && matches!(t.event, Event::Ordered | Event::Data)));
    }

    // No forwarding or exclusive feature: the memory machine is I/M only.
    let mem: Vec<&str> = protocol
        .mem_states()
        .iter()
        .map(|&s| protocol.label(s))
        .collect();
    assert!(mem.contains(&"SM_I"));
    assert!(mem.contains(&"SM_M"));
    assert!(!mem.contains(&"SM_X"));
    assert!(!mem.contains(&"SM_F"));
}

#[test]
fn msi_memory_elaboration() {
    let (protocol, _) = run("msi.txt", SystemModel::Memory);

    // Downgrades write back through shared memory.
    let read = edge(&protocol, "MS_A", Event::Ordered, "S").unwrap();
    assert_eq!(read.action, Some(Action::WriteBackData));
    assert!(edge(&protocol, "M", Event::OtherWrite, "MI_A").is_some());

    // Directory-side machine: grant with ownership, collect on PutM.
    let sm_i = protocol.find_mem_state("SM_I").unwrap();
    let sm_m = protocol.find_mem_state("SM_M").unwrap();
    let sm_m_d = protocol.find_mem_state("SM_M_D").unwrap();
    let grant = protocol
        .mem_transitions()
        .iter()
        .find(|t| t.source == sm_i && t.event == Event::GetM && t.destination == sm_m)
        .unwrap();
    assert_eq!(grant.action, Some(Action::SetOwnerSendData));
    let collect = protocol
        .mem_transitions()
        .iter()
        .find(|t| t.source == sm_m_d && t.event == Event::Ordered)
        .unwrap();
    assert_eq!(collect.action, Some(Action::WriteBackData));
    assert_eq!(collect.destination, sm_i);
}

#[test]
fn mesi_exclusive_grant_stays_linear() {
    let (protocol, _) = run("mesi.txt", SystemModel::Direct);

    // E -> S on a peer read is linear: no transient is synthesized for it.
    assert!(protocol.find_state("ES_A").is_none());
    assert!(edge(&protocol, "E", Event::OtherRead, "S").is_some());
    // The exclusive feature surfaces in the memory machine.
    assert!(protocol.find_mem_state("SM_X").is_some());
}

#[test]
fn moesi_owner_keeps_supplying_data() {
    let (protocol, _) = run("moesi.txt", SystemModel::Direct);

    // M hands ownership to O on a peer read without leaving the fast path.
    let downgrade = edge(&protocol, "M", Event::OtherRead, "O").unwrap();
    assert_eq!(downgrade.action, Some(Action::SendData));
    // The owner's self-loop on further reads is left to the input table.
    let serve = edge(&protocol, "O", Event::OtherRead, "O").unwrap();
    assert_eq!(serve.action, None);

    // Evicting the owner writes the dirty line back.
    assert!(edge(&protocol, "O", Event::Replacement, "OI_A").is_some());
    let writeback = edge(&protocol, "OI_A", Event::Ordered, "I").unwrap();
    assert_eq!(writeback.action, Some(Action::WriteBackData));

    // Dirty O is not a clean forwarder: SM_X exists, SM_F does not.
    assert!(protocol.find_mem_state("SM_X").is_some());
    assert!(protocol.find_mem_state("SM_F").is_none());
}

#[test]
fn mesif_forwarding_feature() {
    let (protocol, _) = run("mesif.txt", SystemModel::Direct);
    assert!(protocol.find_mem_state("SM_F").is_some());
}

#[test]
fn crafted_single_stage_downgrade_is_non_linear_under_memory() {
    let input = "\
# @ State modeling
M -> (write, active, dirty)
S -> (read, passive, clean)
I -> (invalid, passive, clean)
# @ Txn specs
(I, OwnReadP) -> S
(I, OwnWriteM) -> M
(I, OtherRead) -> I
(I, OtherWrite) -> I
(S, OwnWriteM) -> M
(S, OtherRead) -> S
(S, OtherWrite) -> I
(M, OtherRead) -> I
(M, OtherWrite) -> I
";
    let mut protocol = parse_protocol(input).unwrap();
    protocol.construct_views();
    classify(&mut protocol, SystemModel::Memory).unwrap();
    assert!(protocol.is_non_linear());
    let flagged: Vec<String> = protocol
        .non_linear_transitions()
        .iter()
        .map(|t| protocol.describe_transition(t))
        .collect();
    assert!(flagged.contains(&"M -- OtherRead --> I".to_string()));

    elaborate(&mut protocol, SystemModel::Memory).unwrap();
    assert!(edge(&protocol, "M", Event::OtherRead, "MI_A").is_some());
}

#[test]
fn pipeline_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = Vec::new();
    for run_index in 0..2 {
        let (protocol, _) = run("moesi.txt", SystemModel::Direct);
        let path = dir.path().join(format!("cache-{run_index}.csv"));
        write_csv(&protocol, protocol.transitions(), &path).unwrap();
        let mem_path = dir.path().join(format!("memory-{run_index}.csv"));
        write_csv(&protocol, protocol.mem_transitions(), &mem_path).unwrap();
        outputs.push((
            fs::read_to_string(&path).unwrap(),
            fs::read_to_string(&mem_path).unwrap(),
        ));
    }
    assert_eq!(outputs[0], outputs[1]);
}
