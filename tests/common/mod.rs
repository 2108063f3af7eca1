//! Shared helpers for the integration tests: build a program from
//! instruction-string literals, run it to completion, and hand back the
//! full snapshot log.

use ooo470::loader::parse_program;
use ooo470::simulator::Snapshot;
use ooo470::Simulator;

pub fn run(lines: &[&str]) -> Vec<Snapshot> {
    let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    let program = parse_program(&lines).expect("fixture program must parse");
    let mut sim = Simulator::new(program);
    sim.run().expect("fixture program must run without invariant violations")
}

#[allow(dead_code)]
pub fn last(log: &[Snapshot]) -> &Snapshot {
    log.last().expect("log always has at least the reset snapshot")
}
