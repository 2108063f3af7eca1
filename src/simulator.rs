//! The pipeline simulator proper: Fetch&Decode, Rename&Dispatch, Issue,
//! Execute-1/Execute-2, and Commit, run in reverse program order each
//! simulated cycle so that every stage sees the previous cycle's state
//! before an earlier stage in this cycle's pass overwrites it.

use crate::error::SimError;
use crate::types::{
    DecodedInstruction, LogReg, Opcode, Operand, PhysReg, EXCEPTION_PC_RESET, MAX_ACTIVE_LIST,
    MAX_DIR, MAX_INTEGER_QUEUE, NUM_ALUS, NUM_LOGICAL_REGS, NUM_PHYSICAL_REGS,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ActiveListEntry {
    #[serde(rename = "Done")]
    pub done: bool,
    #[serde(rename = "Exception")]
    pub exception: bool,
    #[serde(rename = "LogicalDestination")]
    pub logical_dest: LogReg,
    #[serde(rename = "OldDestination")]
    pub old_dest: PhysReg,
    #[serde(rename = "PC")]
    pub pc: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct IntegerQueueEntry {
    #[serde(rename = "DestRegister")]
    pub dest_reg: PhysReg,
    #[serde(rename = "OpAIsReady")]
    pub op_a_ready: bool,
    #[serde(rename = "OpARegTag")]
    pub op_a_tag: PhysReg,
    #[serde(rename = "OpAValue")]
    pub op_a_value: u64,
    #[serde(rename = "OpBIsReady")]
    pub op_b_ready: bool,
    #[serde(rename = "OpBRegTag")]
    pub op_b_tag: PhysReg,
    #[serde(rename = "OpBValue")]
    pub op_b_value: u64,
    #[serde(rename = "OpCode")]
    pub opcode: Opcode,
    #[serde(rename = "PC")]
    pub pc: u64,
}

#[derive(Clone, Copy, Debug)]
struct ExecResult {
    dest: PhysReg,
    value: u64,
    pc: u64,
    exception: bool,
}

fn compute(entry: &IntegerQueueEntry) -> ExecResult {
    let a = entry.op_a_value;
    let b = entry.op_b_value;
    let (value, exception) = match entry.opcode {
        Opcode::Add | Opcode::Addi => (a.wrapping_add(b), false),
        Opcode::Sub => (a.wrapping_sub(b), false),
        Opcode::Mulu => (a.wrapping_mul(b), false),
        Opcode::Divu => {
            if b == 0 {
                (0, true)
            } else {
                (a / b, false)
            }
        }
        Opcode::Remu => {
            if b == 0 {
                (0, true)
            } else {
                (a % b, false)
            }
        }
    };
    ExecResult {
        dest: entry.dest_reg,
        value,
        pc: entry.pc,
        exception,
    }
}

/// Two-stage ALU: E1 holds a freshly issued entry, E2 holds its computed result.
struct Alu {
    e1: Option<IntegerQueueEntry>,
    e2: Option<ExecResult>,
    last_forward: Option<ExecResult>,
}

impl Alu {
    fn new() -> Self {
        Self {
            e1: None,
            e2: None,
            last_forward: None,
        }
    }

    fn load_e1(&mut self, entry: IntegerQueueEntry) {
        debug_assert!(self.e1.is_none(), "Issue pushed into an occupied E1 slot");
        self.e1 = Some(entry);
    }

    fn publish(&mut self) {
        self.last_forward = self.e2.take();
    }

    fn latch(&mut self) {
        self.e2 = self.e1.take().as_ref().map(compute);
    }

    fn reset(&mut self) {
        self.e1 = None;
        self.e2 = None;
        self.last_forward = None;
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Snapshot {
    #[serde(rename = "PC")]
    pub pc: u64,
    #[serde(rename = "PhysicalRegisterFile")]
    pub physical_register_file: Vec<u64>,
    #[serde(rename = "DecodedPCs")]
    pub decoded_pcs: Vec<u64>,
    #[serde(rename = "ExceptionPC")]
    pub exception_pc: u64,
    #[serde(rename = "Exception")]
    pub exception: bool,
    #[serde(rename = "RegisterMapTable")]
    pub register_map_table: Vec<PhysReg>,
    #[serde(rename = "FreeList")]
    pub free_list: Vec<PhysReg>,
    #[serde(rename = "BusyBitTable")]
    pub busy_bit_table: Vec<bool>,
    #[serde(rename = "ActiveList")]
    pub active_list: Vec<ActiveListEntry>,
    #[serde(rename = "IntegerQueue")]
    pub integer_queue: Vec<IntegerQueueEntry>,
}

pub struct Simulator {
    program: Vec<DecodedInstruction>,
    pc: u64,
    rf: [u64; NUM_PHYSICAL_REGS],
    dir: Vec<DecodedInstruction>,
    map_table: [PhysReg; NUM_LOGICAL_REGS],
    free_list: VecDeque<PhysReg>,
    busy: [bool; NUM_PHYSICAL_REGS],
    active_list: VecDeque<ActiveListEntry>,
    integer_queue: Vec<IntegerQueueEntry>,
    alus: [Alu; NUM_ALUS],
    exception: bool,
    exception_pc: u64,
    committed_count: usize,
}

impl Simulator {
    pub fn new(program: Vec<DecodedInstruction>) -> Self {
        Self {
            program,
            pc: 0,
            rf: [0; NUM_PHYSICAL_REGS],
            dir: Vec::new(),
            map_table: std::array::from_fn(|i| PhysReg(i as u32)),
            free_list: (NUM_LOGICAL_REGS as u32..NUM_PHYSICAL_REGS as u32)
                .map(PhysReg)
                .collect(),
            busy: [false; NUM_PHYSICAL_REGS],
            active_list: VecDeque::new(),
            integer_queue: Vec::new(),
            alus: std::array::from_fn(|_| Alu::new()),
            exception: false,
            exception_pc: 0,
            committed_count: 0,
        }
    }

    /// Runs to completion and returns the full cycle-by-cycle snapshot log.
    pub fn run(&mut self) -> Result<Vec<Snapshot>, SimError> {
        let mut log = vec![self.snapshot()];
        let mut cycle: u64 = 0;
        while !self.is_done() {
            cycle += 1;
            self.step(cycle)?;
            log.push(self.snapshot());
            log::debug!(
                "cycle {cycle}: pc={} committed={}/{} exception={}",
                self.pc,
                self.committed_count,
                self.program.len(),
                self.exception
            );
        }
        Ok(log)
    }

    pub fn is_done(&self) -> bool {
        self.active_list.is_empty() && (self.exception || self.committed_count == self.program.len())
    }

    fn step(&mut self, cycle: u64) -> Result<(), SimError> {
        self.commit();
        self.exec2();
        self.exec1();
        self.issue();
        self.rename_and_dispatch();
        self.fetch_and_decode();
        self.check_invariants(cycle)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pc: self.pc,
            physical_register_file: self.rf.to_vec(),
            decoded_pcs: self.dir.iter().map(|i| i.pc).collect(),
            exception_pc: self.exception_pc,
            exception: self.exception,
            register_map_table: self.map_table.to_vec(),
            free_list: self.free_list.iter().copied().collect(),
            busy_bit_table: self.busy.to_vec(),
            active_list: self.active_list.iter().cloned().collect(),
            integer_queue: self.integer_queue.clone(),
        }
    }

    /// Fetch & Decode.
    fn fetch_and_decode(&mut self) {
        if self.exception {
            self.pc = EXCEPTION_PC_RESET;
            self.dir.clear();
            return;
        }
        if self.pc as usize >= self.program.len() {
            return;
        }
        let room = MAX_DIR - self.dir.len();
        let remaining = self.program.len() - self.pc as usize;
        let n = room.min(remaining);
        for _ in 0..n {
            let instr = self.program[self.pc as usize].clone();
            self.pc += 1;
            self.dir.push(instr);
        }
        log::trace!("fetch_and_decode: fetched {n}, dir now has {}", self.dir.len());
    }

    /// Rename & Dispatch. All-or-nothing for the current DIR contents.
    fn rename_and_dispatch(&mut self) {
        if self.exception {
            return;
        }
        let n = self.dir.len();
        if n == 0 {
            return;
        }
        if n > MAX_ACTIVE_LIST - self.active_list.len()
            || n > MAX_INTEGER_QUEUE - self.integer_queue.len()
            || n > self.free_list.len()
        {
            log::warn!("rename_and_dispatch: structural stall, {n} waiting in DIR");
            return;
        }

        let instructions = std::mem::take(&mut self.dir);
        for instr in instructions {
            let new_dest = self
                .free_list
                .pop_front()
                .expect("checked free_list.len() >= n above");
            let old_dest = self.map_table[instr.dest.0 as usize];

            let (a_ready, a_tag, a_value) = self.read_register_operand(instr.src_a);
            let (b_ready, b_tag, b_value) = match instr.src_b {
                Operand::Immediate(imm) => (true, PhysReg(0), imm),
                Operand::Register(r) => self.read_register_operand(r),
            };

            self.map_table[instr.dest.0 as usize] = new_dest;
            self.busy[new_dest.0 as usize] = true;

            self.integer_queue.push(IntegerQueueEntry {
                dest_reg: new_dest,
                op_a_ready: a_ready,
                op_a_tag: a_tag,
                op_a_value: a_value,
                op_b_ready: b_ready,
                op_b_tag: b_tag,
                op_b_value: b_value,
                opcode: instr.opcode,
                pc: instr.pc,
            });
            self.active_list.push_back(ActiveListEntry {
                done: false,
                exception: false,
                logical_dest: instr.dest,
                old_dest,
                pc: instr.pc,
            });
        }
    }

    fn read_register_operand(&self, r: LogReg) -> (bool, PhysReg, u64) {
        let tag = self.map_table[r.0 as usize];
        if self.busy[tag.0 as usize] {
            (false, tag, 0)
        } else {
            (true, PhysReg(0), self.rf[tag.0 as usize])
        }
    }

    /// Issue. Selects up to 4 ready entries in age order.
    fn issue(&mut self) {
        if self.exception {
            return;
        }
        let mut ready_indices = Vec::with_capacity(NUM_ALUS);
        for (i, entry) in self.integer_queue.iter().enumerate() {
            if entry.op_a_ready && entry.op_b_ready {
                ready_indices.push(i);
                if ready_indices.len() == NUM_ALUS {
                    break;
                }
            }
        }

        let mut selected = Vec::with_capacity(ready_indices.len());
        for &i in ready_indices.iter().rev() {
            selected.push(self.integer_queue.remove(i));
        }
        selected.reverse();

        for (k, entry) in selected.into_iter().enumerate() {
            self.alus[k].load_e1(entry);
        }
    }

    /// Execute-1: shift E1 into E2 for every ALU.
    fn exec1(&mut self) {
        if self.exception {
            return;
        }
        for alu in self.alus.iter_mut() {
            alu.latch();
        }
    }

    /// Execute-2 and forwarding.
    fn exec2(&mut self) {
        if self.exception {
            return;
        }
        for alu in self.alus.iter_mut() {
            alu.publish();
        }
        for i in 0..NUM_ALUS {
            if let Some(result) = self.alus[i].last_forward {
                self.apply_forward(result);
            }
        }
    }

    fn apply_forward(&mut self, result: ExecResult) {
        if let Some(entry) = self.active_list.iter_mut().find(|e| e.pc == result.pc) {
            entry.done = true;
            entry.exception = result.exception;
        }
        if result.exception {
            // Result value is unspecified; the destination register never
            // becomes architecturally valid, so it stays busy until rollback
            // frees it during exception-mode commit.
            return;
        }
        for entry in self.integer_queue.iter_mut() {
            if !entry.op_a_ready && entry.op_a_tag == result.dest {
                entry.op_a_ready = true;
                entry.op_a_value = result.value;
            }
            if !entry.op_b_ready && entry.op_b_tag == result.dest {
                entry.op_b_ready = true;
                entry.op_b_value = result.value;
            }
        }
        self.rf[result.dest.0 as usize] = result.value;
        self.busy[result.dest.0 as usize] = false;
    }

    /// Commit, dispatching to normal or exception-draining mode.
    fn commit(&mut self) {
        if self.exception {
            self.commit_exception_mode();
        } else {
            self.commit_normal_mode();
        }
    }

    fn commit_normal_mode(&mut self) {
        for _ in 0..4 {
            let Some(front) = self.active_list.front() else {
                break;
            };
            if !front.done {
                break;
            }
            if front.exception {
                log::info!("commit: exception detected at pc={}", front.pc);
                self.exception = true;
                self.exception_pc = front.pc;
                for alu in self.alus.iter_mut() {
                    alu.reset();
                }
                self.integer_queue.clear();
                return;
            }
            let entry = self.active_list.pop_front().expect("front checked above");
            self.free_list.push_back(entry.old_dest);
            self.committed_count += 1;
        }
    }

    fn commit_exception_mode(&mut self) {
        for _ in 0..4 {
            let Some(entry) = self.active_list.pop_back() else {
                break;
            };
            let current = self.map_table[entry.logical_dest.0 as usize];
            self.map_table[entry.logical_dest.0 as usize] = entry.old_dest;
            self.free_list.push_back(current);
            self.busy[current.0 as usize] = false;
        }
        if self.active_list.is_empty() {
            log::info!(
                "commit: exception drain complete, exception_pc={}",
                self.exception_pc
            );
        }
    }

    /// Structural invariants over register-id partitioning and queue bounds, checked once per cycle.
    fn check_invariants(&self, cycle: u64) -> Result<(), SimError> {
        let err = |message: String| SimError::InvariantViolation { cycle, message };

        if self.dir.len() > MAX_DIR {
            return Err(err(format!("DIR has {} entries", self.dir.len())));
        }
        if self.active_list.len() > MAX_ACTIVE_LIST {
            return Err(err(format!(
                "Active List has {} entries",
                self.active_list.len()
            )));
        }
        if self.integer_queue.len() > MAX_INTEGER_QUEUE {
            return Err(err(format!(
                "Integer Queue has {} entries",
                self.integer_queue.len()
            )));
        }

        let mut seen = [false; NUM_PHYSICAL_REGS];
        {
            let mut mark = |p: PhysReg, role: &str| -> Result<(), SimError> {
                let idx = p.0 as usize;
                if seen[idx] {
                    return Err(err(format!(
                        "physical register p{idx} claimed twice (latest role: {role})"
                    )));
                }
                seen[idx] = true;
                Ok(())
            };
            for &p in &self.free_list {
                mark(p, "free list")?;
            }
            for &p in self.map_table.iter() {
                mark(p, "map table")?;
            }
            for e in &self.active_list {
                mark(e.old_dest, "active list old_dest")?;
            }
        }
        if seen.iter().any(|&s| !s) {
            return Err(err(
                "physical register ids do not partition 0..64".to_string(),
            ));
        }

        for &p in &self.free_list {
            if self.busy[p.0 as usize] {
                return Err(err(format!("p{} is free but marked busy", p.0)));
            }
        }

        for entry in &self.integer_queue {
            if !entry.op_a_ready && !self.busy[entry.op_a_tag.0 as usize] {
                return Err(err(format!(
                    "IQ pc={} operand A tag p{} not ready but not busy",
                    entry.pc, entry.op_a_tag.0
                )));
            }
            if !entry.op_b_ready && !self.busy[entry.op_b_tag.0 as usize] {
                return Err(err(format!(
                    "IQ pc={} operand B tag p{} not ready but not busy",
                    entry.pc, entry.op_b_tag.0
                )));
            }
        }

        let mut last_pc: Option<u64> = None;
        for e in &self.active_list {
            if let Some(lp) = last_pc {
                if e.pc <= lp {
                    return Err(err("Active List PCs are not strictly increasing".to_string()));
                }
            }
            last_pc = Some(e.pc);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_program;

    fn run_lines(lines: &[&str]) -> Vec<Snapshot> {
        let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let program = parse_program(&lines).unwrap();
        let mut sim = Simulator::new(program);
        sim.run().unwrap()
    }

    #[test]
    fn empty_program_yields_one_reset_snapshot() {
        let log = run_lines(&[]);
        assert_eq!(log.len(), 1);
        let s = &log[0];
        assert_eq!(s.pc, 0);
        assert!(!s.exception);
        assert_eq!(s.exception_pc, 0);
        assert_eq!(s.free_list, (32..64).map(PhysReg).collect::<Vec<_>>());
        assert_eq!(
            s.register_map_table,
            (0..32).map(PhysReg).collect::<Vec<_>>()
        );
        assert!(s.active_list.is_empty());
        assert!(s.integer_queue.is_empty());
        assert!(s.busy_bit_table.iter().all(|&b| !b));
    }

    #[test]
    fn single_add_commits_and_frees_old_physical() {
        let log = run_lines(&["add x1, x0, x0"]);
        let last = log.last().unwrap();
        assert!(!last.exception);
        assert_eq!(last.register_map_table[1], PhysReg(32));
        assert_eq!(last.physical_register_file[32], 0);
        assert!(last.free_list.contains(&PhysReg(1)));
        assert!(last.active_list.is_empty());
    }

    #[test]
    fn raw_dependency_waits_for_producer() {
        let log = run_lines(&["addi x1, x0, 5", "add x2, x1, x1"]);
        let last = log.last().unwrap();
        assert!(!last.exception);
        assert_eq!(last.register_map_table[1], PhysReg(32));
        assert_eq!(last.register_map_table[2], PhysReg(33));
        assert_eq!(last.physical_register_file[33], 10);
    }

    #[test]
    fn divide_by_zero_rolls_back_and_stays_excepted() {
        let log = run_lines(&["divu x1, x0, x0"]);
        let last = log.last().unwrap();
        assert!(last.exception);
        assert_eq!(last.exception_pc, 0);
        assert_eq!(last.pc, EXCEPTION_PC_RESET);
        assert!(last.active_list.is_empty());
        assert!(last.integer_queue.is_empty());
        assert_eq!(last.register_map_table[1], PhysReg(1));
        assert!(last.free_list.contains(&PhysReg(32)));
        assert!(!last.busy_bit_table[32]);
    }

    #[test]
    fn free_list_structural_stall_eventually_drains() {
        let lines: Vec<String> = (0..33).map(|i| format!("addi x{}, x0, 1", i % 32)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let log = run_lines(&refs);
        let last = log.last().unwrap();
        assert!(!last.exception);
        assert!(last.active_list.is_empty());
    }
}
