//! Core data types shared by the loader and the simulator.
//!
//! Operand B is a genuine sum type rather than a string-tagged field, and
//! register ids are newtypes so the logical (0..32) and physical (0..64)
//! id spaces can't be mixed up at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUM_LOGICAL_REGS: usize = 32;
pub const NUM_PHYSICAL_REGS: usize = 64;
pub const MAX_DIR: usize = 4;
pub const MAX_ACTIVE_LIST: usize = 32;
pub const MAX_INTEGER_QUEUE: usize = 32;
pub const NUM_ALUS: usize = 4;
pub const EXCEPTION_PC_RESET: u64 = 0x10000;

/// A logical (architectural) register id, 0..32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogReg(pub u32);

impl fmt::Debug for LogReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A physical register id, 0..64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysReg(pub u32);

impl fmt::Debug for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// The six opcodes this machine can execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "addi")]
    Addi,
    #[serde(rename = "sub")]
    Sub,
    #[serde(rename = "mulu")]
    Mulu,
    #[serde(rename = "divu")]
    Divu,
    #[serde(rename = "remu")]
    Remu,
}

impl Opcode {
    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        match s {
            "add" => Some(Opcode::Add),
            "addi" => Some(Opcode::Addi),
            "sub" => Some(Opcode::Sub),
            "mulu" => Some(Opcode::Mulu),
            "divu" => Some(Opcode::Divu),
            "remu" => Some(Opcode::Remu),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Addi => "addi",
            Opcode::Sub => "sub",
            Opcode::Mulu => "mulu",
            Opcode::Divu => "divu",
            Opcode::Remu => "remu",
        }
    }

    /// Only `addi` carries an immediate second operand.
    pub fn takes_immediate(&self) -> bool {
        matches!(self, Opcode::Addi)
    }
}

/// Operand B: either a logical register or a non-negative immediate.
#[derive(Clone, Copy, Debug)]
pub enum Operand {
    Register(LogReg),
    Immediate(u64),
}

/// A fully decoded instruction, read-only once produced by the loader.
#[derive(Clone, Debug)]
pub struct DecodedInstruction {
    pub pc: u64,
    pub opcode: Opcode,
    pub dest: LogReg,
    pub src_a: LogReg,
    pub src_b: Operand,
}
