//! The three error categories of the simulator: I/O/JSON plumbing, programmer
//! errors in the input program, and internal invariant violations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input JSON is not an array of instruction strings")]
    NotAnArray,

    #[error("line {line}: {message}")]
    Loader { line: u64, message: String },

    #[error("program has {len} instructions, exceeding the 2^31 limit")]
    ProgramTooLong { len: usize },

    #[error("invariant violated at cycle {cycle}: {message}")]
    InvariantViolation { cycle: u64, message: String },
}
