//! ooo470 library crate.
//!
//! Exposes the pipeline simulator core for use by the `ooo470` binary, the
//! `fuzz_gen` fixture generator, and integration tests.
//!
//! Modules:
//! - error: the three error categories (I/O, programmer error, invariant violation)
//! - loader: textual program parser (JSON array of instruction strings -> decoded instructions)
//! - types: shared data model (registers, opcodes, decoded instructions)
//! - simulator: the six-stage pipeline, run in reverse order each cycle
//! - report: state-log JSON writer

pub mod error;
pub mod loader;
pub mod report;
pub mod simulator;
pub mod types;

pub use error::SimError;
pub use simulator::{Simulator, Snapshot};
