//! State log writer: serializes the cycle-by-cycle snapshot log to a
//! user-supplied path as pretty-printed JSON.

use crate::error::SimError;
use crate::simulator::Snapshot;
use std::path::Path;

pub fn write_log(path: &Path, log: &[Snapshot]) -> Result<(), SimError> {
    let output = serde_json::to_string_pretty(log)?;
    std::fs::write(path, output)?;
    Ok(())
}
