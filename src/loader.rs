//! Textual program loader: parses a JSON array of instruction strings into
//! an ordered sequence of [`DecodedInstruction`]s. This is the only module
//! that deals with the program's text form; everything downstream works on
//! typed data.
//!
//! Instruction grammar: `OPCODE DEST, OP1, OP2` where `DEST` and `OP1` are
//! register tokens `xN` (0 <= N < 32), `OP2` is either a register token or
//! a non-negative decimal integer, and `OPCODE` is one of
//! `add addi sub mulu divu remu`. An instruction's PC is its index in the
//! array.

use crate::error::SimError;
use crate::types::{DecodedInstruction, LogReg, Operand, Opcode, NUM_LOGICAL_REGS};
use std::path::Path;

const MAX_PROGRAM_LEN: usize = 1 << 31;

/// Loads and parses a program from a JSON file on disk.
pub fn load_program(path: &Path) -> Result<Vec<DecodedInstruction>, SimError> {
    let text = std::fs::read_to_string(path)?;
    let lines = parse_instruction_array(&text)?;
    parse_program(&lines)
}

fn parse_instruction_array(text: &str) -> Result<Vec<String>, SimError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let array = value.as_array().ok_or(SimError::NotAnArray)?;
    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(SimError::NotAnArray)
        })
        .collect()
}

/// Parses already-split instruction-line strings into decoded instructions.
/// Exposed separately from [`load_program`] so tests can build programs
/// directly from string literals.
pub fn parse_program(lines: &[String]) -> Result<Vec<DecodedInstruction>, SimError> {
    if lines.len() > MAX_PROGRAM_LEN {
        return Err(SimError::ProgramTooLong { len: lines.len() });
    }

    lines
        .iter()
        .enumerate()
        .map(|(pc, line)| parse_instruction(pc as u64, line))
        .collect()
}

fn parse_instruction(pc: u64, line: &str) -> Result<DecodedInstruction, SimError> {
    let err = |message: String| SimError::Loader { line: pc, message };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 {
        return Err(err(format!(
            "expected `OPCODE DEST, OP1, OP2`, got `{line}`"
        )));
    }

    let opcode = Opcode::from_mnemonic(parts[0])
        .ok_or_else(|| err(format!("unknown opcode `{}`", parts[0])))?;

    let dest = parse_register(parts[1].trim_end_matches(','), &err)?;
    let src_a = parse_register(parts[2].trim_end_matches(','), &err)?;

    let op2_token = parts[3];
    let is_reg_token = op2_token.starts_with('x');
    let src_b = if opcode.takes_immediate() {
        if is_reg_token {
            return Err(err(format!(
                "`addi` requires an immediate second operand, got `{op2_token}`"
            )));
        }
        Operand::Immediate(parse_immediate(op2_token, &err)?)
    } else if is_reg_token {
        Operand::Register(parse_register(op2_token, &err)?)
    } else {
        return Err(err(format!(
            "`{}` requires a register second operand, got `{op2_token}`",
            opcode.as_str()
        )));
    };

    Ok(DecodedInstruction {
        pc,
        opcode,
        dest,
        src_a,
        src_b,
    })
}

fn parse_register(
    token: &str,
    err: &impl Fn(String) -> SimError,
) -> Result<LogReg, SimError> {
    let digits = token
        .strip_prefix('x')
        .ok_or_else(|| err(format!("expected register token, got `{token}`")))?;
    let id: u32 = digits
        .parse()
        .map_err(|_| err(format!("malformed register token `{token}`")))?;
    if id as usize >= NUM_LOGICAL_REGS {
        return Err(err(format!(
            "register index {id} out of range (0..{NUM_LOGICAL_REGS})"
        )));
    }
    Ok(LogReg(id))
}

fn parse_immediate(token: &str, err: &impl Fn(String) -> SimError) -> Result<u64, SimError> {
    token
        .parse()
        .map_err(|_| err(format!("malformed non-negative immediate `{token}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add() {
        let prog = parse_program(&["add x1, x2, x3".to_string()]).unwrap();
        assert_eq!(prog.len(), 1);
        assert_eq!(prog[0].pc, 0);
        assert_eq!(prog[0].opcode, Opcode::Add);
        assert_eq!(prog[0].dest.0, 1);
        assert_eq!(prog[0].src_a.0, 2);
        assert!(matches!(prog[0].src_b, Operand::Register(LogReg(3))));
    }

    #[test]
    fn parses_addi_immediate() {
        let prog = parse_program(&["addi x1, x0, 5".to_string()]).unwrap();
        assert!(matches!(prog[0].src_b, Operand::Immediate(5)));
    }

    #[test]
    fn rejects_addi_with_register_operand() {
        assert!(parse_program(&["addi x1, x0, x2".to_string()]).is_err());
    }

    #[test]
    fn rejects_out_of_range_register() {
        assert!(parse_program(&["add x32, x0, x0".to_string()]).is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(parse_program(&["xor x1, x0, x0".to_string()]).is_err());
    }

    #[test]
    fn pc_is_array_index() {
        let prog = parse_program(&[
            "add x1, x0, x0".to_string(),
            "sub x2, x1, x0".to_string(),
        ])
        .unwrap();
        assert_eq!(prog[0].pc, 0);
        assert_eq!(prog[1].pc, 1);
    }
}
