//! Random test-program generator, for differential testing against a
//! reference oracle running independently of this crate. Builds N random
//! programs with `rand`, writing each as a JSON array of instruction
//! strings, the way this corpus's own CPU test-case generators (e.g.
//! `gen_*_tests` binaries) produce their fixtures.

use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;

const OPCODES: &[&str] = &["add", "addi", "sub", "mulu", "divu", "remu"];
const NUM_LOGICAL_REGS: u32 = 32;

/// Generates random instruction-stream fixtures for the ooo470 simulator.
#[derive(Parser, Debug)]
#[command(name = "fuzz_gen", version, about)]
struct Cli {
    /// Directory to write the generated `test_NNN.json` fixtures into.
    #[arg(short, long, default_value = "fuzz_programs")]
    out_dir: PathBuf,

    /// Number of programs to generate.
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Maximum instruction count per generated program.
    #[arg(short = 'l', long, default_value_t = 20)]
    max_length: usize,
}

fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.out_dir)?;

    let mut rng = rand::thread_rng();
    for i in 0..cli.count {
        let program = generate_program(&mut rng, cli.max_length);
        let path = cli.out_dir.join(format!("test_{i:03}.json"));
        let json = serde_json::to_string_pretty(&program)?;
        std::fs::write(&path, json)?;
        println!("wrote {} ({} instructions)", path.display(), program.len());
    }
    Ok(())
}

fn generate_program(rng: &mut impl Rng, max_length: usize) -> Vec<String> {
    let length = rng.gen_range(0..=max_length);
    (0..length)
        .map(|_| generate_instruction(rng))
        .collect()
}

fn generate_instruction(rng: &mut impl Rng) -> String {
    let opcode = *OPCODES.choose(rng).expect("OPCODES is non-empty");
    let dest = rng.gen_range(0..NUM_LOGICAL_REGS);
    let op1 = rng.gen_range(0..NUM_LOGICAL_REGS);
    let op2 = if opcode == "addi" {
        rng.gen_range(1..=30).to_string()
    } else {
        format!("x{}", rng.gen_range(0..NUM_LOGICAL_REGS))
    };
    format!("{opcode} x{dest}, x{op1}, {op2}")
}
