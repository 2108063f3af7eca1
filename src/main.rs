use clap::Parser;
use ooo470::{loader, report, simulator, SimError};
use std::path::PathBuf;
use std::process::ExitCode;

/// Cycle-accurate functional simulator of an out-of-order superscalar
/// integer pipeline.
#[derive(Parser, Debug)]
#[command(name = "ooo470", version, about)]
struct Cli {
    /// Program file: a JSON array of instruction strings.
    input: PathBuf,

    /// Where to write the cycle-by-cycle state log.
    #[arg(short, long, default_value = "out_log.json")]
    output: PathBuf,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ooo470: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    let program = loader::load_program(&cli.input)?;
    log::info!("loaded {} instructions from {}", program.len(), cli.input.display());

    let mut sim = simulator::Simulator::new(program);
    let log = sim.run()?;

    report::write_log(&cli.output, &log)?;
    log::info!("wrote {} snapshots to {}", log.len(), cli.output.display());
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}
