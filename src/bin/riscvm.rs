//! Command-line entry point: loads a flat binary image and runs it.
//!
//! This binary is the "external loader" spec.md carves out of the
//! core: it owns argument parsing, logging setup, reading the image
//! file, and deciding the process exit code from the core's
//! [`RunOutcome`]. None of it is part of the byte-exact stdout
//! protocol the core itself writes (console routines, diagnostic
//! dump) -- this file only ever writes what the core told it to.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use riscvm::image::load_image;
use riscvm::{Machine, RunOutcome};

/// Run a flat binary image on the instruction-set emulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the binary image: 1024 bytes of instruction memory
    /// followed by 1024 bytes of data memory.
    image: PathBuf,

    /// Increase logging verbosity (repeatable: info, debug, trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level_for(args.verbose)),
    )
    .init();

    let (inst_mem, data_mem) = match load_image(&args.image) {
        Ok(images) => images,
        Err(e) => {
            log::error!("failed to load image: {e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("loaded image from {}", args.image.display());

    let mut machine = Machine::new(inst_mem, data_mem);
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let outcome = machine.run(&mut stdin, &mut stdout);
    let output = machine.take_console_output();
    print!("{output}");
    stdout.flush().ok();

    match outcome {
        RunOutcome::Halted { explicit: true } => {
            log::info!("halt requested at pc=0x{:08x}", machine.pc());
            println!("CPU Halt Requested");
            ExitCode::SUCCESS
        }
        RunOutcome::Halted { explicit: false } => {
            log::info!("fell through past instruction memory");
            ExitCode::SUCCESS
        }
        RunOutcome::Faulted(report) => {
            print!("{}", report.render());
            ExitCode::FAILURE
        }
    }
}
