//! `sgl` — companion command-routing binary.
//!
//! Thin wrapper around the orchestrator exposing `install`, `update`,
//! `check`, and `help` sub-commands (spec §6). No argument is taken to mean
//! "help"; clap already enforces that a sub-command is required.

use clap::{Parser, Subcommand};
use std::env;
use std::process::ExitCode;
use supergemlock::catalog::SeededCatalogSource;
use supergemlock::paths;
use supergemlock::{orchestrator, snapshot};

fn display_error(err: &anyhow::Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(err) = source {
        eprintln!("caused by: {err}");
        source = err.source();
    }
}

#[derive(Parser)]
#[command(name = "sgl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install, update, or check a resolved Gemfile", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-use an existing lock file, or resolve if none exists
    Install,
    /// Ignore any existing lock and re-resolve
    Update {
        /// Library names to update (accepted, currently resolves everything)
        names: Vec<String>,
    },
    /// Report whether a lock file is present
    Check,
    /// Print usage information
    Help,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            display_error(&anyhow::anyhow!(err));
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Install => run_install(&dir),
        Command::Update { names } => run_update(&dir, &names),
        Command::Check => run_check(&dir),
        Command::Help => {
            print_help();
            ExitCode::SUCCESS
        }
    }
}

fn run_install(dir: &std::path::Path) -> ExitCode {
    let lock_path = paths::lockfile_in(dir);
    let snapshot_path = paths::snapshot_in(dir);

    if lock_path.exists() {
        match snapshot::read(&snapshot_path) {
            Ok(snap) => {
                print_libraries(&snap);
                return ExitCode::SUCCESS;
            }
            Err(err) => {
                display_error(&anyhow::Error::from(err));
                return ExitCode::FAILURE;
            }
        }
    }

    let source = SeededCatalogSource::default_catalog();
    match orchestrator::run(dir, &source) {
        Ok(summary) => {
            println!("{}", orchestrator::summary_line(&summary));
            ExitCode::SUCCESS
        }
        Err(err) => {
            display_error(&anyhow::Error::from(err));
            ExitCode::FAILURE
        }
    }
}

fn run_update(dir: &std::path::Path, _names: &[String]) -> ExitCode {
    let source = SeededCatalogSource::default_catalog();
    match orchestrator::run_full(dir, &source) {
        Ok(summary) => {
            println!("{}", orchestrator::summary_line(&summary));
            ExitCode::SUCCESS
        }
        Err(err) => {
            display_error(&anyhow::Error::from(err));
            ExitCode::FAILURE
        }
    }
}

fn run_check(dir: &std::path::Path) -> ExitCode {
    let lock_path = paths::lockfile_in(dir);
    if lock_path.exists() {
        println!("Gemfile.lock present");
        ExitCode::SUCCESS
    } else {
        println!("Gemfile.lock missing");
        ExitCode::FAILURE
    }
}

fn print_libraries(snap: &snapshot::Snapshot) {
    for library in &snap.libraries {
        println!("  {} ({})", library.name, library.version);
    }
}

fn print_help() {
    println!("sgl — install, update, or check a resolved Gemfile");
    println!();
    println!("USAGE:");
    println!("    sgl <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    install        Re-use an existing lock file, or resolve if none exists");
    println!("    update [NAMES...]  Ignore any existing lock and re-resolve");
    println!("    check          Report whether a lock file is present");
    println!("    help           Print this message");
}
