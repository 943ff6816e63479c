//! supergemlock command-line entry point.
//!
//! With no arguments, runs the fast-path-aware resolution pipeline against
//! the current directory. See `sgl` for the install/update/check surface.

use clap::Parser;
use std::env;
use std::process::ExitCode;
use supergemlock::catalog::SeededCatalogSource;
use supergemlock::orchestrator;

/// Display an error with its full cause chain.
fn display_error(err: &anyhow::Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(err) = source {
        eprintln!("caused by: {err}");
        source = err.source();
    }
}

#[derive(Parser)]
#[command(name = "supergemlock")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve a Gemfile and emit a Bundler-compatible lock file", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    _version: Option<bool>,
}

fn main() -> ExitCode {
    let _cli = Cli::parse();

    let dir = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            display_error(&anyhow::anyhow!(err));
            return ExitCode::FAILURE;
        }
    };

    let source = SeededCatalogSource::default_catalog();
    match orchestrator::run(&dir, &source) {
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
