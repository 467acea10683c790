//! duo-infra - Main entry point.
//!
//! Exit codes:
//! - 0: Checks passed, stack synthesized
//! - 1: Pre-deploy checks failed
//! - 2: Synthesis or IO error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use duo_iac::Settings;

mod cli;
mod deploy;

use cli::{Cli, LogFormat};
use deploy::Outcome;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const PREFLIGHT_FAILURE: u8 = 1;
    pub const SYNTH_ERROR: u8 = 2;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    // Snapshot the environment once; everything downstream reads from it.
    let settings = Settings::from_env();

    match deploy::execute(&cli, settings) {
        Ok(Outcome::Synthesized { .. }) => ExitCode::from(ExitCodes::SUCCESS),
        Ok(Outcome::Aborted(_)) => ExitCode::from(ExitCodes::PREFLIGHT_FAILURE),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(ExitCodes::SYNTH_ERROR)
        }
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose { "duo=debug" } else { "duo=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", default_level)));

    let log_result = match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    if let Err(e) = log_result {
        eprintln!("⚠️  Logging not initialized: {}", e);
    }
}
