//! Command-line definition.
//!
//! There are no subcommands. Every option can be set through its
//! environment variable, so a bare `duo-infra` run is fully env-driven.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use duo_iac::{TemplateFormat, CONTEXT_FILE, DEFAULT_REGION};

/// duo-infra - pre-deploy checks and stack synthesis for the Duolingo web app
#[derive(Parser, Debug, Clone)]
#[command(name = "duo-infra")]
#[command(version, about = "Pre-deploy checks and stack synthesis for the Duolingo web app")]
#[command(long_about = r#"
Runs the pre-deploy safety checks (required environment variables and the
app Dockerfile), then declares the Fargate stack and writes a cloud
assembly for the deployment engine to apply.

EXIT CODES:
  0 - Checks passed and the stack was synthesized
  1 - A required setting or the Dockerfile is missing
  2 - Synthesis or IO error
"#)]
pub struct Cli {
    /// App directory containing the Dockerfile
    #[arg(long, env = "DUO_APP_DIR")]
    pub app_dir: Option<PathBuf>,

    /// Env file loaded before the checks; existing variables win
    #[arg(long, env = "DUO_ENV_FILE", default_value = ".env")]
    pub env_file: PathBuf,

    /// Output directory for the cloud assembly
    #[arg(long, env = "DUO_OUT_DIR", default_value = "cdk.out")]
    pub out_dir: PathBuf,

    /// Template format (json or yaml)
    #[arg(long, env = "DUO_TEMPLATE_FORMAT", default_value = "json", value_parser = parse_format)]
    pub format: TemplateFormat,

    /// Deployment region
    #[arg(long, env = "DUO_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Context cache with answered lookups, keyed by lookup key
    #[arg(long, env = "DUO_CONTEXT_FILE", default_value = CONTEXT_FILE)]
    pub context_file: PathBuf,

    /// Log output format
    #[arg(long, env = "DUO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long, env = "DUO_VERBOSE")]
    pub verbose: bool,
}

impl Cli {
    /// App directory, defaulting to the `duolingo` checkout next to this repo.
    pub fn app_dir(&self) -> PathBuf {
        self.app_dir.clone().unwrap_or_else(default_app_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

fn parse_format(s: &str) -> Result<TemplateFormat, String> {
    TemplateFormat::parse(s).map_err(|e| e.to_string())
}

fn default_app_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("..")
        .join("duolingo")
}
