//! Command-line interface for `corectl`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Diagnostic CLI over the capability & service orchestration core.
#[derive(Parser, Debug)]
#[command(name = "corectl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CORE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CORE_LOG_FORMAT")]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands exposed by `corectl`.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a directory tree of capability/service-capability YAML.
    Validate {
        /// Directory (or single file) to validate. Recurses into subdirectories.
        path: PathBuf,

        /// Exit non-zero on warnings as well as errors.
        #[arg(long)]
        strict: bool,
    },

    /// Wire an in-memory tool oracle/caller to the orchestrator for local experimentation.
    Demo {
        /// Directory of capability/service-capability YAML to load before running the demo.
        #[arg(long)]
        definitions: Option<PathBuf>,
    },
}
