// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskwarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskwarden",
    version,
    about = "Supervise background shells and jobs behind a local HTTP API.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskwarden.toml` in the current working directory. A
    /// missing file just means defaults for everything.
    #[arg(long, value_name = "PATH", default_value = "Taskwarden.toml")]
    pub config: String,

    /// Override `[server].listen` (e.g. "127.0.0.1:9000").
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Override `[state].dir`.
    #[arg(long, value_name = "PATH")]
    pub state_dir: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKWARDEN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config, print the effective settings, but don't
    /// start the daemon.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
