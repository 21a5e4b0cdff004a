// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rendertask`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rendertask",
    version,
    about = "Run render jobs as background processes and track their progress over HTTP.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Rendertask.toml` in the current working directory is used
    /// when present, otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Address to listen on, overriding `[server].bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RENDERTASK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the config, print it, and exit without serving.
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
