//! CLI definitions.

pub mod commands;
pub mod replay;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "guard")]
#[command(author, version, about = "Advisory risk monitor for derivatives positions")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level (overrides logging.level)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scenario in accelerated real time with the polling scheduler
    Run(RunArgs),
    /// Replay a scenario deterministically and report the findings
    Evaluate(EvaluateArgs),
    /// Show a user's stored discipline score
    Score(ScoreArgs),
    /// Deliver a sample alert to check the notification path
    TestAlert(TestAlertArgs),
    /// Validate configuration
    ValidateConfig,
    /// Print the default configuration
    DefaultConfig,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Scenario file (JSON)
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Real seconds per scenario minute
    #[arg(long, default_value = "1")]
    pub minute_secs: u64,
}

#[derive(clap::Args)]
pub struct EvaluateArgs {
    /// Scenario file (JSON)
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Only report this user
    #[arg(short, long)]
    pub user: Option<u64>,

    /// Output format
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Use the configured store instead of a throwaway in-memory one
    #[arg(long)]
    pub persist: bool,
}

#[derive(clap::Args)]
pub struct ScoreArgs {
    /// User id
    #[arg(short, long)]
    pub user: u64,

    /// Recent alerts to list (0 to hide)
    #[arg(short, long, default_value = "10")]
    pub alerts: usize,
}

#[derive(clap::Args)]
pub struct TestAlertArgs {
    /// User id
    #[arg(short, long)]
    pub user: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
