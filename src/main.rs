//! Position guard CLI application.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use guard_config::{load_config, AppConfig, ConfigError};
use guard_monitor::setup_logging;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);

    // Setup logging
    let log_level = match cli.log_level {
        Some(cli::LogLevel::Trace) => "trace",
        Some(cli::LogLevel::Debug) => "debug",
        Some(cli::LogLevel::Info) => "info",
        Some(cli::LogLevel::Warn) => "warn",
        Some(cli::LogLevel::Error) => "error",
        None => config
            .as_ref()
            .map(|c| c.logging.level.as_str())
            .unwrap_or("info"),
    };
    let json_logs = cli.json_logs
        || config
            .as_ref()
            .is_ok_and(|c| c.logging.format == "json");
    let log_file: Option<PathBuf> = config
        .as_ref()
        .ok()
        .and_then(|c| c.logging.file.as_ref())
        .map(PathBuf::from);
    let _guard = setup_logging(log_level, json_logs, log_file.as_deref());

    // Execute command
    match cli.command {
        Commands::Run(args) => cli::commands::run::run(args, loaded(config, &cli.config)?).await,
        Commands::Evaluate(args) => cli::commands::evaluate::run(args, loaded(config, &cli.config)?).await,
        Commands::Score(args) => cli::commands::score::run(args, loaded(config, &cli.config)?).await,
        Commands::TestAlert(args) => cli::commands::test_alert::run(args, loaded(config, &cli.config)?).await,
        Commands::ValidateConfig => cli::commands::validate::run(&cli.config, config),
        Commands::DefaultConfig => cli::commands::default_config::run(),
    }
}

fn loaded(config: Result<AppConfig, ConfigError>, path: &Path) -> Result<AppConfig> {
    config.with_context(|| format!("Failed to load configuration from {}", path.display()))
}
