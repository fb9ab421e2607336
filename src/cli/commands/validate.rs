//! Validate configuration command.

use anyhow::Result;
use guard_config::{AppConfig, ConfigError};
use std::path::Path;

pub fn run(config_path: &Path, loaded: Result<AppConfig, ConfigError>) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match loaded {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Max risk: {}%", config.rules.max_risk_pct);
            println!("Min liquidation distance: {}%", config.rules.min_liq_distance_pct);
            println!("Stop-loss grace: {} min", config.rules.no_sl_timeout_minutes);
            println!(
                "Revenge trading: {} losses in {} min",
                config.rules.revenge_min_losses, config.rules.revenge_window_minutes
            );
            println!(
                "Overtrading: {} trades in {} min",
                config.rules.revenge_max_trades, config.rules.revenge_frequency_window_minutes
            );
            println!("Alert cooldown: {} min", config.rules.cooldown_minutes);
            for (rule, minutes) in &config.rules.rule_cooldowns {
                println!("  {}: {} min", rule.name(), minutes);
            }
            println!("Poll interval: {}s", config.scheduler.poll_interval_seconds);
            println!("Daily recap: {:02}:00 UTC", config.scheduler.daily_recap_hour);
            println!("Store: {:?} ({})", config.store.kind, config.store.path.display());
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
