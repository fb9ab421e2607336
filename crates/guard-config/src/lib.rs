//! Configuration management.

mod settings;

pub use settings::{AppConfig, AppSettings, LoggingConfig, SchedulerConfig, StoreConfig, StoreKind};

pub use config::ConfigError;

use config::{Config, Environment, File};
use std::path::Path;

/// Load configuration from file and environment.
///
/// Environment variables use the `GUARD_` prefix and `__` between levels,
/// e.g. `GUARD_RULES__MAX_RISK_PCT=1.5`.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    load_with_env(path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix("GUARD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_with_env(path: &Path, env: Environment) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(env)
        .build()?;

    let app: AppConfig = config.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// The default configuration as TOML.
pub fn default_config_toml() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&AppConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[rules]\nmax_risk_pct = 2.0\n").unwrap();

        let vars = [
            ("GUARD_RULES__MAX_RISK_PCT", "1.5"),
            ("GUARD_SCHEDULER__POLL_INTERVAL_SECONDS", "30"),
            ("OTHER_RULES__MAX_RISK_PCT", "9"),
        ];
        let env = environment().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));

        let config = load_with_env(file.path(), env).unwrap();
        assert_eq!(config.rules.max_risk_pct, dec!(1.5));
        assert_eq!(config.scheduler.poll_interval_seconds, 30);
    }
}
