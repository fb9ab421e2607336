//! Print the default configuration.

use anyhow::Result;
use guard_config::default_config_toml;

pub fn run() -> Result<()> {
    print!("{}", default_config_toml()?);
    Ok(())
}
