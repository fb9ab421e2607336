//! CLI command implementations.

pub mod default_config;
pub mod evaluate;
pub mod run;
pub mod score;
pub mod test_alert;
pub mod validate;

use anyhow::{Context, Result};
use guard_config::{StoreConfig, StoreKind};
use guard_core::traits::StateStore;
use guard_store::{JsonFileStore, MemoryStore};
use std::sync::Arc;

/// Open the configured state store.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Json => Arc::new(
            JsonFileStore::open(config.path.clone())
                .with_context(|| format!("Failed to open store at {}", config.path.display()))?,
        ),
    };
    Ok(store)
}
