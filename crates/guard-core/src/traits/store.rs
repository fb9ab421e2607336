//! State persistence trait definition.

use crate::error::StoreError;
use crate::types::{RecapSummary, UserId, UserRiskState};
use async_trait::async_trait;

/// Durable storage for per-user state.
///
/// `save_state` is called after every mutation and must be crash-consistent:
/// after a restart the stored state is either the previous or the new value,
/// never a torn write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state of a user, `None` for a first-seen user.
    async fn load_state(&self, user: UserId) -> Result<Option<UserRiskState>, StoreError>;

    /// Replace the stored state of a user.
    async fn save_state(&self, user: UserId, state: &UserRiskState) -> Result<(), StoreError>;

    /// Archive a daily recap before the counters are reset.
    async fn archive_recap(&self, user: UserId, summary: &RecapSummary) -> Result<(), StoreError>;

    /// Get the store name.
    fn name(&self) -> &str;
}
