//! In-memory state store.

use async_trait::async_trait;
use guard_core::error::StoreError;
use guard_core::traits::StateStore;
use guard_core::types::{RecapSummary, UserId, UserRiskState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: Mutex<HashMap<UserId, UserRiskState>>,
    recaps: Mutex<HashMap<UserId, Vec<RecapSummary>>>,
    /// Saves still to fail with `Unavailable`
    failing_saves: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a saved state, as if from a previous run.
    pub fn with_state(self, state: UserRiskState) -> Self {
        lock(&self.states).insert(state.user, state);
        self
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Last saved state for a user.
    pub fn saved(&self, user: UserId) -> Option<UserRiskState> {
        lock(&self.states).get(&user).cloned()
    }

    /// Archived recaps for a user, oldest first.
    pub fn recaps(&self, user: UserId) -> Vec<RecapSummary> {
        lock(&self.recaps).get(&user).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_state(&self, user: UserId) -> Result<Option<UserRiskState>, StoreError> {
        Ok(lock(&self.states).get(&user).cloned())
    }

    async fn save_state(&self, user: UserId, state: &UserRiskState) -> Result<(), StoreError> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }

        lock(&self.states).insert(user, state.clone());
        Ok(())
    }

    async fn archive_recap(&self, user: UserId, summary: &RecapSummary) -> Result<(), StoreError> {
        lock(&self.recaps).entry(user).or_default().push(summary.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
