//! Per-user state actor.
//!
//! The actor task is the only code that mutates a user's state. Commands
//! arrive on an mpsc queue and are applied one at a time; after every
//! mutation the new state is published on a watch channel and saved.

use chrono::{DateTime, Utc};
use guard_core::error::StoreError;
use guard_core::traits::StateStore;
use guard_core::types::{RecapSummary, TradeOutcome, UserAction, UserId, UserRiskState};
use guard_core::{GuardError, GuardResult};
use guard_rules::RuleSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::evaluator::{self, ActionEffect, CycleInput, CycleReport};
use crate::recap;
use crate::retry::{retry, RetryPolicy};

const COMMAND_QUEUE: usize = 64;

/// A mutation's result plus whether the new state reached the store.
#[derive(Debug)]
pub(crate) struct Applied<T> {
    pub value: T,
    pub saved: Result<(), StoreError>,
}

#[derive(Debug)]
pub(crate) struct RecapApplied {
    pub summary: RecapSummary,
    pub saved: Result<(), StoreError>,
    pub archived: Result<(), StoreError>,
}

enum Command {
    Cycle {
        input: CycleInput,
        reply: oneshot::Sender<Applied<CycleReport>>,
    },
    RecordOutcome {
        outcome: TradeOutcome,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Applied<()>>,
    },
    Action {
        action: UserAction,
        now: DateTime<Utc>,
        reply: oneshot::Sender<GuardResult<Applied<ActionEffect>>>,
    },
    Recap {
        now: DateTime<Utc>,
        reply: oneshot::Sender<RecapApplied>,
    },
    Stop {
        reply: oneshot::Sender<UserRiskState>,
    },
}

/// Sending side of a user's actor.
pub(crate) struct UserHandle {
    user: UserId,
    tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<UserRiskState>,
}

impl UserHandle {
    /// Start an actor owning `state`.
    pub fn spawn(
        state: UserRiskState,
        rules: Arc<RuleSet>,
        store: Arc<dyn StateStore>,
        retry: RetryPolicy,
    ) -> Self {
        let user = state.user;
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(state.clone());

        let actor = StateActor {
            state,
            rules,
            store,
            retry,
            state_tx,
            dirty: false,
        };
        tokio::spawn(actor.run(rx));

        Self { user, tx, state_rx }
    }

    /// Latest published state.
    pub fn state(&self) -> UserRiskState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UserRiskState> {
        self.state_rx.clone()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> GuardResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| GuardError::ActorStopped(self.user))?;
        rx.await.map_err(|_| GuardError::ActorStopped(self.user))
    }

    pub async fn cycle(&self, input: CycleInput) -> GuardResult<Applied<CycleReport>> {
        self.request(|reply| Command::Cycle { input, reply }).await
    }

    pub async fn record_outcome(&self, outcome: TradeOutcome, now: DateTime<Utc>) -> GuardResult<Applied<()>> {
        self.request(|reply| Command::RecordOutcome { outcome, now, reply })
            .await
    }

    pub async fn action(&self, action: UserAction, now: DateTime<Utc>) -> GuardResult<Applied<ActionEffect>> {
        self.request(|reply| Command::Action { action, now, reply })
            .await?
    }

    pub async fn recap(&self, now: DateTime<Utc>) -> GuardResult<RecapApplied> {
        self.request(|reply| Command::Recap { now, reply }).await
    }

    /// Stop the actor after the queued commands and return the final state.
    pub async fn stop(&self) -> GuardResult<UserRiskState> {
        self.request(|reply| Command::Stop { reply }).await
    }
}

struct StateActor {
    state: UserRiskState,
    rules: Arc<RuleSet>,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
    state_tx: watch::Sender<UserRiskState>,
    /// The last save failed; the in-memory state is ahead of the store
    dirty: bool,
}

impl StateActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(user = %self.state.user, "State actor started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Cycle { input, reply } => {
                    let report = evaluator::apply_cycle(&mut self.state, &self.rules, input);
                    let saved = self.commit().await;
                    let _ = reply.send(Applied { value: report, saved });
                }
                Command::RecordOutcome { outcome, now, reply } => {
                    self.state.record_outcome(outcome);
                    self.state
                        .prune_outcomes(now, self.rules.config().outcome_horizon());
                    self.state.updated_at = now;
                    let saved = self.commit().await;
                    let _ = reply.send(Applied { value: (), saved });
                }
                Command::Action { action, now, reply } => {
                    let result = match evaluator::apply_action(&mut self.state, &self.rules, action, now) {
                        Ok(effect) => Ok(Applied {
                            value: effect,
                            saved: self.commit().await,
                        }),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                Command::Recap { now, reply } => {
                    let summary = recap::close_day(&mut self.state, now);
                    let saved = self.commit().await;
                    let archived = self.archive(&summary).await;
                    let _ = reply.send(RecapApplied {
                        summary,
                        saved,
                        archived,
                    });
                }
                Command::Stop { reply } => {
                    if self.dirty {
                        let _ = self.save().await;
                    }
                    let _ = reply.send(self.state.clone());
                    break;
                }
            }
        }

        debug!(user = %self.state.user, "State actor stopped");
    }

    /// Publish the current state and persist it.
    async fn commit(&mut self) -> Result<(), StoreError> {
        self.state_tx.send_replace(self.state.clone());
        self.save().await
    }

    async fn save(&mut self) -> Result<(), StoreError> {
        let user = self.state.user;
        let state = &self.state;
        let store = &self.store;

        match retry(&self.retry, "save_state", || store.save_state(user, state)).await {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!(user = %user, attempts = e.attempts, error = %e.last, "Failed to persist state");
                self.dirty = true;
                Err(e.last)
            }
        }
    }

    async fn archive(&self, summary: &RecapSummary) -> Result<(), StoreError> {
        let user = self.state.user;
        let store = &self.store;

        retry(&self.retry, "archive_recap", || store.archive_recap(user, summary))
            .await
            .map_err(|e| {
                error!(user = %user, attempts = e.attempts, error = %e.last, "Failed to archive recap");
                e.last
            })
    }
}
