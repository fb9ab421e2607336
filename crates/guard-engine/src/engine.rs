//! Engine facade: user registry, evaluation cycles and delivery.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use guard_core::error::{ExchangeError, NotifyError};
use guard_core::traits::{Clock, ExchangeSource, NotificationSink, StateStore};
use guard_core::types::{
    DisciplineScore, PositionSnapshot, RecapSummary, RiskFinding, RuleKind, Severity,
    TradeOutcome, UserAction, UserId, UserRiskState,
};
use guard_core::{GuardError, GuardResult};
use guard_rules::RuleSet;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::actor::UserHandle;
use crate::evaluator::{ActionEffect, CycleInput};
use crate::retry::{retry, with_timeout, Exhausted, RetryPolicy};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Policy for exchange and store calls; `timeout` also bounds each delivery
    pub retry: RetryPolicy,
    /// Delivery attempts per finding before it is dropped from the outbox
    pub max_delivery_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_delivery_attempts: 5,
        }
    }
}

/// Summary of one `evaluate_once` call.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub positions: usize,
    /// Findings recorded this cycle
    pub findings: Vec<RiskFinding>,
    pub suppressed: usize,
    pub delivered: usize,
    /// Findings waiting in the outbox for the next cycle
    pub queued: usize,
    pub dropped: usize,
}

struct PendingDelivery {
    finding: RiskFinding,
    attempts: u32,
}

struct UserEntry {
    handle: UserHandle,
    /// Undelivered findings. Holding the lock also serializes a user's cycles.
    outbox: Mutex<VecDeque<PendingDelivery>>,
}

/// The risk engine.
///
/// Owns one state actor per registered user. All methods take `&self` and
/// may be called concurrently; work for different users never blocks on
/// each other beyond the registry lock.
pub struct RiskEngine {
    rules: Arc<RuleSet>,
    exchange: Arc<dyn ExchangeSource>,
    notifier: Arc<dyn NotificationSink>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    users: RwLock<HashMap<UserId, Arc<UserEntry>>>,
}

impl RiskEngine {
    pub fn new(
        rules: RuleSet,
        exchange: Arc<dyn ExchangeSource>,
        notifier: Arc<dyn NotificationSink>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            exchange,
            notifier,
            store,
            clock,
            settings: EngineSettings::default(),
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Start tracking a user, loading saved state if the store has any.
    ///
    /// The store load runs without the registry lock held, so a slow load
    /// only delays this user.
    pub async fn register_user(&self, user: UserId) -> GuardResult<()> {
        if self.users.read().await.contains_key(&user) {
            return Err(GuardError::AlreadyRegistered(user));
        }

        let store = &self.store;
        let loaded = retry(&self.settings.retry, "load_state", || store.load_state(user))
            .await
            .map_err(|e| GuardError::Store(e.last))?;
        let state = match loaded {
            Some(state) => {
                info!(user = %user, violations = state.violation_count, "Loaded saved state");
                state
            }
            None => UserRiskState::new(user, self.clock.now()),
        };

        let handle = UserHandle::spawn(
            state,
            Arc::clone(&self.rules),
            Arc::clone(&self.store),
            self.settings.retry.clone(),
        );

        let mut users = self.users.write().await;
        if users.contains_key(&user) {
            drop(users);
            // Lost a concurrent registration; discard this actor.
            if let Err(e) = handle.stop().await {
                debug!(user = %user, error = %e, "Duplicate actor stop failed");
            }
            return Err(GuardError::AlreadyRegistered(user));
        }
        users.insert(
            user,
            Arc::new(UserEntry {
                handle,
                outbox: Mutex::new(VecDeque::new()),
            }),
        );
        drop(users);

        info!(user = %user, "User registered");
        Ok(())
    }

    /// Stop tracking a user and return their final state.
    pub async fn unregister_user(&self, user: UserId) -> GuardResult<UserRiskState> {
        let entry = self
            .users
            .write()
            .await
            .remove(&user)
            .ok_or(GuardError::UnknownUser(user))?;

        let state = entry.handle.stop().await?;
        info!(user = %user, "User unregistered");
        Ok(state)
    }

    pub async fn is_registered(&self, user: UserId) -> bool {
        self.users.read().await.contains_key(&user)
    }

    /// Registered users in id order.
    pub async fn users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users.read().await.keys().copied().collect();
        users.sort();
        users
    }

    async fn entry(&self, user: UserId) -> GuardResult<Arc<UserEntry>> {
        self.users
            .read()
            .await
            .get(&user)
            .cloned()
            .ok_or(GuardError::UnknownUser(user))
    }

    /// Run one evaluation cycle for a user.
    ///
    /// A failed fetch skips the cycle without touching state. A failed
    /// save is reported after the findings have been delivered.
    pub async fn evaluate_once(&self, user: UserId) -> GuardResult<CycleOutcome> {
        let entry = self.entry(user).await?;
        let mut outbox = entry.outbox.lock().await;

        let exchange = &self.exchange;
        let snapshots = retry(&self.settings.retry, "fetch_open_positions", || {
            exchange.fetch_open_positions(user)
        })
        .await
        .map_err(exchange_failure)?;

        let previous = entry.handle.state().open_positions;
        let closed = self.collect_closed(user, &previous, &snapshots).await?;
        let now = self.clock.now();

        let positions = snapshots.len();
        let applied = entry
            .handle
            .cycle(CycleInput {
                now,
                snapshots,
                closed,
            })
            .await?;
        let report = applied.value;

        for finding in &report.emitted {
            outbox.push_back(PendingDelivery {
                finding: finding.clone(),
                attempts: 0,
            });
        }
        let (delivered, dropped) = self.flush_outbox(user, &mut outbox).await;

        let outcome = CycleOutcome {
            positions,
            findings: report.emitted,
            suppressed: report.suppressed,
            delivered,
            queued: outbox.len(),
            dropped,
        };
        debug!(
            user = %user,
            positions,
            findings = outcome.findings.len(),
            suppressed = outcome.suppressed,
            queued = outcome.queued,
            "Cycle complete"
        );

        applied.saved?;
        Ok(outcome)
    }

    /// Fetch realized outcomes for positions that disappeared or were
    /// reopened since the previous cycle.
    async fn collect_closed(
        &self,
        user: UserId,
        previous: &BTreeMap<String, DateTime<Utc>>,
        current: &[PositionSnapshot],
    ) -> GuardResult<Vec<TradeOutcome>> {
        let current: HashMap<&str, DateTime<Utc>> = current
            .iter()
            .map(|s| (s.symbol.as_str(), s.opened_at))
            .collect();

        let mut closed = Vec::new();
        for (symbol, opened_at) in previous {
            if current.get(symbol.as_str()) == Some(opened_at) {
                continue;
            }

            let exchange = &self.exchange;
            let fetched = retry(&self.settings.retry, "fetch_closed_trade", || {
                exchange.fetch_closed_trade(user, symbol)
            })
            .await;
            match fetched {
                Ok(Some(outcome)) => closed.push(outcome),
                Ok(None) => debug!(user = %user, symbol = %symbol, "Closed position has no realized trade yet"),
                Err(e) if matches!(e.last, ExchangeError::AuthFailure(_)) => {
                    return Err(exchange_failure(e))
                }
                Err(e) => {
                    warn!(user = %user, symbol = %symbol, error = %e.last, "Could not fetch closed trade");
                }
            }
        }
        Ok(closed)
    }

    /// Try every outbox entry once, oldest first. Returns (delivered, dropped).
    async fn flush_outbox(&self, user: UserId, outbox: &mut VecDeque<PendingDelivery>) -> (usize, usize) {
        let mut delivered = 0;
        let mut dropped = 0;
        let mut retained = VecDeque::with_capacity(outbox.len());

        while let Some(mut pending) = outbox.pop_front() {
            pending.attempts += 1;
            match self.deliver(user, &pending.finding).await {
                Ok(()) => delivered += 1,
                Err(e) if e.is_transient() && pending.attempts < self.settings.max_delivery_attempts => {
                    warn!(
                        user = %user,
                        finding = %pending.finding.id,
                        attempts = pending.attempts,
                        error = %e,
                        "Delivery failed, keeping in outbox"
                    );
                    retained.push_back(pending);
                }
                Err(e) => {
                    error!(
                        user = %user,
                        finding = %pending.finding.id,
                        rule = %pending.finding.rule,
                        attempts = pending.attempts,
                        error = %e,
                        "Dropping undeliverable finding"
                    );
                    dropped += 1;
                }
            }
        }

        *outbox = retained;
        (delivered, dropped)
    }

    async fn deliver(&self, user: UserId, finding: &RiskFinding) -> Result<(), NotifyError> {
        let ack = with_timeout(self.settings.retry.timeout, self.notifier.deliver(user, finding)).await?;
        debug!(user = %user, finding = %finding.id, message_id = ?ack.message_id, "Finding delivered");
        Ok(())
    }

    /// Consistent copy of a user's state.
    pub async fn get_state(&self, user: UserId) -> GuardResult<UserRiskState> {
        Ok(self.entry(user).await?.handle.state())
    }

    /// Watch a user's state as it changes.
    pub async fn subscribe(&self, user: UserId) -> GuardResult<watch::Receiver<UserRiskState>> {
        Ok(self.entry(user).await?.handle.subscribe())
    }

    pub async fn get_score(&self, user: UserId) -> GuardResult<DisciplineScore> {
        Ok(self.get_state(user).await?.score())
    }

    /// Deliver a sample finding without recording it.
    pub async fn trigger_test_finding(&self, user: UserId) -> GuardResult<RiskFinding> {
        self.entry(user).await?;
        let now = self.clock.now();

        let snapshot = PositionSnapshot::new("BTCUSDT", dec!(0.1), dec!(50000), dec!(50155), dec!(10), now)
            .with_account_equity(dec!(1000));

        let finding = RiskFinding::new(
            RuleKind::HighRisk,
            user,
            "BTCUSDT",
            dec!(3.5),
            self.rules.config().max_risk_pct,
            "This is a test alert",
            now,
        )
        .with_severity(Severity::Warning)
        .with_suggestion("No action needed - this is just a test")
        .with_context(&snapshot)
        .as_test();

        self.deliver(user, &finding).await?;
        info!(user = %user, finding = %finding.id, "Test finding delivered");
        Ok(finding)
    }

    /// Route an inbound user action to the user's actor.
    pub async fn apply_action(&self, user: UserId, action: UserAction) -> GuardResult<ActionEffect> {
        let entry = self.entry(user).await?;
        let applied = entry.handle.action(action, self.clock.now()).await?;
        if let Err(e) = applied.saved {
            warn!(user = %user, error = %e, "Action applied but not yet persisted");
        }
        Ok(applied.value)
    }

    /// Record a realized trade outside the polling cycle.
    pub async fn record_trade_outcome(&self, user: UserId, outcome: TradeOutcome) -> GuardResult<()> {
        let entry = self.entry(user).await?;
        let applied = entry.handle.record_outcome(outcome, self.clock.now()).await?;
        if let Err(e) = applied.saved {
            warn!(user = %user, error = %e, "Trade outcome recorded but not yet persisted");
        }
        Ok(())
    }

    /// Close the day for every registered user.
    ///
    /// Each user's summary is computed, reset, saved and archived inside
    /// their actor, then delivered. Users are processed concurrently.
    pub async fn run_recap(&self) -> Vec<(UserId, GuardResult<RecapSummary>)> {
        let entries: Vec<(UserId, Arc<UserEntry>)> = self
            .users
            .read()
            .await
            .iter()
            .map(|(user, entry)| (*user, Arc::clone(entry)))
            .collect();
        let now = self.clock.now();

        let results = join_all(entries.into_iter().map(|(user, entry)| async move {
            (user, self.recap_user(user, &entry, now).await)
        }))
        .await;

        info!(users = results.len(), "Daily recap complete");
        results
    }

    async fn recap_user(&self, user: UserId, entry: &UserEntry, now: DateTime<Utc>) -> GuardResult<RecapSummary> {
        let applied = entry.handle.recap(now).await?;
        let summary = applied.summary;
        info!(
            user = %user,
            score = summary.score.value,
            tier = %summary.score.tier,
            violations = summary.violation_count,
            "Recap generated"
        );

        let notifier = &self.notifier;
        if let Err(e) = retry(&self.settings.retry, "deliver_recap", || notifier.deliver_recap(user, &summary)).await {
            error!(user = %user, attempts = e.attempts, error = %e.last, "Failed to deliver recap");
        }

        applied.saved?;
        Ok(summary)
    }

    /// Stop every actor.
    pub async fn shutdown(&self) {
        let entries: Vec<(UserId, Arc<UserEntry>)> = self.users.write().await.drain().collect();
        for (user, entry) in entries {
            if let Err(e) = entry.handle.stop().await {
                warn!(user = %user, error = %e, "Actor already stopped");
            }
        }
        info!("Engine stopped");
    }
}

fn exchange_failure(e: Exhausted<ExchangeError>) -> GuardError {
    if e.attempts > 1 {
        GuardError::RetriesExhausted {
            attempts: e.attempts,
            last: e.last,
        }
    } else {
        GuardError::Exchange(e.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{t0, Harness, USER};
    use guard_core::types::{ActionKind, FindingId};
    use guard_store::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_high_risk_alert_lifecycle() {
        let h = Harness::new().await;
        h.open_high_risk();

        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!(outcome.positions, 1);
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.delivered, 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.rule, RuleKind::HighRisk);
        assert_eq!(finding.metric, dec!(2.5));
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.suggestion.as_deref(), Some("Reduce size by ~20%"));
        assert_eq!(h.sink.delivered().len(), 1);

        // Same position five minutes later stays quiet
        h.advance_minutes(5);
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.suppressed, 1);

        let effect = h
            .engine
            .apply_action(USER, UserAction::Acknowledge { finding: finding.id })
            .await
            .unwrap();
        assert_eq!(effect, ActionEffect::Acknowledged(finding.id));
        let state = h.engine.get_state(USER).await.unwrap();
        assert!(state.pending_ack.is_empty());
        assert_eq!(state.score().value, 95);

        // The rule cooldown is 30 minutes from the first alert
        h.advance_minutes(25);
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(h.sink.delivered().len(), 2);
        assert_eq!(h.store.saved(USER).unwrap().violation_count, 2);
    }

    /// Two losing ETH trades closing at `t0 + 2` and `t0 + 7`.
    async fn two_losses(h: &Harness) {
        h.open_quiet(dec!(3000));
        h.engine.evaluate_once(USER).await.unwrap();

        h.advance_minutes(2);
        h.exchange.close_position(USER, "ETHUSDT", dec!(2950)).unwrap();
        h.engine.evaluate_once(USER).await.unwrap();

        h.advance_minutes(1);
        h.open_quiet(dec!(2950));
        h.engine.evaluate_once(USER).await.unwrap();

        h.advance_minutes(4);
        h.exchange.close_position(USER, "ETHUSDT", dec!(2900)).unwrap();
        h.engine.evaluate_once(USER).await.unwrap();

        let state = h.engine.get_state(USER).await.unwrap();
        assert_eq!(state.trade_outcomes.len(), 2);
        assert!(state.open_positions.is_empty());
    }

    #[tokio::test]
    async fn test_revenge_trade_after_quick_losses() {
        let h = Harness::new().await;
        two_losses(&h).await;

        h.advance_minutes(1);
        h.open_quiet(dec!(2900));
        let outcome = h.engine.evaluate_once(USER).await.unwrap();

        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].rule, RuleKind::RevengePattern);
        assert_eq!(outcome.findings[0].metric, dec!(2));
    }

    #[tokio::test]
    async fn test_no_revenge_once_losses_age_out() {
        let h = Harness::new().await;
        two_losses(&h).await;

        h.advance_minutes(15);
        h.open_quiet(dec!(2900));
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert!(outcome.findings.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_counts_as_close() {
        let h = Harness::new().await;
        h.open_quiet(dec!(3000));
        h.engine.evaluate_once(USER).await.unwrap();

        // Closed and reopened between two polls
        h.advance_minutes(1);
        h.exchange.close_position(USER, "ETHUSDT", dec!(2990)).unwrap();
        h.open_quiet(dec!(2990));
        h.engine.evaluate_once(USER).await.unwrap();

        let state = h.engine.get_state(USER).await.unwrap();
        assert_eq!(state.trade_outcomes.len(), 1);
        assert_eq!(state.open_positions.get("ETHUSDT"), Some(&h.clock.now()));
    }

    #[tokio::test]
    async fn test_recap_resets_and_archives() {
        let h = Harness::new().await;
        h.open_high_risk();
        h.engine.evaluate_once(USER).await.unwrap();
        h.engine
            .apply_action(USER, UserAction::ReduceSize { symbol: "BTCUSDT".into() })
            .await
            .unwrap();

        let results = h.engine.run_recap().await;
        assert_eq!(results.len(), 1);
        let summary = results[0].1.as_ref().unwrap();
        assert_eq!(summary.violation_count, 1);
        assert_eq!(summary.positive_action_count, 1);
        assert_eq!(summary.score.value, 97);
        assert_eq!(summary.top_violations, vec![(RuleKind::HighRisk, 1)]);
        assert_eq!(summary.focus, RuleKind::HighRisk.focus_hint());
        assert_eq!(summary.unacknowledged, 1);

        let state = h.engine.get_state(USER).await.unwrap();
        assert_eq!(state.violation_count, 0);
        assert_eq!(state.positive_action_count, 0);
        assert_eq!(state.score().value, 100);

        assert_eq!(h.store.recaps(USER).len(), 1);
        assert_eq!(h.sink.recaps().len(), 1);
        assert_eq!(h.store.saved(USER).unwrap().violation_count, 0);
    }

    #[tokio::test]
    async fn test_outbox_retries_transient_failures() {
        let h = Harness::new().await;
        h.sink.fail_next(NotifyError::Unreachable("offline".into()), 2);
        h.open_high_risk();

        let first = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!((first.delivered, first.queued), (0, 1));
        // Recorded even though not yet delivered
        assert_eq!(h.engine.get_state(USER).await.unwrap().violation_count, 1);

        h.advance_minutes(1);
        let second = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!((second.delivered, second.queued), (0, 1));

        h.advance_minutes(1);
        let third = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!((third.delivered, third.queued, third.dropped), (1, 0, 0));
        assert_eq!(h.sink.delivered()[0].id, first.findings[0].id);
    }

    #[tokio::test]
    async fn test_outbox_drops_after_max_attempts() {
        let h = Harness::new().await;
        h.sink.fail_next(NotifyError::Timeout, 3);
        h.open_high_risk();

        for _ in 0..2 {
            let outcome = h.engine.evaluate_once(USER).await.unwrap();
            assert_eq!(outcome.queued, 1);
            h.advance_minutes(1);
        }
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!((outcome.queued, outcome.dropped), (0, 1));
        assert!(h.sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_dropped_at_once() {
        let h = Harness::new().await;
        h.sink.fail_next(NotifyError::Rejected("blocked by user".into()), 1);
        h.open_high_risk();

        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!((outcome.queued, outcome.dropped), (0, 1));
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_after_delivery() {
        let h = Harness::new().await;
        h.store.fail_next_saves(3);
        h.open_high_risk();

        let err = h.engine.evaluate_once(USER).await.unwrap_err();
        assert!(matches!(err, GuardError::Store(_)));
        assert_eq!(h.sink.delivered().len(), 1);
        assert_eq!(h.engine.get_state(USER).await.unwrap().violation_count, 1);
        assert!(h.store.saved(USER).is_none());

        // The next cycle persists the pending change
        h.advance_minutes(1);
        h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!(h.store.saved(USER).unwrap().violation_count, 1);
    }

    #[tokio::test]
    async fn test_fetch_failures() {
        let h = Harness::new().await;
        h.open_high_risk();

        for _ in 0..3 {
            h.exchange.inject_failure(USER, ExchangeError::Timeout);
        }
        let err = h.engine.evaluate_once(USER).await.unwrap_err();
        assert!(matches!(err, GuardError::RetriesExhausted { attempts: 3, .. }));

        h.exchange.inject_failure(USER, ExchangeError::AuthFailure("key revoked".into()));
        let err = h.engine.evaluate_once(USER).await.unwrap_err();
        assert!(err.is_auth());

        // Skipped cycles leave the state untouched
        let state = h.engine.get_state(USER).await.unwrap();
        assert_eq!(state.violation_count, 0);
        assert!(state.open_positions.is_empty());

        // A single timeout is absorbed by the retry
        h.exchange.inject_failure(USER, ExchangeError::Timeout);
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!(outcome.findings.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_errors() {
        let h = Harness::new().await;
        let stranger = UserId(99);

        assert!(matches!(
            h.engine.evaluate_once(stranger).await,
            Err(GuardError::UnknownUser(_))
        ));
        assert!(matches!(
            h.engine.register_user(USER).await,
            Err(GuardError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            h.engine
                .apply_action(USER, UserAction::Acknowledge { finding: FindingId::new() })
                .await,
            Err(GuardError::FindingNotFound(_))
        ));

        assert_eq!(h.engine.users().await, vec![USER]);
        let last = h.engine.unregister_user(USER).await.unwrap();
        assert_eq!(last.user, USER);
        assert!(!h.engine.is_registered(USER).await);
    }

    #[tokio::test]
    async fn test_saved_state_is_restored() {
        let mut saved = UserRiskState::new(USER, t0());
        saved.violation_count = 4;
        saved.record_action(ActionKind::CommitStopLoss);

        let h = Harness::with_store(MemoryStore::new().with_state(saved)).await;
        let score = h.engine.get_score(USER).await.unwrap();
        assert_eq!(score.value, 82);
    }

    #[tokio::test]
    async fn test_test_finding_is_not_recorded() {
        let h = Harness::new().await;

        let finding = h.engine.trigger_test_finding(USER).await.unwrap();
        assert!(finding.test);
        assert_eq!(finding.symbol, "BTCUSDT");
        assert_eq!(finding.metric, dec!(3.5));
        assert_eq!(finding.reason, "This is a test alert");
        assert_eq!(h.sink.delivered().len(), 1);

        let state = h.engine.get_state(USER).await.unwrap();
        assert_eq!(state.violation_count, 0);
        assert!(state.pending_ack.is_empty());
    }

    #[tokio::test]
    async fn test_set_cooldown_silences_symbol() {
        let h = Harness::new().await;
        let effect = h
            .engine
            .apply_action(
                USER,
                UserAction::SetCooldown {
                    symbol: "BTCUSDT".into(),
                    minutes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            effect,
            ActionEffect::CooldownSet {
                symbol: "BTCUSDT".into(),
                until: t0() + chrono::Duration::minutes(30),
            }
        );

        h.open_high_risk();
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.suppressed, 1);
        assert_eq!(h.engine.get_score(USER).await.unwrap().value, 100);
    }

    #[tokio::test]
    async fn test_recorded_outcomes_feed_revenge() {
        let h = Harness::new().await;
        let mut updates = h.engine.subscribe(USER).await.unwrap();

        for minutes_ago in [6, 2] {
            let outcome = TradeOutcome::new(
                "ETHUSDT",
                dec!(-20),
                h.clock.now() - chrono::Duration::minutes(minutes_ago),
            );
            h.engine.record_trade_outcome(USER, outcome).await.unwrap();
        }
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().trade_outcomes.len(), 2);

        h.open_quiet(dec!(3000));
        let outcome = h.engine.evaluate_once(USER).await.unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].rule, RuleKind::RevengePattern);
    }

    /// Store whose load for one user takes eight seconds.
    struct SlowLoad {
        inner: MemoryStore,
        slow_user: UserId,
        entered: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl StateStore for SlowLoad {
        async fn load_state(
            &self,
            user: UserId,
        ) -> Result<Option<UserRiskState>, guard_core::error::StoreError> {
            if user == self.slow_user {
                self.entered.notify_one();
                tokio::time::sleep(std::time::Duration::from_secs(8)).await;
            }
            self.inner.load_state(user).await
        }

        async fn save_state(
            &self,
            user: UserId,
            state: &UserRiskState,
        ) -> Result<(), guard_core::error::StoreError> {
            self.inner.save_state(user, state).await
        }

        async fn archive_recap(
            &self,
            user: UserId,
            summary: &RecapSummary,
        ) -> Result<(), guard_core::error::StoreError> {
            self.inner.archive_recap(user, summary).await
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_registration_does_not_block_other_users() {
        let clock = Arc::new(guard_core::traits::ManualClock::new(t0()));
        let exchange = Arc::new(guard_exchange::PaperExchange::new(clock.clone()));
        let store = Arc::new(SlowLoad {
            inner: MemoryStore::new(),
            slow_user: UserId(2),
            entered: tokio::sync::Notify::new(),
        });
        let engine = Arc::new(RiskEngine::new(
            RuleSet::default(),
            exchange.clone(),
            Arc::new(crate::testing::RecordingSink::default()),
            store.clone(),
            clock,
        ));
        exchange.set_equity(USER, dec!(10000));
        engine.register_user(USER).await.unwrap();

        let registering = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.register_user(UserId(2)).await }
        });
        store.entered.notified().await;

        let started = tokio::time::Instant::now();
        engine.evaluate_once(USER).await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(!engine.is_registered(UserId(2)).await);

        registering.await.unwrap().unwrap();
        assert!(engine.is_registered(UserId(2)).await);
        assert!(started.elapsed() >= std::time::Duration::from_secs(7));
    }
}
