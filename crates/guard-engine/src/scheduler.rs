//! Periodic jobs: one polling task per user and the daily recap.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use guard_core::types::UserId;
use guard_core::{GuardError, GuardResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::RiskEngine;

/// Timing for the scheduled jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    /// UTC hour (0-23) at which the recap runs
    pub recap_hour: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            recap_hour: 20,
        }
    }
}

/// The next `hour:00` UTC strictly after `now`.
pub fn next_recap_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);

    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

struct UserTask {
    stop: watch::Sender<bool>,
    resume: Arc<Notify>,
    paused: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs the engine on a timer.
pub struct Scheduler {
    engine: Arc<RiskEngine>,
    settings: SchedulerSettings,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<HashMap<UserId, UserTask>>,
    recap: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(engine: Arc<RiskEngine>, settings: SchedulerSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            settings,
            shutdown,
            tasks: Mutex::new(HashMap::new()),
            recap: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<RiskEngine> {
        &self.engine
    }

    /// Start polling a registered user.
    pub async fn start_user(&self, user: UserId) -> GuardResult<()> {
        if !self.engine.is_registered(user).await {
            return Err(GuardError::UnknownUser(user));
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get(&user) {
            if !task.handle.is_finished() {
                return Err(GuardError::AlreadyRegistered(user));
            }
        }

        let (stop, stop_rx) = watch::channel(false);
        let resume = Arc::new(Notify::new());
        let paused = Arc::new(AtomicBool::new(false));

        let poller = Poller {
            engine: Arc::clone(&self.engine),
            user,
            period: self.settings.poll_interval,
            stop: stop_rx,
            shutdown: self.shutdown.subscribe(),
            resume: Arc::clone(&resume),
            paused: Arc::clone(&paused),
        };
        let handle = tokio::spawn(poller.run());

        tasks.insert(
            user,
            UserTask {
                stop,
                resume,
                paused,
                handle,
            },
        );
        info!(user = %user, interval_secs = self.settings.poll_interval.as_secs(), "Polling started");
        Ok(())
    }

    /// Stop polling a user. Returns false if no task was running.
    pub async fn stop_user(&self, user: UserId) -> bool {
        let Some(task) = self.tasks.lock().await.remove(&user) else {
            return false;
        };

        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(user = %user, error = %e, "Polling task ended abnormally");
        }
        info!(user = %user, "Polling stopped");
        true
    }

    /// Resume a user paused by an authentication failure.
    /// Returns false if the user was not paused.
    pub async fn resume_user(&self, user: UserId) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(&user) {
            Some(task) if task.paused.load(Ordering::SeqCst) => {
                task.resume.notify_one();
                info!(user = %user, "Polling resumed");
                true
            }
            _ => false,
        }
    }

    pub async fn is_paused(&self, user: UserId) -> bool {
        self.tasks
            .lock()
            .await
            .get(&user)
            .is_some_and(|task| task.paused.load(Ordering::SeqCst))
    }

    /// Start the daily recap task. Calling it again has no effect.
    pub async fn spawn_recap(&self) {
        let mut recap = self.recap.lock().await;
        if recap.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let hour = self.settings.recap_hour;
        let mut shutdown = self.shutdown.subscribe();

        *recap = Some(tokio::spawn(async move {
            loop {
                let now = engine.clock().now();
                let next = next_recap_at(now, hour);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                info!(next = %next, "Next recap scheduled");

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(wait) => {
                        for (user, result) in engine.run_recap().await {
                            if let Err(e) = result {
                                error!(user = %user, error = %e, "Recap failed");
                            }
                        }
                    }
                }
            }
            debug!("Recap task stopped");
        }));
    }

    /// Stop every task, then the engine's actors.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let tasks: Vec<(UserId, UserTask)> = self.tasks.lock().await.drain().collect();
        for (user, task) in tasks {
            if let Err(e) = task.handle.await {
                warn!(user = %user, error = %e, "Polling task ended abnormally");
            }
        }
        if let Some(handle) = self.recap.lock().await.take() {
            let _ = handle.await;
        }

        self.engine.shutdown().await;
        info!("Scheduler stopped");
    }
}

/// One user's polling loop.
struct Poller {
    engine: Arc<RiskEngine>,
    user: UserId,
    period: Duration,
    stop: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    resume: Arc<Notify>,
    paused: Arc<AtomicBool>,
}

impl Poller {
    async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {
                    match self.engine.evaluate_once(self.user).await {
                        Ok(outcome) => {
                            debug!(user = %self.user, findings = outcome.findings.len(), "Poll complete");
                        }
                        Err(e) if e.is_auth() => {
                            error!(user = %self.user, error = %e, "Authentication failed, pausing until resumed");
                            if !self.wait_for_resume().await {
                                break;
                            }
                            ticker.reset_immediately();
                        }
                        Err(GuardError::UnknownUser(_)) => {
                            warn!(user = %self.user, "User no longer registered");
                            break;
                        }
                        Err(e) => {
                            warn!(user = %self.user, error = %e, "Cycle failed");
                        }
                    }
                }
            }
        }

        debug!(user = %self.user, "Polling task exiting");
    }

    /// Park until resumed. Returns false if stopped while paused.
    async fn wait_for_resume(&mut self) -> bool {
        self.paused.store(true, Ordering::SeqCst);
        let resumed = tokio::select! {
            _ = self.resume.notified() => true,
            _ = self.stop.changed() => false,
            _ = self.shutdown.changed() => false,
        };
        self.paused.store(false, Ordering::SeqCst);
        resumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, USER};
    use guard_core::error::ExchangeError;
    use chrono::Timelike;
    use guard_core::traits::Clock;
    use rust_decimal_macros::dec;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_secs(15),
            recap_hour: 20,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_recap_later_today() {
        assert_eq!(next_recap_at(at("2024-03-01T08:30:00Z"), 20), at("2024-03-01T20:00:00Z"));
    }

    #[test]
    fn test_next_recap_tomorrow() {
        assert_eq!(next_recap_at(at("2024-03-01T20:00:00Z"), 20), at("2024-03-02T20:00:00Z"));
        assert_eq!(next_recap_at(at("2024-03-01T21:15:00Z"), 20), at("2024-03-02T20:00:00Z"));
    }

    #[test]
    fn test_next_recap_month_rollover() {
        assert_eq!(next_recap_at(at("2024-02-29T23:59:59Z"), 0), at("2024-03-01T00:00:00Z"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval() {
        let h = Harness::new().await;
        let scheduler = Scheduler::new(Arc::clone(&h.engine), settings());
        h.open_high_risk();

        scheduler.start_user(USER).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.sink.delivered().len(), 1);

        // A new problem shows up on the next tick, not before
        h.exchange
            .open_position(USER, "ETHUSDT", dec!(-1), dec!(3000), dec!(50));
        h.exchange.attach_stop_loss(USER, "ETHUSDT", dec!(3020));
        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.sink.delivered().len(), 1);
        sleep(Duration::from_secs(11)).await;
        assert_eq!(h.sink.delivered().len(), 2);

        scheduler.shutdown().await;
        assert!(!h.engine.is_registered(USER).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_pauses_until_resumed() {
        let h = Harness::new().await;
        let scheduler = Scheduler::new(Arc::clone(&h.engine), settings());
        h.exchange
            .inject_failure(USER, ExchangeError::AuthFailure("key revoked".into()));
        h.open_high_risk();

        scheduler.start_user(USER).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_paused(USER).await);

        sleep(Duration::from_secs(60)).await;
        assert!(h.sink.delivered().is_empty());

        assert!(scheduler.resume_user(USER).await);
        sleep(Duration::from_millis(10)).await;
        assert!(!scheduler.is_paused(USER).await);
        assert_eq!(h.sink.delivered().len(), 1);
        assert!(!scheduler.resume_user(USER).await);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let h = Harness::new().await;
        let scheduler = Scheduler::new(Arc::clone(&h.engine), settings());

        assert!(matches!(
            scheduler.start_user(UserId(7)).await,
            Err(GuardError::UnknownUser(_))
        ));
        scheduler.start_user(USER).await.unwrap();
        assert!(matches!(
            scheduler.start_user(USER).await,
            Err(GuardError::AlreadyRegistered(_))
        ));

        assert!(scheduler.stop_user(USER).await);
        assert!(!scheduler.stop_user(USER).await);

        // Stopped users no longer see new positions
        h.open_high_risk();
        sleep(Duration::from_secs(60)).await;
        assert!(h.sink.delivered().is_empty());

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recap_runs_at_configured_hour() {
        let h = Harness::new().await;
        // 09:00 start; recap one minute from now
        let hour = h.clock.now().hour() + 1;
        h.clock.advance(ChronoDuration::minutes(59));
        let scheduler = Scheduler::new(
            Arc::clone(&h.engine),
            SchedulerSettings {
                poll_interval: Duration::from_secs(15),
                recap_hour: hour,
            },
        );

        scheduler.spawn_recap().await;
        scheduler.spawn_recap().await;
        sleep(Duration::from_secs(59)).await;
        assert!(h.sink.recaps().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.sink.recaps().len(), 1);
        assert_eq!(h.store.recaps(USER).len(), 1);

        scheduler.shutdown().await;
    }
}
