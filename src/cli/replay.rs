//! Scenario replay on a manual clock, shared by `run` and `evaluate`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use guard_config::AppConfig;
use guard_core::traits::{Clock, ManualClock, StateStore};
use guard_core::types::{UserAction, UserId};
use guard_engine::RiskEngine;
use guard_exchange::{PaperExchange, Scenario, StepEffect};
use guard_monitor::LogNotifier;
use guard_rules::RuleSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Replay {
    pub scenario: Scenario,
    pub clock: Arc<ManualClock>,
    pub exchange: Arc<PaperExchange>,
    pub engine: Arc<RiskEngine>,
}

impl Replay {
    /// Fund the paper accounts and register every scenario user.
    pub async fn new(
        scenario: Scenario,
        config: &AppConfig,
        store: Arc<dyn StateStore>,
        echo: bool,
    ) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(scenario.start));
        let exchange = Arc::new(PaperExchange::new(clock.clone()));
        scenario.setup(&exchange);

        let engine = RiskEngine::new(
            RuleSet::new(config.rules.clone()),
            exchange.clone(),
            Arc::new(LogNotifier::new().with_echo(echo)),
            store,
            clock.clone(),
        )
        .with_settings(config.scheduler.engine_settings());
        let engine = Arc::new(engine);

        for user in scenario.user_ids() {
            engine
                .register_user(user)
                .await
                .with_context(|| format!("Failed to register user {}", user))?;
        }
        info!(users = scenario.users.len(), start = %scenario.start, "Scenario loaded");

        Ok(Self {
            scenario,
            clock,
            exchange,
            engine,
        })
    }

    /// Wall-clock time of a scenario minute.
    pub fn at(&self, minute: u32) -> DateTime<Utc> {
        self.scenario.start + Duration::minutes(i64::from(minute))
    }

    /// Move the clock to `minute`.
    pub fn advance_to(&self, minute: u32) {
        self.clock.set(self.at(minute));
    }

    /// Apply the steps in `(after, up_to]`, each at its own minute.
    pub async fn apply_steps(&self, after: Option<u32>, up_to: u32) -> Result<()> {
        for step in self.scenario.steps_between(after, up_to) {
            self.advance_to(step.at_minute);
            let effect = Scenario::apply(step, &self.exchange)?;
            self.handle(step.user, effect).await;
        }
        Ok(())
    }

    async fn handle(&self, user: UserId, effect: StepEffect) {
        let result = match effect {
            StepEffect::Exchange => return,
            StepEffect::Action(action) => self
                .engine
                .apply_action(user, action)
                .await
                .map(|effect| debug!(user = %user, effect = ?effect, "Action applied")),
            StepEffect::AcknowledgeLatest => self.acknowledge_latest(user).await,
            StepEffect::Recap => {
                self.recap().await;
                return;
            }
        };

        if let Err(e) = result {
            warn!(user = %user, error = %e, "Scenario action rejected");
        }
    }

    async fn acknowledge_latest(&self, user: UserId) -> guard_core::GuardResult<()> {
        let state = self.engine.get_state(user).await?;
        let latest = state
            .recent_findings
            .iter()
            .rev()
            .find(|f| state.pending_ack.contains(&f.id))
            .map(|f| f.id);

        match latest {
            Some(finding) => {
                self.engine
                    .apply_action(user, UserAction::Acknowledge { finding })
                    .await?;
            }
            None => debug!(user = %user, "Nothing to acknowledge"),
        }
        Ok(())
    }

    /// Close the day for every user at the current clock time.
    pub async fn recap(&self) {
        info!(at = %self.clock.now(), "Running recap");
        for (user, result) in self.engine.run_recap().await {
            if let Err(e) = result {
                warn!(user = %user, error = %e, "Recap failed");
            }
        }
    }
}
