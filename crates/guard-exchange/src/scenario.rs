//! JSON scenarios replayed against the paper exchange.
//!
//! A scenario lists users with their starting equity and a timeline of
//! steps, each at a minute offset from the start:
//!
//! ```json
//! {
//!   "start": "2024-03-01T09:00:00Z",
//!   "duration_minutes": 30,
//!   "users": [{ "id": 1, "equity": 10000 }],
//!   "steps": [
//!     { "at_minute": 0, "user": 1,
//!       "event": { "type": "open", "symbol": "BTCUSDT", "size": 1,
//!                  "entry_price": 50000, "leverage": 10, "liquidation_price": 49750 } }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use guard_core::error::ExchangeError;
use guard_core::types::{UserAction, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::paper::PaperExchange;

/// Scenario loading and replay errors.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

fn default_poll_minutes() -> u32 {
    1
}

/// A replayable timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Wall-clock time of minute 0 when replayed on a manual clock
    pub start: DateTime<Utc>,
    /// Minutes between evaluation cycles
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u32,
    pub duration_minutes: u32,
    pub users: Vec<ScenarioUser>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioUser {
    pub id: UserId,
    pub equity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub at_minute: u32,
    pub user: UserId,
    pub event: ScenarioEvent,
}

/// Something that happens at a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    Open {
        symbol: String,
        size: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
        /// Estimated from leverage when absent
        #[serde(default)]
        liquidation_price: Option<Decimal>,
    },
    Mark {
        symbol: String,
        price: Decimal,
    },
    StopLoss {
        symbol: String,
        price: Decimal,
    },
    TakeProfit {
        symbol: String,
        price: Decimal,
    },
    Close {
        symbol: String,
        exit_price: Decimal,
    },
    /// The next fetch for the user fails
    Fail {
        error: FailureKind,
    },
    /// The user answers an alert
    Action {
        action: UserAction,
    },
    /// The user acknowledges their most recent pending finding
    AcknowledgeLatest,
    /// Run the daily recap for everyone
    Recap,
}

/// Exchange failures a scenario can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Auth,
    RateLimited,
    Api,
}

impl From<FailureKind> for ExchangeError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Timeout => ExchangeError::Timeout,
            FailureKind::Auth => ExchangeError::AuthFailure("credentials rejected".to_string()),
            FailureKind::RateLimited => ExchangeError::RateLimited { retry_after_secs: 1 },
            FailureKind::Api => ExchangeError::Api("internal error".to_string()),
        }
    }
}

/// What the caller still has to do after a step was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEffect {
    /// Fully handled by the exchange
    Exchange,
    Action(UserAction),
    AcknowledgeLatest,
    Recap,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let mut scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        // Stable: steps at the same minute keep file order
        scenario.steps.sort_by_key(|s| s.at_minute);
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if self.poll_minutes == 0 {
            return Err(ScenarioError::Invalid("poll_minutes must be at least 1".to_string()));
        }
        if self.users.is_empty() {
            return Err(ScenarioError::Invalid("no users".to_string()));
        }
        for step in &self.steps {
            if !self.users.iter().any(|u| u.id == step.user) {
                return Err(ScenarioError::Invalid(format!(
                    "step at minute {} references unknown user {}",
                    step.at_minute, step.user
                )));
            }
            if step.at_minute > self.duration_minutes {
                return Err(ScenarioError::Invalid(format!(
                    "step at minute {} is past the end ({})",
                    step.at_minute, self.duration_minutes
                )));
            }
        }
        Ok(())
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|u| u.id).collect()
    }

    /// Fund every user's paper account.
    pub fn setup(&self, exchange: &PaperExchange) {
        for user in &self.users {
            exchange.set_equity(user.id, user.equity);
        }
    }

    /// Minute offsets at which evaluation cycles run.
    pub fn ticks(&self) -> impl Iterator<Item = u32> {
        (0..=self.duration_minutes).step_by(self.poll_minutes.max(1) as usize)
    }

    /// Steps scheduled in `(after, up_to]`, or `[0, up_to]` when `after` is `None`.
    pub fn steps_between(&self, after: Option<u32>, up_to: u32) -> impl Iterator<Item = &ScenarioStep> {
        self.steps
            .iter()
            .filter(move |s| s.at_minute <= up_to && after.map_or(true, |a| s.at_minute > a))
    }

    /// Apply one step to the exchange.
    pub fn apply(step: &ScenarioStep, exchange: &PaperExchange) -> Result<StepEffect, ScenarioError> {
        let user = step.user;
        let missing = |symbol: &str| {
            ScenarioError::Invalid(format!(
                "minute {}: user {} has no open {} position",
                step.at_minute, user, symbol
            ))
        };

        match &step.event {
            ScenarioEvent::Open {
                symbol,
                size,
                entry_price,
                leverage,
                liquidation_price,
            } => {
                exchange.open_position(user, symbol, *size, *entry_price, *leverage);
                if let Some(price) = liquidation_price {
                    exchange.set_liquidation_price(user, symbol, *price);
                }
            }
            ScenarioEvent::Mark { symbol, price } => {
                if !exchange.update_mark(user, symbol, *price) {
                    return Err(missing(symbol));
                }
            }
            ScenarioEvent::StopLoss { symbol, price } => {
                if !exchange.attach_stop_loss(user, symbol, *price) {
                    return Err(missing(symbol));
                }
            }
            ScenarioEvent::TakeProfit { symbol, price } => {
                if !exchange.attach_take_profit(user, symbol, *price) {
                    return Err(missing(symbol));
                }
            }
            ScenarioEvent::Close { symbol, exit_price } => {
                if exchange.close_position(user, symbol, *exit_price).is_none() {
                    return Err(missing(symbol));
                }
            }
            ScenarioEvent::Fail { error } => exchange.inject_failure(user, (*error).into()),
            ScenarioEvent::Action { action } => return Ok(StepEffect::Action(action.clone())),
            ScenarioEvent::AcknowledgeLatest => return Ok(StepEffect::AcknowledgeLatest),
            ScenarioEvent::Recap => return Ok(StepEffect::Recap),
        }
        Ok(StepEffect::Exchange)
    }
}
