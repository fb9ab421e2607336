//! Test harness: paper exchange, memory store and a recording sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::error::NotifyError;
use guard_core::traits::{DeliveryAck, ManualClock, NotificationSink};
use guard_core::types::{RecapSummary, RiskFinding, UserId};
use guard_exchange::PaperExchange;
use guard_store::MemoryStore;
use guard_rules::RuleSet;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{EngineSettings, RiskEngine};
use crate::retry::RetryPolicy;

pub const USER: UserId = UserId(1);

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Sink that records deliveries and fails on demand.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<RiskFinding>>,
    recaps: Mutex<Vec<RecapSummary>>,
    failures: Mutex<VecDeque<NotifyError>>,
}

impl RecordingSink {
    pub fn fail_next(&self, error: NotifyError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    pub fn delivered(&self) -> Vec<RiskFinding> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn recaps(&self) -> Vec<RecapSummary> {
        self.recaps.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, _user: UserId, finding: &RiskFinding) -> Result<DeliveryAck, NotifyError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.delivered.lock().unwrap().push(finding.clone());
        Ok(DeliveryAck { message_id: None })
    }

    async fn deliver_recap(&self, _user: UserId, summary: &RecapSummary) -> Result<(), NotifyError> {
        self.recaps.lock().unwrap().push(summary.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub exchange: Arc<PaperExchange>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<RiskEngine>,
}

impl Harness {
    /// Engine with fast retries and `USER` registered with 10000 equity.
    pub async fn new() -> Self {
        Self::with_store(MemoryStore::new()).await
    }

    pub async fn with_store(store: MemoryStore) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let exchange = Arc::new(PaperExchange::new(clock.clone()));
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(store);

        let settings = EngineSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                timeout: Duration::from_secs(1),
            },
            max_delivery_attempts: 3,
        };
        let engine = RiskEngine::new(
            RuleSet::default(),
            exchange.clone(),
            sink.clone(),
            store.clone(),
            clock.clone(),
        )
        .with_settings(settings);
        let engine = Arc::new(engine);

        exchange.set_equity(USER, dec!(10000));
        engine.register_user(USER).await.unwrap();

        Self {
            clock,
            exchange,
            sink,
            store,
            engine,
        }
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }

    /// 0.1 BTC at 50000, 10x, liquidation 47500, stop attached:
    /// 2.5% of 10000 equity at risk and nothing else wrong.
    pub fn open_high_risk(&self) {
        self.exchange
            .open_position(USER, "BTCUSDT", dec!(0.1), dec!(50000), dec!(10));
        self.exchange
            .set_liquidation_price(USER, "BTCUSDT", dec!(47500));
        self.exchange.attach_stop_loss(USER, "BTCUSDT", dec!(49000));
    }

    /// A small, protected ETH position that trips no rule.
    pub fn open_quiet(&self, entry: rust_decimal::Decimal) {
        self.exchange
            .open_position(USER, "ETHUSDT", dec!(0.1), entry, dec!(5));
        self.exchange.attach_stop_loss(USER, "ETHUSDT", entry - dec!(100));
    }
}
