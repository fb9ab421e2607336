//! Rule dispatch.

use chrono::{DateTime, Utc};
use guard_core::types::{PositionSnapshot, RiskFinding, RuleKind, TradeOutcome, UserId};
use tracing::trace;

use crate::config::RuleConfig;
use crate::{high_risk, liquidation, no_stop_loss, revenge};

/// Inputs a rule sees besides the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub user: UserId,
    pub now: DateTime<Utc>,
    pub config: &'a RuleConfig,
    /// Realized outcomes inside the outcome horizon, oldest first
    pub outcomes: &'a [TradeOutcome],
}

impl<'a> RuleContext<'a> {
    pub fn new(
        user: UserId,
        now: DateTime<Utc>,
        config: &'a RuleConfig,
        outcomes: &'a [TradeOutcome],
    ) -> Self {
        Self {
            user,
            now,
            config,
            outcomes,
        }
    }
}

/// A rule: pure function of a snapshot and its context.
pub type RuleFn = fn(&PositionSnapshot, &RuleContext<'_>) -> Option<RiskFinding>;

/// Look up the check for a rule. Adding a `RuleKind` without a check
/// fails to compile here.
pub fn rule_fn(rule: RuleKind) -> RuleFn {
    match rule {
        RuleKind::HighRisk => high_risk::check,
        RuleKind::LiquidationRisk => liquidation::check,
        RuleKind::NoStopLoss => no_stop_loss::check,
        RuleKind::RevengePattern => revenge::check,
    }
}

/// The configured rule set, evaluated in `RuleKind::ALL` order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    config: RuleConfig,
}

impl RuleSet {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Build the context for one evaluation pass.
    pub fn context<'a>(
        &'a self,
        user: UserId,
        now: DateTime<Utc>,
        outcomes: &'a [TradeOutcome],
    ) -> RuleContext<'a> {
        RuleContext::new(user, now, &self.config, outcomes)
    }

    /// Run every rule against one snapshot. Suppression is not applied here.
    pub fn evaluate(&self, snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Vec<RiskFinding> {
        RuleKind::ALL
            .iter()
            .filter_map(|&rule| {
                let finding = rule_fn(rule)(snapshot, ctx);
                if let Some(f) = &finding {
                    trace!(user = %ctx.user, symbol = %snapshot.symbol, rule = %rule, metric = %f.metric, "rule fired");
                }
                finding
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_clean_position() {
        let rules = RuleSet::default();
        let snap = PositionSnapshot::new("BTCUSDT", dec!(0.01), dec!(50000), dec!(50000), dec!(2), t0())
            .with_liquidation_price(dec!(25000))
            .with_account_equity(dec!(100000))
            .with_order(guard_core::types::ProtectiveOrder::stop_loss(dec!(49000)));
        let ctx = rules.context(UserId(1), t0() + Duration::hours(2), &[]);

        assert!(rules.evaluate(&snap, &ctx).is_empty());
    }

    #[test]
    fn test_findings_in_rule_order() {
        let rules = RuleSet::default();
        // 20x long, liquidation 2% away, no stop for 10 minutes
        let snap = PositionSnapshot::new("BTCUSDT", dec!(1), dec!(50000), dec!(50000), dec!(20), t0())
            .with_liquidation_price(dec!(49000))
            .with_account_equity(dec!(10000));
        let outcomes = vec![
            TradeOutcome::new("BTCUSDT", dec!(-10), t0() - Duration::minutes(6)),
            TradeOutcome::new("BTCUSDT", dec!(-10), t0() - Duration::minutes(2)),
        ];
        let ctx = rules.context(UserId(1), t0() + Duration::minutes(10), &outcomes);

        let rules_fired: Vec<_> = rules.evaluate(&snap, &ctx).iter().map(|f| f.rule).collect();
        assert_eq!(rules_fired, RuleKind::ALL.to_vec());
    }

    #[test]
    fn test_every_rule_dispatches() {
        let config = RuleConfig::default();
        let snap = PositionSnapshot::new("BTCUSDT", dec!(1), dec!(1), dec!(1), dec!(1), t0());
        let ctx = RuleContext::new(UserId(1), t0(), &config, &[]);
        for rule in RuleKind::ALL {
            // A fresh, equity-less snapshot trips nothing
            assert!(rule_fn(rule)(&snap, &ctx).is_none());
        }
    }
}
