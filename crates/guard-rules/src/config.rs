//! Rule thresholds and the HIGH_RISK formula.

use chrono::Duration;
use guard_core::types::{PositionSnapshot, RuleKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How HIGH_RISK turns a snapshot into a percentage of account equity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFormula {
    /// Equity lost if price runs to liquidation:
    /// `|size| * |mark - liq| / equity * 100`, falling back to the posted
    /// margin when no liquidation price is reported
    #[default]
    LossToLiquidation,
    /// Posted margin: `notional / leverage / equity * 100`
    MarginToEquity,
    /// Gross exposure: `notional / equity * 100`
    NotionalToEquity,
}

impl RiskFormula {
    /// Risk as a percentage of equity, `None` without positive equity.
    pub fn risk_pct(&self, snapshot: &PositionSnapshot) -> Option<Decimal> {
        let equity = snapshot.account_equity;
        if equity <= Decimal::ZERO {
            return None;
        }

        let at_risk = match self {
            RiskFormula::LossToLiquidation => match snapshot.liquidation_price {
                Some(liq) => snapshot.abs_size() * (snapshot.mark_price - liq).abs(),
                None => snapshot.margin(),
            },
            RiskFormula::MarginToEquity => snapshot.margin(),
            RiskFormula::NotionalToEquity => snapshot.notional,
        };

        Some(at_risk / equity * dec!(100))
    }
}

/// Rule thresholds and alert throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// HIGH_RISK fires above this percentage of equity
    pub max_risk_pct: Decimal,
    /// LIQUIDATION_RISK fires below this distance to liquidation
    pub min_liq_distance_pct: Decimal,
    /// NO_STOP_LOSS grace period after opening
    pub no_sl_timeout_minutes: u32,
    /// Look-back for REVENGE_PATTERN
    pub revenge_window_minutes: u32,
    /// Losing trades inside the window needed for REVENGE_PATTERN
    pub revenge_min_losses: usize,
    /// Closed trades inside the frequency window that count as overtrading
    pub revenge_max_trades: usize,
    /// Look-back for the overtrading branch of REVENGE_PATTERN
    pub revenge_frequency_window_minutes: u32,
    /// Default user cooldown and default per-rule alert cooldown
    pub cooldown_minutes: u32,
    /// Per-rule alert cooldown overrides, in minutes
    pub rule_cooldowns: BTreeMap<RuleKind, u32>,
    pub risk_formula: RiskFormula,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_risk_pct: dec!(2.0),
            min_liq_distance_pct: dec!(5.0),
            no_sl_timeout_minutes: 3,
            revenge_window_minutes: 15,
            revenge_min_losses: 2,
            revenge_max_trades: 5,
            revenge_frequency_window_minutes: 30,
            cooldown_minutes: 30,
            rule_cooldowns: BTreeMap::new(),
            risk_formula: RiskFormula::default(),
        }
    }
}

impl RuleConfig {
    /// Alert cooldown for one rule.
    pub fn cooldown_for(&self, rule: RuleKind) -> Duration {
        let minutes = self
            .rule_cooldowns
            .get(&rule)
            .copied()
            .unwrap_or(self.cooldown_minutes);
        Duration::minutes(i64::from(minutes))
    }

    /// The longest alert cooldown any rule uses.
    pub fn longest_cooldown(&self) -> Duration {
        let minutes = self
            .rule_cooldowns
            .values()
            .copied()
            .fold(self.cooldown_minutes, u32::max);
        Duration::minutes(i64::from(minutes))
    }

    /// Default length of a user-requested cooldown.
    pub fn default_cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_minutes))
    }

    pub fn no_sl_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.no_sl_timeout_minutes))
    }

    pub fn revenge_window(&self) -> Duration {
        Duration::minutes(i64::from(self.revenge_window_minutes))
    }

    pub fn frequency_window(&self) -> Duration {
        Duration::minutes(i64::from(self.revenge_frequency_window_minutes))
    }

    /// How far back trade outcomes are kept: the longer of the two
    /// REVENGE_PATTERN windows.
    pub fn outcome_horizon(&self) -> Duration {
        self.revenge_window().max(self.frequency_window())
    }

    /// Reject thresholds that would make a rule meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_risk_pct <= Decimal::ZERO {
            return Err(format!("max_risk_pct must be positive, got {}", self.max_risk_pct));
        }
        if self.min_liq_distance_pct <= Decimal::ZERO {
            return Err(format!(
                "min_liq_distance_pct must be positive, got {}",
                self.min_liq_distance_pct
            ));
        }
        if self.revenge_window_minutes == 0 {
            return Err("revenge_window_minutes must be at least 1".to_string());
        }
        if self.revenge_min_losses == 0 {
            return Err("revenge_min_losses must be at least 1".to_string());
        }
        if self.revenge_max_trades == 0 {
            return Err("revenge_max_trades must be at least 1".to_string());
        }
        if self.revenge_frequency_window_minutes == 0 {
            return Err("revenge_frequency_window_minutes must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn snapshot() -> PositionSnapshot {
        let opened = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        PositionSnapshot::new("BTCUSDT", dec!(1), dec!(50000), dec!(50000), dec!(10), opened)
            .with_account_equity(dec!(10000))
    }

    #[test]
    fn test_loss_to_liquidation() {
        let snap = snapshot().with_liquidation_price(dec!(49750));
        assert_eq!(RiskFormula::LossToLiquidation.risk_pct(&snap), Some(dec!(2.5)));
    }

    #[test]
    fn test_loss_to_liquidation_without_liq_uses_margin() {
        // notional 50_000 at 10x -> 5_000 margin on 10_000 equity
        assert_eq!(RiskFormula::LossToLiquidation.risk_pct(&snapshot()), Some(dec!(50)));
    }

    #[test]
    fn test_other_formulas() {
        let snap = snapshot();
        assert_eq!(RiskFormula::MarginToEquity.risk_pct(&snap), Some(dec!(50)));
        assert_eq!(RiskFormula::NotionalToEquity.risk_pct(&snap), Some(dec!(500)));
    }

    #[test]
    fn test_no_equity_no_risk() {
        let snap = snapshot().with_account_equity(Decimal::ZERO);
        assert_eq!(RiskFormula::NotionalToEquity.risk_pct(&snap), None);
    }

    #[test]
    fn test_cooldown_overrides() {
        let mut config = RuleConfig::default();
        config.rule_cooldowns.insert(RuleKind::LiquidationRisk, 3);

        assert_eq!(config.cooldown_for(RuleKind::LiquidationRisk), Duration::minutes(3));
        assert_eq!(config.cooldown_for(RuleKind::HighRisk), Duration::minutes(30));
        assert_eq!(config.longest_cooldown(), Duration::minutes(30));

        config.rule_cooldowns.insert(RuleKind::NoStopLoss, 90);
        assert_eq!(config.longest_cooldown(), Duration::minutes(90));
    }

    #[test]
    fn test_outcome_horizon_is_longest_window() {
        let config = RuleConfig::default();
        assert_eq!(config.outcome_horizon(), Duration::minutes(30));

        let config = RuleConfig {
            revenge_window_minutes: 45,
            ..Default::default()
        };
        assert_eq!(config.outcome_horizon(), Duration::minutes(45));
    }

    #[test]
    fn test_validate() {
        assert!(RuleConfig::default().validate().is_ok());

        let config = RuleConfig {
            max_risk_pct: Decimal::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuleConfig {
            revenge_max_trades: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
