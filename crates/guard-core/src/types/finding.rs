//! Risk findings produced by the rule set.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{ActionKind, PositionSide, PositionSnapshot, UserId};

/// The closed set of risk rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    HighRisk,
    LiquidationRisk,
    NoStopLoss,
    RevengePattern,
}

impl RuleKind {
    /// All rules in evaluation order.
    pub const ALL: [RuleKind; 4] = [
        RuleKind::HighRisk,
        RuleKind::LiquidationRisk,
        RuleKind::NoStopLoss,
        RuleKind::RevengePattern,
    ];

    /// Human-readable rule name.
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::HighRisk => "High Risk Alert",
            RuleKind::LiquidationRisk => "Liquidation Risk",
            RuleKind::NoStopLoss => "No Stop Loss",
            RuleKind::RevengePattern => "Revenge Pattern",
        }
    }

    /// What to work on tomorrow when this rule dominated the day.
    pub fn focus_hint(&self) -> &'static str {
        match self {
            RuleKind::HighRisk => "Size your positions more conservatively",
            RuleKind::LiquidationRisk => "Use lower leverage to stay safe",
            RuleKind::NoStopLoss => "Always set stop loss immediately",
            RuleKind::RevengePattern => "Take breaks between trades",
        }
    }

    /// Corrective actions offered alongside an alert for this rule.
    pub fn suggested_actions(&self) -> &'static [ActionKind] {
        match self {
            RuleKind::HighRisk => &[ActionKind::Acknowledge, ActionKind::ReduceSize, ActionKind::Cooldown],
            RuleKind::LiquidationRisk => &[ActionKind::Acknowledge, ActionKind::AddMargin, ActionKind::ReduceSize],
            RuleKind::NoStopLoss => &[ActionKind::Acknowledge, ActionKind::CommitStopLoss, ActionKind::Cooldown],
            RuleKind::RevengePattern => &[ActionKind::Acknowledge, ActionKind::Cooldown],
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::HighRisk => write!(f, "HIGH_RISK"),
            RuleKind::LiquidationRisk => write!(f, "LIQUIDATION_RISK"),
            RuleKind::NoStopLoss => write!(f, "NO_STOP_LOSS"),
            RuleKind::RevengePattern => write!(f, "REVENGE_PATTERN"),
        }
    }
}

/// Severity band of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Unique finding identifier, referenced by acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindingId(pub Uuid);

impl FindingId {
    pub fn new() -> Self {
        FindingId(Uuid::new_v4())
    }
}

impl Default for FindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position figures captured with a finding for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionContext {
    pub side: PositionSide,
    pub size: Decimal,
    pub leverage: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl From<&PositionSnapshot> for PositionContext {
    fn from(snapshot: &PositionSnapshot) -> Self {
        Self {
            side: snapshot.side,
            size: snapshot.abs_size(),
            leverage: snapshot.leverage,
            mark_price: snapshot.mark_price,
            unrealized_pnl: snapshot.unrealized_pnl,
        }
    }
}

/// One rule's positive detection for one subject at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub id: FindingId,
    pub rule: RuleKind,
    pub severity: Severity,
    pub user: UserId,
    pub symbol: String,
    /// Computed metric (risk %, distance %, minutes unprotected, loss count)
    pub metric: Decimal,
    /// Threshold the metric was compared against
    pub threshold: Decimal,
    pub reason: String,
    pub suggestion: Option<String>,
    pub context: Option<PositionContext>,
    pub generated_at: DateTime<Utc>,
    /// Test findings are delivered but never recorded
    #[serde(default)]
    pub test: bool,
}

impl RiskFinding {
    /// Create a warning-level finding.
    pub fn new(
        rule: RuleKind,
        user: UserId,
        symbol: impl Into<String>,
        metric: Decimal,
        threshold: Decimal,
        reason: impl Into<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FindingId::new(),
            rule,
            severity: Severity::Warning,
            user,
            symbol: symbol.into(),
            metric,
            threshold,
            reason: reason.into(),
            suggestion: None,
            context: None,
            generated_at,
            test: false,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, snapshot: &PositionSnapshot) -> Self {
        self.context = Some(PositionContext::from(snapshot));
        self
    }

    pub fn as_test(mut self) -> Self {
        self.test = true;
        self
    }

    /// Short reference shown to users (last 8 chars of the id).
    pub fn short_ref(&self) -> String {
        let id = self.id.to_string();
        id[id.len().saturating_sub(8)..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rule_display_and_serde() {
        assert_eq!(RuleKind::LiquidationRisk.to_string(), "LIQUIDATION_RISK");
        let json = serde_json::to_string(&RuleKind::NoStopLoss).unwrap();
        assert_eq!(json, "\"no_stop_loss\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Warning);
    }

    #[test]
    fn test_finding_builder() {
        let finding = RiskFinding::new(
            RuleKind::HighRisk,
            UserId(7),
            "BTCUSDT",
            dec!(2.5),
            dec!(2.0),
            "Risk 2.5% exceeds limit (2.0%)",
            Utc::now(),
        )
        .with_severity(Severity::High)
        .with_suggestion("Reduce size by ~20%");

        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.short_ref().len(), 8);
        assert!(!finding.test);
    }
}
