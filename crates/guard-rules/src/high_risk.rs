//! HIGH_RISK: equity at risk above the configured limit.

use guard_core::types::{PositionSnapshot, RiskFinding, RuleKind, Severity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::rule_set::RuleContext;

pub(crate) fn check(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    let risk = ctx.config.risk_formula.risk_pct(snapshot)?;
    let max = ctx.config.max_risk_pct;
    if risk <= max {
        return None;
    }

    let severity = if risk > max * dec!(2) {
        Severity::High
    } else {
        Severity::Warning
    };
    // Shrinking by this share brings risk back to the limit
    let reduce_by = ((risk - max) / risk * dec!(100)).ceil().max(Decimal::ONE);

    Some(
        RiskFinding::new(
            RuleKind::HighRisk,
            ctx.user,
            snapshot.symbol.clone(),
            risk,
            max,
            format!("Risk {:.2}% exceeds limit ({}%)", risk, max),
            ctx.now,
        )
        .with_severity(severity)
        .with_suggestion(format!("Reduce size by ~{}%", reduce_by))
        .with_context(snapshot),
    )
}
