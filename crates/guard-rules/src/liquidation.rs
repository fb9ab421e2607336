//! LIQUIDATION_RISK: mark price too close to the liquidation level.

use guard_core::types::{PositionSnapshot, RiskFinding, RuleKind, Severity};
use rust_decimal_macros::dec;

use crate::rule_set::RuleContext;

pub(crate) fn check(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    let distance = snapshot.liquidation_distance_pct()?;
    let min = ctx.config.min_liq_distance_pct;
    if distance >= min {
        return None;
    }

    let third = min / dec!(3);
    let severity = if distance < third {
        Severity::Critical
    } else if distance < third * dec!(2) {
        Severity::High
    } else {
        Severity::Warning
    };

    Some(
        RiskFinding::new(
            RuleKind::LiquidationRisk,
            ctx.user,
            snapshot.symbol.clone(),
            distance,
            min,
            format!("Liquidation {:.1}% away (min safe: {}%)", distance, min),
            ctx.now,
        )
        .with_severity(severity)
        .with_suggestion("Add margin or reduce leverage")
        .with_context(snapshot),
    )
}
