//! NO_STOP_LOSS: position left unprotected past the grace period.

use guard_core::types::{PositionSnapshot, RiskFinding, RuleKind, Severity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::rule_set::RuleContext;

pub(crate) fn check(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    if snapshot.has_stop_loss() {
        return None;
    }

    let age = ctx.now - snapshot.opened_at;
    let timeout = ctx.config.no_sl_timeout();
    if age < timeout {
        return None;
    }

    let minutes = age.num_minutes();
    let severity = if age >= timeout * 3 {
        Severity::High
    } else {
        Severity::Warning
    };

    Some(
        RiskFinding::new(
            RuleKind::NoStopLoss,
            ctx.user,
            snapshot.symbol.clone(),
            Decimal::from(minutes),
            Decimal::from(ctx.config.no_sl_timeout_minutes),
            format!("No stop loss for {} minutes", minutes),
            ctx.now,
        )
        .with_severity(severity)
        .with_suggestion(suggest_stop(snapshot, ctx.config.max_risk_pct))
        .with_context(snapshot),
    )
}

/// A stop at `max_risk_pct` away from entry, on the losing side.
fn suggest_stop(snapshot: &PositionSnapshot, max_risk_pct: Decimal) -> String {
    let offset = max_risk_pct / dec!(100);
    let price = if snapshot.is_long() {
        snapshot.entry_price * (Decimal::ONE - offset)
    } else {
        snapshot.entry_price * (Decimal::ONE + offset)
    };
    format!("Set SL at ${:.2} (~{}% risk)", price, max_risk_pct)
}
