//! REVENGE_PATTERN: re-entering a symbol right after a string of losses,
//! or still trading after a burst of closed trades.

use chrono::Duration;
use guard_core::types::{PositionSnapshot, RiskFinding, RuleKind, Severity, TradeOutcome};
use rust_decimal::Decimal;

use crate::rule_set::RuleContext;

pub(crate) fn check(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    quick_reentry(snapshot, ctx).or_else(|| overtrading(snapshot, ctx))
}

fn within<'a>(ctx: &RuleContext<'a>, window: Duration) -> impl Iterator<Item = &'a TradeOutcome> {
    let now = ctx.now;
    let horizon = now - window;
    ctx.outcomes
        .iter()
        .filter(move |o| o.closed_at >= horizon && o.closed_at <= now)
}

/// Most recent outcome; on equal timestamps the later-recorded one wins.
fn latest<'a>(outcomes: impl Iterator<Item = &'a TradeOutcome>) -> Option<&'a TradeOutcome> {
    outcomes.reduce(|latest, o| if o.closed_at >= latest.closed_at { o } else { latest })
}

fn quick_reentry(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    let losses: Vec<&TradeOutcome> = within(ctx, ctx.config.revenge_window())
        .filter(|o| o.is_loss())
        .collect();
    if losses.len() < ctx.config.revenge_min_losses {
        return None;
    }

    let anchor = latest(losses.iter().copied())?;
    if anchor.symbol != snapshot.symbol || snapshot.opened_at <= anchor.closed_at {
        return None;
    }

    let count = losses.len();
    let gap = (snapshot.opened_at - anchor.closed_at).num_minutes();
    let severity = if count > ctx.config.revenge_min_losses {
        Severity::High
    } else {
        Severity::Warning
    };

    Some(
        RiskFinding::new(
            RuleKind::RevengePattern,
            ctx.user,
            snapshot.symbol.clone(),
            Decimal::from(count),
            Decimal::from(ctx.config.revenge_min_losses),
            format!(
                "{} losses in the last {} minutes, re-entered {} {} minutes after the last one",
                count, ctx.config.revenge_window_minutes, snapshot.symbol, gap
            ),
            ctx.now,
        )
        .with_severity(severity)
        .with_suggestion(format!(
            "Take a {}-minute break before the next trade",
            ctx.config.cooldown_minutes
        ))
        .with_context(snapshot),
    )
}

/// Fires on a position opened after `revenge_max_trades` or more trades
/// closed inside the frequency window, win or lose.
fn overtrading(snapshot: &PositionSnapshot, ctx: &RuleContext<'_>) -> Option<RiskFinding> {
    let recent: Vec<&TradeOutcome> = within(ctx, ctx.config.frequency_window()).collect();
    if recent.len() < ctx.config.revenge_max_trades {
        return None;
    }

    let last = latest(recent.iter().copied())?;
    if snapshot.opened_at <= last.closed_at {
        return None;
    }

    let count = recent.len();
    Some(
        RiskFinding::new(
            RuleKind::RevengePattern,
            ctx.user,
            snapshot.symbol.clone(),
            Decimal::from(count),
            Decimal::from(ctx.config.revenge_max_trades),
            format!(
                "{} trades closed in the last {} minutes, still trading {}",
                count, ctx.config.revenge_frequency_window_minutes, snapshot.symbol
            ),
            ctx.now,
        )
        .with_severity(Severity::Warning)
        .with_suggestion(format!(
            "Slow down: take a {}-minute break from trading",
            ctx.config.cooldown_minutes
        ))
        .with_context(snapshot),
    )
}
