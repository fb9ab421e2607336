//! State transitions for evaluation cycles and user actions.
//!
//! These functions are synchronous and do no I/O. The state actor calls
//! them while it holds the user's state exclusively.

use chrono::{DateTime, Duration, Utc};
use guard_core::types::{
    ActionKind, FindingId, PositionSnapshot, RiskFinding, Suppression, TradeOutcome, UserAction,
    UserRiskState,
};
use guard_core::{GuardError, GuardResult};
use guard_rules::RuleSet;
use tracing::{debug, info};

/// Everything the actor needs for one cycle, fetched beforehand.
#[derive(Debug, Clone)]
pub struct CycleInput {
    pub now: DateTime<Utc>,
    pub snapshots: Vec<PositionSnapshot>,
    /// Outcomes of positions that closed since the previous cycle
    pub closed: Vec<TradeOutcome>,
}

/// Result of applying one cycle to a user's state.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Findings that passed suppression, in rule order per snapshot
    pub emitted: Vec<RiskFinding>,
    pub suppressed: usize,
}

/// What a user action changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEffect {
    Acknowledged(FindingId),
    CooldownSet {
        symbol: String,
        until: DateTime<Utc>,
    },
    Recorded(ActionKind),
}

/// Apply one evaluation cycle.
pub fn apply_cycle(state: &mut UserRiskState, rules: &RuleSet, input: CycleInput) -> CycleReport {
    let CycleInput {
        now,
        snapshots,
        closed,
    } = input;
    let config = rules.config();
    let horizon = config.outcome_horizon();

    for outcome in closed {
        debug!(user = %state.user, symbol = %outcome.symbol, pnl = %outcome.realized_pnl, "Recording closed trade");
        state.record_outcome(outcome);
    }
    state.prune_outcomes(now, horizon);
    state.prune_cooldowns(now);
    state.prune_alert_clocks(now, config.longest_cooldown());
    state.open_positions = snapshots
        .iter()
        .map(|s| (s.symbol.clone(), s.opened_at))
        .collect();

    let outcomes: Vec<TradeOutcome> = state.outcomes_in_window(now, horizon).cloned().collect();
    let ctx = rules.context(state.user, now, &outcomes);

    let mut report = CycleReport::default();
    for snapshot in &snapshots {
        for finding in rules.evaluate(snapshot, &ctx) {
            let cooldown = config.cooldown_for(finding.rule);
            match state.suppression(finding.rule, &finding.symbol, now, cooldown) {
                Some(Suppression::SymbolCooldown { until }) => {
                    debug!(user = %state.user, symbol = %finding.symbol, rule = %finding.rule, %until, "Suppressed by symbol cooldown");
                    report.suppressed += 1;
                }
                Some(Suppression::RuleCooldown { last_alert_at }) => {
                    debug!(user = %state.user, symbol = %finding.symbol, rule = %finding.rule, %last_alert_at, "Suppressed by rule cooldown");
                    report.suppressed += 1;
                }
                None => {
                    info!(
                        user = %state.user,
                        symbol = %finding.symbol,
                        rule = %finding.rule,
                        severity = %finding.severity,
                        metric = %finding.metric,
                        "Risk finding"
                    );
                    state.record_alert(&finding);
                    report.emitted.push(finding);
                }
            }
        }
    }

    state.updated_at = now;
    report
}

/// Apply one user action.
pub fn apply_action(
    state: &mut UserRiskState,
    rules: &RuleSet,
    action: UserAction,
    now: DateTime<Utc>,
) -> GuardResult<ActionEffect> {
    let kind = action.kind();
    let effect = match action {
        UserAction::Acknowledge { finding } => {
            if !state.acknowledge(finding) {
                return Err(GuardError::FindingNotFound(finding));
            }
            // Only the display flag changes; counters and timestamps stay put
            debug!(user = %state.user, finding = %finding, "Finding acknowledged");
            return Ok(ActionEffect::Acknowledged(finding));
        }
        UserAction::SetCooldown { symbol, minutes } => {
            let length = minutes
                .map(|m| Duration::minutes(i64::from(m)))
                .unwrap_or_else(|| rules.config().default_cooldown());
            let until = state.set_cooldown(&symbol, now + length);
            ActionEffect::CooldownSet { symbol, until }
        }
        UserAction::ReduceSize { .. }
        | UserAction::AddMargin { .. }
        | UserAction::CommitStopLoss { .. } => ActionEffect::Recorded(kind),
    };

    state.record_action(kind);
    state.updated_at = now;
    info!(user = %state.user, action = %kind, score = state.score().value, "User action applied");
    Ok(effect)
}
