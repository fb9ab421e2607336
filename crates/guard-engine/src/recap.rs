//! End-of-day recap.

use chrono::{DateTime, Utc};
use guard_core::types::{RecapSummary, RuleKind, UserRiskState};

const TOP_VIOLATIONS: usize = 3;
const CLEAN_DAY_FOCUS: &str = "Keep up the excellent discipline!";

/// Summarize the day and reset the daily counters.
pub fn close_day(state: &mut UserRiskState, now: DateTime<Utc>) -> RecapSummary {
    let mut top: Vec<(RuleKind, u32)> = state
        .violations_by_rule
        .iter()
        .filter(|&(_, &count)| count > 0)
        .map(|(&rule, &count)| (rule, count))
        .collect();
    // Most frequent first, rule order breaks ties
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    top.truncate(TOP_VIOLATIONS);

    let focus = top
        .first()
        .map(|(rule, _)| rule.focus_hint().to_string())
        .unwrap_or_else(|| CLEAN_DAY_FOCUS.to_string());

    let summary = RecapSummary {
        user: state.user,
        date: now.date_naive(),
        generated_at: now,
        score: state.score(),
        violation_count: state.violation_count,
        violations_by_rule: state.violations_by_rule.clone(),
        top_violations: top,
        positive_action_count: state.positive_action_count,
        actions_by_kind: state.actions_by_kind.clone(),
        unacknowledged: state.pending_ack.len(),
        focus,
    };

    state.reset_daily(now);
    summary
}
