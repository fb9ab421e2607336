//! Per-user risk state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::{ActionKind, DisciplineScore, FindingId, RiskFinding, RuleKind, TradeOutcome, UserId};

/// How many emitted findings are kept for display.
pub const RECENT_FINDINGS_CAP: usize = 50;

/// Why a finding was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The user paused the symbol until the given time
    SymbolCooldown { until: DateTime<Utc> },
    /// The same rule already alerted for the symbol recently
    RuleCooldown { last_alert_at: DateTime<Utc> },
}

/// Mutable record of one user's alert clocks, trade history and counters.
///
/// The score is never stored; it is always derived from the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskState {
    pub user: UserId,
    /// symbol -> rule -> last time a finding was emitted
    #[serde(default)]
    pub last_alert_at: BTreeMap<String, BTreeMap<RuleKind, DateTime<Utc>>>,
    /// symbol -> end of a user-requested pause
    #[serde(default)]
    pub cooldown_until: BTreeMap<String, DateTime<Utc>>,
    /// Realized outcomes inside the revenge window, oldest first
    #[serde(default)]
    pub trade_outcomes: VecDeque<TradeOutcome>,
    /// symbol -> opened_at of the positions seen on the last cycle
    #[serde(default)]
    pub open_positions: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub violation_count: u32,
    #[serde(default)]
    pub positive_action_count: u32,
    #[serde(default)]
    pub violations_by_rule: BTreeMap<RuleKind, u32>,
    #[serde(default)]
    pub actions_by_kind: BTreeMap<ActionKind, u32>,
    /// Emitted findings not yet acknowledged
    #[serde(default)]
    pub pending_ack: BTreeSet<FindingId>,
    #[serde(default)]
    pub recent_findings: VecDeque<RiskFinding>,
    pub updated_at: DateTime<Utc>,
}

impl UserRiskState {
    /// Fresh state for a first-seen user.
    pub fn new(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user,
            last_alert_at: BTreeMap::new(),
            cooldown_until: BTreeMap::new(),
            trade_outcomes: VecDeque::new(),
            open_positions: BTreeMap::new(),
            violation_count: 0,
            positive_action_count: 0,
            violations_by_rule: BTreeMap::new(),
            actions_by_kind: BTreeMap::new(),
            pending_ack: BTreeSet::new(),
            recent_findings: VecDeque::new(),
            updated_at: now,
        }
    }

    /// Current discipline score.
    pub fn score(&self) -> DisciplineScore {
        DisciplineScore::from_counts(self.violation_count, self.positive_action_count)
    }

    /// Check whether a finding for `(rule, symbol)` must be held back.
    ///
    /// A symbol cooldown wins over the per-rule clock.
    pub fn suppression(
        &self,
        rule: RuleKind,
        symbol: &str,
        now: DateTime<Utc>,
        rule_cooldown: Duration,
    ) -> Option<Suppression> {
        if let Some(&until) = self.cooldown_until.get(symbol) {
            if until >= now {
                return Some(Suppression::SymbolCooldown { until });
            }
        }

        let last = self.last_alert_at.get(symbol)?.get(&rule).copied()?;
        // A clock that moved backwards yields a negative gap, which stays suppressed.
        if now - last < rule_cooldown {
            return Some(Suppression::RuleCooldown { last_alert_at: last });
        }
        None
    }

    pub fn last_alert(&self, rule: RuleKind, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_alert_at.get(symbol)?.get(&rule).copied()
    }

    /// Record an emitted finding: start its clock and count the violation.
    pub fn record_alert(&mut self, finding: &RiskFinding) {
        self.last_alert_at
            .entry(finding.symbol.clone())
            .or_default()
            .insert(finding.rule, finding.generated_at);
        self.violation_count = self.violation_count.saturating_add(1);
        *self.violations_by_rule.entry(finding.rule).or_insert(0) += 1;
        self.pending_ack.insert(finding.id);

        self.recent_findings.push_back(finding.clone());
        while self.recent_findings.len() > RECENT_FINDINGS_CAP {
            if let Some(dropped) = self.recent_findings.pop_front() {
                self.pending_ack.remove(&dropped.id);
            }
        }
        self.updated_at = finding.generated_at;
    }

    /// Clear the pending-display flag. Returns false for unknown ids.
    pub fn acknowledge(&mut self, id: FindingId) -> bool {
        self.pending_ack.remove(&id)
    }

    /// Pause all rules for a symbol. An existing longer pause is kept.
    pub fn set_cooldown(&mut self, symbol: &str, until: DateTime<Utc>) -> DateTime<Utc> {
        let entry = self.cooldown_until.entry(symbol.to_string()).or_insert(until);
        if *entry < until {
            *entry = until;
        }
        *entry
    }

    pub fn record_action(&mut self, kind: ActionKind) {
        if kind.is_positive() {
            self.positive_action_count = self.positive_action_count.saturating_add(1);
        }
        *self.actions_by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn record_outcome(&mut self, outcome: TradeOutcome) {
        self.trade_outcomes.push_back(outcome);
    }

    /// Drop outcomes older than `now - window` and restore time order.
    ///
    /// Outcomes stamped after `now` (exchange clock skew) are kept; readers
    /// filter them out of the `[now - window, now]` view.
    pub fn prune_outcomes(&mut self, now: DateTime<Utc>, window: Duration) {
        let horizon = now - window;
        self.trade_outcomes.retain(|o| o.closed_at >= horizon);
        // Stable sort keeps insertion order for equal timestamps.
        self.trade_outcomes
            .make_contiguous()
            .sort_by_key(|o| o.closed_at);
    }

    /// Outcomes inside `[now - window, now]`, oldest first.
    pub fn outcomes_in_window(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> impl Iterator<Item = &TradeOutcome> + '_ {
        let horizon = now - window;
        self.trade_outcomes
            .iter()
            .filter(move |o| o.closed_at >= horizon && o.closed_at <= now)
    }

    /// Forget cooldowns that ended before `now`.
    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>) {
        self.cooldown_until.retain(|_, until| *until >= now);
    }

    /// Forget alert clocks that can no longer suppress anything: entries at
    /// least `longest_cooldown` old, and symbols left with none.
    pub fn prune_alert_clocks(&mut self, now: DateTime<Utc>, longest_cooldown: Duration) {
        self.last_alert_at.retain(|_, rules| {
            rules.retain(|_, at| now - *at < longest_cooldown);
            !rules.is_empty()
        });
    }

    /// Zero the daily counters. The only place counters move backward.
    pub fn reset_daily(&mut self, now: DateTime<Utc>) {
        self.violation_count = 0;
        self.positive_action_count = 0;
        self.violations_by_rule.clear();
        self.actions_by_kind.clear();
        self.updated_at = now;
    }
}
