//! Daily recap summary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ActionKind, DisciplineScore, RuleKind, UserId};

/// End-of-day summary handed to the notification sink and archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecapSummary {
    pub user: UserId,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub score: DisciplineScore,
    pub violation_count: u32,
    pub violations_by_rule: BTreeMap<RuleKind, u32>,
    /// Up to three rules with the most violations, most frequent first
    pub top_violations: Vec<(RuleKind, u32)>,
    pub positive_action_count: u32,
    pub actions_by_kind: BTreeMap<ActionKind, u32>,
    /// Findings still waiting for acknowledgement at recap time
    pub unacknowledged: usize,
    pub focus: String,
}

impl RecapSummary {
    pub fn is_clean(&self) -> bool {
        self.violation_count == 0
    }
}
