//! Discipline score and tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

const BASE_SCORE: i64 = 100;
const VIOLATION_PENALTY: i64 = 5;
const POSITIVE_ACTION_BONUS: i64 = 2;

/// Score tier, a fixed step function of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Alert,
    Bronze,
    Silver,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Tier::Diamond,
            75..=89 => Tier::Platinum,
            60..=74 => Tier::Silver,
            40..=59 => Tier::Bronze,
            _ => Tier::Alert,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Tier::Diamond => "Excellent",
            Tier::Platinum => "Good",
            Tier::Silver => "Careful",
            Tier::Bronze => "Warning",
            Tier::Alert => "Critical",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Diamond => write!(f, "Diamond"),
            Tier::Platinum => write!(f, "Platinum"),
            Tier::Silver => write!(f, "Silver"),
            Tier::Bronze => write!(f, "Bronze"),
            Tier::Alert => write!(f, "Alert"),
        }
    }
}

/// Discipline score derived from the day's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineScore {
    pub value: u8,
    pub tier: Tier,
}

impl DisciplineScore {
    /// `clamp(100 - 5 * violations + 2 * positive_actions, 0, 100)`.
    pub fn from_counts(violations: u32, positive_actions: u32) -> Self {
        let raw = BASE_SCORE - VIOLATION_PENALTY * i64::from(violations)
            + POSITIVE_ACTION_BONUS * i64::from(positive_actions);
        let value = raw.clamp(0, BASE_SCORE) as u8;

        Self {
            value,
            tier: Tier::from_score(value),
        }
    }
}

impl fmt::Display for DisciplineScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100 ({} - {})", self.value, self.tier, self.tier.status())
    }
}
