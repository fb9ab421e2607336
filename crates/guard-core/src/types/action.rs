//! Inbound user actions from the notification callback path.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::FindingId;

/// Action a user takes in response to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    /// Mark a finding as seen. Not a positive action.
    Acknowledge { finding: FindingId },
    /// Pause all alerts for a symbol; `None` uses the configured default.
    SetCooldown { symbol: String, minutes: Option<u32> },
    /// Commit to reducing the position size.
    ReduceSize { symbol: String },
    /// Commit to adding margin.
    AddMargin { symbol: String },
    /// Commit to placing a stop-loss.
    CommitStopLoss { symbol: String },
}

impl UserAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            UserAction::Acknowledge { .. } => ActionKind::Acknowledge,
            UserAction::SetCooldown { .. } => ActionKind::Cooldown,
            UserAction::ReduceSize { .. } => ActionKind::ReduceSize,
            UserAction::AddMargin { .. } => ActionKind::AddMargin,
            UserAction::CommitStopLoss { .. } => ActionKind::CommitStopLoss,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            UserAction::Acknowledge { .. } => None,
            UserAction::SetCooldown { symbol, .. }
            | UserAction::ReduceSize { symbol }
            | UserAction::AddMargin { symbol }
            | UserAction::CommitStopLoss { symbol } => Some(symbol),
        }
    }
}

/// Action category, used for counting and for alert buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Acknowledge,
    Cooldown,
    ReduceSize,
    AddMargin,
    CommitStopLoss,
}

impl ActionKind {
    /// Whether the action counts toward the discipline score.
    pub fn is_positive(&self) -> bool {
        !matches!(self, ActionKind::Acknowledge)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Acknowledge => "Acknowledge",
            ActionKind::Cooldown => "Cooldown",
            ActionKind::ReduceSize => "Reduce size",
            ActionKind::AddMargin => "Adding margin",
            ActionKind::CommitStopLoss => "Setting SL",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_acknowledge_is_neutral() {
        assert!(!ActionKind::Acknowledge.is_positive());
        assert!(ActionKind::Cooldown.is_positive());
        assert!(ActionKind::ReduceSize.is_positive());
        assert!(ActionKind::AddMargin.is_positive());
        assert!(ActionKind::CommitStopLoss.is_positive());
    }

    #[test]
    fn test_action_wire_format() {
        let action: UserAction =
            serde_json::from_str(r#"{"action":"set_cooldown","symbol":"BTCUSDT","minutes":30}"#).unwrap();
        assert_eq!(
            action,
            UserAction::SetCooldown {
                symbol: "BTCUSDT".into(),
                minutes: Some(30)
            }
        );
        assert_eq!(action.kind(), ActionKind::Cooldown);
        assert_eq!(action.symbol(), Some("BTCUSDT"));
    }
}
