//! Core data types for the risk guard.

mod action;
mod finding;
mod recap;
mod score;
mod snapshot;
mod state;
mod trade;
mod user;

pub use action::{ActionKind, UserAction};
pub use finding::{FindingId, PositionContext, RiskFinding, RuleKind, Severity};
pub use recap::RecapSummary;
pub use score::{DisciplineScore, Tier};
pub use snapshot::{OrderKind, PositionSide, PositionSnapshot, ProtectiveOrder};
pub use state::{Suppression, UserRiskState, RECENT_FINDINGS_CAP};
pub use trade::TradeOutcome;
pub use user::UserId;
