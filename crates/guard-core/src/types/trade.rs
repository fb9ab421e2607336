//! Realized trade outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Realized result of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// When the position closed
    pub closed_at: DateTime<Utc>,
    pub symbol: String,
    pub realized_pnl: Decimal,
}

impl TradeOutcome {
    pub fn new(symbol: impl Into<String>, realized_pnl: Decimal, closed_at: DateTime<Utc>) -> Self {
        Self {
            closed_at,
            symbol: symbol.into(),
            realized_pnl,
        }
    }

    pub fn is_loss(&self) -> bool {
        self.realized_pnl < Decimal::ZERO
    }
}
