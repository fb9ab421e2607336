//! Exchange snapshot source trait definition.

use crate::error::ExchangeError;
use crate::types::{PositionSnapshot, TradeOutcome, UserId};
use async_trait::async_trait;

/// Read-only access to a user's exchange account.
///
/// Implementations never place or modify orders.
#[async_trait]
pub trait ExchangeSource: Send + Sync {
    /// Fetch all open positions with their protective orders.
    async fn fetch_open_positions(&self, user: UserId) -> Result<Vec<PositionSnapshot>, ExchangeError>;

    /// Fetch the realized outcome of the most recent close on `symbol`.
    ///
    /// # Returns
    /// `None` when the exchange has no realized PnL record for the symbol
    async fn fetch_closed_trade(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<Option<TradeOutcome>, ExchangeError>;

    /// Get the source name.
    fn name(&self) -> &str;
}
