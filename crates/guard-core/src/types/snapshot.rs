//! Position snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "Long"),
            PositionSide::Short => write!(f, "Short"),
        }
    }
}

/// Kind of protective order attached to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    StopLoss,
    TakeProfit,
}

/// A protective order resting on the exchange for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveOrder {
    pub kind: OrderKind,
    pub trigger_price: Decimal,
}

impl ProtectiveOrder {
    pub fn stop_loss(trigger_price: Decimal) -> Self {
        Self {
            kind: OrderKind::StopLoss,
            trigger_price,
        }
    }

    pub fn take_profit(trigger_price: Decimal) -> Self {
        Self {
            kind: OrderKind::TakeProfit,
            trigger_price,
        }
    }
}

/// Point-in-time view of one open position and its protective orders.
///
/// Built fresh on every poll and never mutated afterwards; the `with_*`
/// methods consume the value while it is being assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Symbol
    pub symbol: String,
    /// Long or short, derived from the sign of `size`
    pub side: PositionSide,
    /// Average entry price
    pub entry_price: Decimal,
    /// Current mark price
    pub mark_price: Decimal,
    /// Signed quantity (positive for long, negative for short)
    pub size: Decimal,
    /// Leverage multiplier
    pub leverage: Decimal,
    /// Notional value (|size| * mark_price)
    pub notional: Decimal,
    /// Liquidation price, if the exchange reports one
    pub liquidation_price: Option<Decimal>,
    /// Unrealized profit/loss
    pub unrealized_pnl: Decimal,
    /// Account equity backing the position
    pub account_equity: Decimal,
    /// When the position was opened
    pub opened_at: DateTime<Utc>,
    /// Attached stop-loss / take-profit orders
    pub protective_orders: Vec<ProtectiveOrder>,
}

impl PositionSnapshot {
    /// Create a snapshot from the raw exchange figures.
    pub fn new(
        symbol: impl Into<String>,
        size: Decimal,
        entry_price: Decimal,
        mark_price: Decimal,
        leverage: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let side = if size < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Long
        };

        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            mark_price,
            size,
            leverage,
            notional: size.abs() * mark_price,
            liquidation_price: None,
            unrealized_pnl: size * (mark_price - entry_price),
            account_equity: Decimal::ZERO,
            opened_at,
            protective_orders: Vec::new(),
        }
    }

    pub fn with_liquidation_price(mut self, price: Decimal) -> Self {
        // Exchanges report 0 when there is no liquidation level.
        self.liquidation_price = (price > Decimal::ZERO).then_some(price);
        self
    }

    pub fn with_account_equity(mut self, equity: Decimal) -> Self {
        self.account_equity = equity;
        self
    }

    pub fn with_order(mut self, order: ProtectiveOrder) -> Self {
        self.protective_orders.push(order);
        self
    }

    /// Override the unrealized PnL with the exchange-reported figure.
    pub fn with_unrealized_pnl(mut self, pnl: Decimal) -> Self {
        self.unrealized_pnl = pnl;
        self
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn abs_size(&self) -> Decimal {
        self.size.abs()
    }

    /// Check if a stop-loss order is attached.
    pub fn has_stop_loss(&self) -> bool {
        self.protective_orders
            .iter()
            .any(|o| o.kind == OrderKind::StopLoss)
    }

    /// Margin posted for the position (notional / leverage).
    pub fn margin(&self) -> Decimal {
        if self.leverage > Decimal::ZERO {
            self.notional / self.leverage
        } else {
            self.notional
        }
    }

    /// Distance from mark to liquidation as a percentage of mark.
    pub fn liquidation_distance_pct(&self) -> Option<Decimal> {
        let liq = self.liquidation_price?;
        if self.mark_price <= Decimal::ZERO {
            return None;
        }
        Some((self.mark_price - liq).abs() / self.mark_price * Decimal::ONE_HUNDRED)
    }
}
