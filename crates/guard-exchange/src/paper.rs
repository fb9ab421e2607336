//! Paper exchange for simulation and tests.

use async_trait::async_trait;
use guard_core::error::ExchangeError;
use guard_core::traits::{Clock, ExchangeSource};
use guard_core::types::{PositionSnapshot, ProtectiveOrder, TradeOutcome, UserId};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Account {
    equity: Decimal,
    positions: BTreeMap<String, PositionSnapshot>,
    /// Most recent close per symbol
    closed: HashMap<String, TradeOutcome>,
    /// Errors returned by the next fetches, in order
    failures: VecDeque<ExchangeError>,
}

/// In-memory exchange.
///
/// Positions are stored as snapshots and rebuilt whenever the mark price
/// moves. Closing a position realizes its PnL into the account equity.
pub struct PaperExchange {
    accounts: Mutex<HashMap<UserId, Account>>,
    clock: Arc<dyn Clock>,
}

impl PaperExchange {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<UserId, Account>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the account equity backing every position of the user.
    pub fn set_equity(&self, user: UserId, equity: Decimal) {
        let mut accounts = self.accounts();
        let account = accounts.entry(user).or_default();
        account.equity = equity;
        for position in account.positions.values_mut() {
            position.account_equity = equity;
        }
    }

    pub fn equity(&self, user: UserId) -> Decimal {
        self.accounts()
            .get(&user)
            .map(|a| a.equity)
            .unwrap_or_default()
    }

    /// Open a position at `entry_price`, opened now.
    ///
    /// The liquidation price is estimated as `entry * (1 -/+ 1/leverage)`;
    /// unleveraged positions get none.
    pub fn open_position(
        &self,
        user: UserId,
        symbol: &str,
        size: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
    ) -> PositionSnapshot {
        let snapshot = PositionSnapshot::new(symbol, size, entry_price, entry_price, leverage, self.clock.now());
        let liquidation = if leverage > Decimal::ONE {
            let buffer = entry_price / leverage;
            if snapshot.is_long() {
                entry_price - buffer
            } else {
                entry_price + buffer
            }
        } else {
            Decimal::ZERO
        };
        self.insert_position(user, snapshot.with_liquidation_price(liquidation))
    }

    /// Insert a fully specified snapshot, replacing any position on the symbol.
    pub fn insert_position(&self, user: UserId, snapshot: PositionSnapshot) -> PositionSnapshot {
        let mut accounts = self.accounts();
        let account = accounts.entry(user).or_default();
        let snapshot = snapshot.with_account_equity(account.equity);
        debug!(user = %user, symbol = %snapshot.symbol, size = %snapshot.size, "Paper position opened");
        account
            .positions
            .insert(snapshot.symbol.clone(), snapshot.clone());
        snapshot
    }

    fn modify<F>(&self, user: UserId, symbol: &str, f: F) -> bool
    where
        F: FnOnce(PositionSnapshot) -> PositionSnapshot,
    {
        let mut accounts = self.accounts();
        let Some(position) = accounts
            .get_mut(&user)
            .and_then(|a| a.positions.remove(symbol))
        else {
            return false;
        };
        let updated = f(position);
        if let Some(account) = accounts.get_mut(&user) {
            account.positions.insert(symbol.to_string(), updated);
        }
        true
    }

    /// Move the mark price. Returns false if the position does not exist.
    pub fn update_mark(&self, user: UserId, symbol: &str, mark_price: Decimal) -> bool {
        self.modify(user, symbol, |old| {
            let mut fresh = PositionSnapshot::new(
                old.symbol,
                old.size,
                old.entry_price,
                mark_price,
                old.leverage,
                old.opened_at,
            )
            .with_account_equity(old.account_equity);
            fresh.liquidation_price = old.liquidation_price;
            fresh.protective_orders = old.protective_orders;
            fresh
        })
    }

    pub fn set_liquidation_price(&self, user: UserId, symbol: &str, price: Decimal) -> bool {
        self.modify(user, symbol, |p| p.with_liquidation_price(price))
    }

    pub fn attach_stop_loss(&self, user: UserId, symbol: &str, trigger_price: Decimal) -> bool {
        self.modify(user, symbol, |p| p.with_order(ProtectiveOrder::stop_loss(trigger_price)))
    }

    pub fn attach_take_profit(&self, user: UserId, symbol: &str, trigger_price: Decimal) -> bool {
        self.modify(user, symbol, |p| p.with_order(ProtectiveOrder::take_profit(trigger_price)))
    }

    /// Close a position at `exit_price` and realize its PnL.
    pub fn close_position(&self, user: UserId, symbol: &str, exit_price: Decimal) -> Option<TradeOutcome> {
        let mut accounts = self.accounts();
        let account = accounts.get_mut(&user)?;
        let position = account.positions.remove(symbol)?;

        let pnl = position.size * (exit_price - position.entry_price);
        let outcome = TradeOutcome::new(symbol, pnl, self.clock.now());
        account.equity += pnl;
        for other in account.positions.values_mut() {
            other.account_equity = account.equity;
        }
        account.closed.insert(symbol.to_string(), outcome.clone());

        debug!(user = %user, symbol = %symbol, pnl = %pnl, "Paper position closed");
        Some(outcome)
    }

    /// Make the next fetch for `user` fail with `error`.
    pub fn inject_failure(&self, user: UserId, error: ExchangeError) {
        self.accounts()
            .entry(user)
            .or_default()
            .failures
            .push_back(error);
    }

    pub fn open_positions(&self, user: UserId) -> Vec<PositionSnapshot> {
        self.accounts()
            .get(&user)
            .map(|a| a.positions.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExchangeSource for PaperExchange {
    async fn fetch_open_positions(&self, user: UserId) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let mut accounts = self.accounts();
        let Some(account) = accounts.get_mut(&user) else {
            return Ok(Vec::new());
        };
        if let Some(error) = account.failures.pop_front() {
            return Err(error);
        }
        Ok(account.positions.values().cloned().collect())
    }

    async fn fetch_closed_trade(&self, user: UserId, symbol: &str) -> Result<Option<TradeOutcome>, ExchangeError> {
        Ok(self
            .accounts()
            .get(&user)
            .and_then(|a| a.closed.get(symbol).cloned()))
    }

    fn name(&self) -> &str {
        "paper"
    }
}
