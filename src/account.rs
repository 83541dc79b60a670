use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

const BALANCE_EPSILON: f64 = 1e-6;

/// The single lot held while a position is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub shares: f64,
    pub entry_price: f64,
    pub entry_amount: f64,
    pub opened_at: DateTime<Utc>,
}

/// Proceeds of liquidating the open position.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleProceeds {
    pub closed_at: DateTime<Utc>,
    pub shares: f64,
    pub amount: f64,
    pub position: OpenPosition,
}

/// Cash and position ledger for one simulation run.
///
/// The position is a tagged state rather than being inferred from the share
/// count, so `open_positions` and `shares_owned` can never disagree.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    initial_balance: f64,
    uninvested_balance: f64,
    position: Option<OpenPosition>,
    open_position_amount: f64,
    balance_absolute: f64,
    profit: f64,
}

impl Account {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            uninvested_balance: initial_balance,
            position: None,
            open_position_amount: 0.0,
            balance_absolute: initial_balance,
            profit: 0.0,
        }
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn uninvested_balance(&self) -> f64 {
        self.uninvested_balance
    }

    pub fn shares_owned(&self) -> f64 {
        self.position.as_ref().map(|p| p.shares).unwrap_or(0.0)
    }

    pub fn open_positions(&self) -> u32 {
        if self.position.is_some() {
            1
        } else {
            0
        }
    }

    pub fn open_position_amount(&self) -> f64 {
        self.open_position_amount
    }

    pub fn balance_absolute(&self) -> f64 {
        self.balance_absolute
    }

    pub fn profit(&self) -> f64 {
        self.profit
    }

    /// Spends `amount` of cash on `amount / price` shares.
    pub fn apply_buy(
        &mut self,
        timestamp: DateTime<Utc>,
        amount: f64,
        price: f64,
    ) -> EngineResult<OpenPosition> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvalidOrder(format!(
                "buy amount must be positive (value: {})",
                amount
            )));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::InvalidOrder(format!(
                "buy price must be positive (value: {})",
                price
            )));
        }
        if self.position.is_some() {
            return Err(EngineError::PositionAlreadyOpen);
        }
        if amount > self.uninvested_balance {
            return Err(EngineError::InsufficientFunds {
                requested: amount,
                available: self.uninvested_balance,
            });
        }

        let position = OpenPosition {
            shares: amount / price,
            entry_price: price,
            entry_amount: amount,
            opened_at: timestamp,
        };
        self.uninvested_balance -= amount;
        self.position = Some(position.clone());
        self.revalue(price);
        self.check_invariants()?;

        Ok(position)
    }

    /// Liquidates every held share at `price`.
    pub fn apply_sell(&mut self, timestamp: DateTime<Utc>, price: f64) -> EngineResult<SaleProceeds> {
        if !price.is_finite() || price < 0.0 {
            return Err(EngineError::InvalidOrder(format!(
                "sell price must be non-negative (value: {})",
                price
            )));
        }
        let position = self.position.take().ok_or(EngineError::NoOpenPosition)?;

        let amount = position.shares * price;
        self.uninvested_balance += amount;
        self.revalue(price);
        self.check_invariants()?;

        Ok(SaleProceeds {
            closed_at: timestamp,
            shares: position.shares,
            amount,
            position,
        })
    }

    /// Revalues the open position at `price` and refreshes derived balances.
    pub fn mark_to_market(&mut self, price: f64) -> EngineResult<()> {
        if !price.is_finite() {
            return Err(EngineError::InvalidOrder(format!(
                "mark price must be finite (value: {})",
                price
            )));
        }
        self.revalue(price);
        self.check_invariants()
    }

    fn revalue(&mut self, price: f64) {
        self.open_position_amount = self.shares_owned() * price;
        self.balance_absolute = self.uninvested_balance + self.open_position_amount;
        self.profit = self.balance_absolute - self.initial_balance;
    }

    pub fn check_invariants(&self) -> EngineResult<()> {
        let expected = self.uninvested_balance + self.open_position_amount;
        let tolerance = BALANCE_EPSILON * expected.abs().max(1.0);
        if (self.balance_absolute - expected).abs() > tolerance {
            return Err(EngineError::LedgerInvariant(format!(
                "balance_absolute {} != uninvested {} + position {}",
                self.balance_absolute, self.uninvested_balance, self.open_position_amount
            )));
        }
        if self.uninvested_balance < -BALANCE_EPSILON {
            return Err(EngineError::LedgerInvariant(format!(
                "uninvested balance went negative ({})",
                self.uninvested_balance
            )));
        }
        let shares = self.shares_owned();
        if shares < 0.0 || !shares.is_finite() {
            return Err(EngineError::LedgerInvariant(format!(
                "shares owned must be non-negative (value: {})",
                shares
            )));
        }
        if (self.open_positions() == 1) != (shares > 0.0) {
            return Err(EngineError::LedgerInvariant(format!(
                "open_positions {} disagrees with shares owned {}",
                self.open_positions(),
                shares
            )));
        }
        Ok(())
    }
}
