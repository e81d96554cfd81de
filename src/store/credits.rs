//! Spendable colorization credit.

use super::{State, StoreName};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Slot holding the credit balance.
pub const CREDITS_KEY: &str = "eaders-credits";

/// A non-negative credit amount, counted in hundredths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Converts a decimal amount, rounding to the nearest hundredth.
    ///
    /// Returns `None` for negative, NaN or infinite values.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let hundredths = (value * 100.0).round();
        if hundredths > u64::MAX as f64 {
            return None;
        }
        Some(Self(hundredths as u64))
    }

    pub fn hundredths(self) -> u64 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }

    pub fn saturating_add(self, other: Credits) -> Credits {
        Credits(self.0.saturating_add(other.0))
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BalanceRecord {
    balance: f64,
}

/// Repository for the credit balance.
#[derive(Clone)]
pub struct CreditStore {
    state: State,
    initial: Credits,
}

impl CreditStore {
    /// `initial` is reported until a balance has been stored.
    pub fn new(state: State, initial: Credits) -> Self {
        Self { state, initial }
    }

    pub fn balance(&self) -> Result<Credits, StoreError> {
        let record: Option<BalanceRecord> = self.state.load(CREDITS_KEY)?;
        let stored = record.and_then(|r| {
            let credits = Credits::from_decimal(r.balance);
            if credits.is_none() {
                tracing::warn!(balance = r.balance, "ignoring invalid stored balance");
            }
            credits
        });
        Ok(stored.unwrap_or(self.initial))
    }

    pub fn set_balance(&self, balance: Credits) -> Result<(), StoreError> {
        let record = BalanceRecord {
            balance: balance.as_decimal(),
        };
        self.state.save(StoreName::Credits, CREDITS_KEY, &record)
    }

    /// Adds `amount` and returns the new balance.
    pub fn top_up(&self, amount: Credits) -> Result<Credits, StoreError> {
        let balance = self.balance()?.saturating_add(amount);
        self.set_balance(balance)?;
        Ok(balance)
    }

    /// Subtracts `cost` if the balance covers it.
    ///
    /// Returns the new balance, or `None` (and writes nothing) when the
    /// balance is short.
    pub fn deduct(&self, cost: Credits) -> Result<Option<Credits>, StoreError> {
        let Some(balance) = self.balance()?.checked_sub(cost) else {
            return Ok(None);
        };
        self.set_balance(balance)?;
        Ok(Some(balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeBus, KeyValueStore, MemoryStore};
    use std::sync::Arc;

    #[test]
    fn test_from_decimal() {
        assert_eq!(Credits::from_decimal(1.5), Some(Credits::from_hundredths(150)));
        assert_eq!(Credits::from_decimal(0.125), Some(Credits::from_hundredths(13)));
        assert_eq!(Credits::from_decimal(-0.01), None);
        assert_eq!(Credits::from_decimal(f64::NAN), None);
        assert_eq!(Credits::from_decimal(f64::INFINITY), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Credits::from_hundredths(505).to_string(), "5.05");
        assert_eq!(Credits::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_initial_balance_until_stored() {
        let credits = CreditStore::new(State::in_memory(), Credits::from_hundredths(300));
        assert_eq!(credits.balance().unwrap(), Credits::from_hundredths(300));

        credits.set_balance(Credits::ZERO).unwrap();
        assert_eq!(credits.balance().unwrap(), Credits::ZERO);
    }

    #[test]
    fn test_top_up_and_deduct() {
        let credits = CreditStore::new(State::in_memory(), Credits::ZERO);
        let one = Credits::from_hundredths(100);

        assert_eq!(credits.deduct(one).unwrap(), None);
        assert_eq!(credits.balance().unwrap(), Credits::ZERO);

        credits.top_up(Credits::from_hundredths(150)).unwrap();
        assert_eq!(credits.deduct(one).unwrap(), Some(Credits::from_hundredths(50)));
        assert_eq!(credits.deduct(one).unwrap(), None);
        assert_eq!(credits.balance().unwrap(), Credits::from_hundredths(50));
    }

    #[test]
    fn test_negative_stored_balance_is_absent() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(CREDITS_KEY, r#"{"balance":-4}"#).unwrap();
        let credits = CreditStore::new(
            State::new(kv, ChangeBus::new()),
            Credits::from_hundredths(200),
        );
        assert_eq!(credits.balance().unwrap(), Credits::from_hundredths(200));
    }

    #[test]
    fn test_balance_change_published() {
        let state = State::in_memory();
        let mut rx = state.bus().subscribe(StoreName::Credits);
        let credits = CreditStore::new(state, Credits::ZERO);

        credits.top_up(Credits::from_hundredths(500)).unwrap();
        assert_eq!(rx.try_recv().unwrap().key, CREDITS_KEY);
    }
}
