use crate::account::Account;
use crate::config::AccountSettings;

/// Read-only view of the account handed to the entry rules for one bar.
#[derive(Debug, Clone, Copy)]
pub struct RiskPayload<'a> {
    pub requested_amount: f64,
    pub uninvested_balance: f64,
    pub account: &'a Account,
}

impl<'a> RiskPayload<'a> {
    pub fn new(account: &'a Account, requested_amount: f64) -> Self {
        Self {
            requested_amount,
            uninvested_balance: account.uninvested_balance(),
            account,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceCheck {
    pub valid: bool,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleValidation {
    pub balance: BalanceCheck,
    pub max_positions_reached: bool,
}

impl RuleValidation {
    pub fn can_buy(&self) -> bool {
        self.balance.valid && self.max_positions_reached
    }
}

fn clamp_to_limits(amount: f64, uninvested_balance: f64, settings: &AccountSettings) -> BalanceCheck {
    if !amount.is_finite() || !uninvested_balance.is_finite() {
        return BalanceCheck {
            valid: false,
            amount: 0.0,
        };
    }
    let clamped = amount.min(settings.max_order_value).min(uninvested_balance);
    BalanceCheck {
        valid: clamped > 0.0,
        amount: clamped.max(0.0),
    }
}

/// Largest order the account may place: the requested amount capped by the
/// per-order limit and by available cash.
pub fn balance_valid(payload: &RiskPayload, settings: &AccountSettings) -> BalanceCheck {
    clamp_to_limits(payload.requested_amount, payload.uninvested_balance, settings)
}

/// Returns `true` while another position may still be opened.
///
/// Despite the name this is the "capacity available" predicate; callers gate
/// entries on it being `true`.
pub fn max_positions_reached(payload: &RiskPayload, settings: &AccountSettings) -> bool {
    payload.account.open_positions() < settings.max_concurrent_positions
}

pub fn validate(payload: &RiskPayload, settings: &AccountSettings) -> RuleValidation {
    RuleValidation {
        balance: balance_valid(payload, settings),
        max_positions_reached: max_positions_reached(payload, settings),
    }
}

pub fn can_buy(payload: &RiskPayload, settings: &AccountSettings) -> bool {
    validate(payload, settings).can_buy()
}

/// Applies the balance clamp to a strategy-suggested order size.
pub fn clamp_order(suggested: f64, payload: &RiskPayload, settings: &AccountSettings) -> BalanceCheck {
    clamp_to_limits(suggested, payload.uninvested_balance, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn settings(max_order_value: f64, max_concurrent_positions: u32) -> AccountSettings {
        AccountSettings {
            initial_balance: 10_000.0,
            max_order_value,
            max_concurrent_positions,
            base_order_value: 1_000.0,
        }
    }

    #[test]
    fn balance_check_takes_smallest_limit() {
        let account = Account::new(300.0);
        let payload = RiskPayload::new(&account, 1_000.0);
        let check = balance_valid(&payload, &settings(500.0, 1));
        assert!(check.valid);
        assert!((check.amount - 300.0).abs() < 1e-12);
    }

    #[test]
    fn balance_check_caps_at_max_order_value() {
        let account = Account::new(10_000.0);
        let payload = RiskPayload::new(&account, 1_000.0);
        let check = balance_valid(&payload, &settings(500.0, 1));
        assert!((check.amount - 500.0).abs() < 1e-12);
    }

    #[test]
    fn balance_check_accepts_any_positive_amount() {
        let account = Account::new(5e-7);
        let payload = RiskPayload::new(&account, 1_000.0);
        let check = balance_valid(&payload, &settings(500.0, 1));
        assert!(check.valid);
        assert_eq!(check.amount, 5e-7);
    }

    #[test]
    fn balance_check_fails_without_cash() {
        let mut account = Account::new(100.0);
        account
            .apply_buy(Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(), 100.0, 10.0)
            .unwrap();
        let payload = RiskPayload::new(&account, 1_000.0);
        let check = balance_valid(&payload, &settings(500.0, 1));
        assert!(!check.valid);
        assert_eq!(check.amount, 0.0);
    }

    // `max_positions_reached` is true while capacity is still available.
    #[test]
    fn capacity_predicate_is_true_when_capacity_remains() {
        let account = Account::new(1_000.0);
        let payload = RiskPayload::new(&account, 100.0);
        assert!(max_positions_reached(&payload, &settings(500.0, 1)));
        assert!(!max_positions_reached(&payload, &settings(500.0, 0)));
    }

    #[test]
    fn capacity_gate_blocks_second_position() {
        let mut account = Account::new(1_000.0);
        account
            .apply_buy(Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(), 100.0, 10.0)
            .unwrap();
        let payload = RiskPayload::new(&account, 100.0);
        let validation = validate(&payload, &settings(500.0, 1));
        assert!(validation.balance.valid);
        assert!(!validation.max_positions_reached);
        assert!(!validation.can_buy());
        assert!(!can_buy(&payload, &settings(500.0, 1)));
    }

    #[test]
    fn clamp_order_rejects_non_positive_suggestions() {
        let account = Account::new(1_000.0);
        let payload = RiskPayload::new(&account, 100.0);
        assert!(!clamp_order(-20.0, &payload, &settings(500.0, 1)).valid);
        assert!(!clamp_order(f64::NAN, &payload, &settings(500.0, 1)).valid);
        let clamped = clamp_order(2_000.0, &payload, &settings(500.0, 1));
        assert!(clamped.valid);
        assert!((clamped.amount - 500.0).abs() < 1e-12);
    }
}
