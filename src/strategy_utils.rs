use crate::models::{Bar, SignalAction, StrategySignal};

/// Create a hold signal (default action when no trade signal is generated)
pub fn hold_signal() -> StrategySignal {
    StrategySignal {
        action: SignalAction::Hold,
        price: 0.0,
        amount: 0.0,
    }
}

/// Create a buy signal filled at `price` for a cash `amount`
pub fn buy_signal(price: f64, amount: f64) -> StrategySignal {
    StrategySignal {
        action: SignalAction::Buy,
        price,
        amount,
    }
}

/// Usable rolling std-dev of a bar, or `None` when a ratio against it would
/// be meaningless.
pub fn usable_std_dev(bar: &Bar) -> Option<f64> {
    if bar.std_dev.is_finite() && bar.std_dev > 0.0 {
        Some(bar.std_dev)
    } else {
        None
    }
}
