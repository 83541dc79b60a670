use crate::config::BearishComebackSettings;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::strategy_utils::{buy_signal, hold_signal, usable_std_dev};

/// Buys the open after a bearish bar that completes an unusually deep drop.
///
/// The drop is measured from the first open of the window to the previous
/// bar's open, in units of that bar's rolling std-dev, and compared with
/// `A - B * ln(period + 1)`.
pub struct BearishComebackStrategy {
    pub template_id: String,
    period: usize,
    a: f64,
    b: f64,
    base_order_value: f64,
}

impl BearishComebackStrategy {
    pub fn new(settings: &BearishComebackSettings, base_order_value: f64) -> EngineResult<Self> {
        if settings.period == 0 {
            return Err(EngineError::InvalidConfig(
                "Setting strategy1.period must be >= 1 (value: 0)".to_string(),
            ));
        }
        Ok(Self {
            template_id: "bearish_comeback".to_string(),
            period: settings.period,
            a: settings.a,
            b: settings.b,
            base_order_value,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.a - self.b * ((self.period + 1) as f64).ln()
    }
}

impl super::Strategy for BearishComebackStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn window_len(&self) -> usize {
        self.period + 1
    }

    fn generate_signal(&self, window: &[Bar]) -> StrategySignal {
        let n = window.len();
        if n < self.window_len() {
            return hold_signal();
        }
        // Only the trailing `period + 1` bars count if a caller passes more.
        let window = &window[n - self.window_len()..];
        let current = &window[self.period];
        let previous = &window[self.period - 1];

        let std_dev = match usable_std_dev(previous) {
            Some(value) => value,
            None => return hold_signal(),
        };

        let ratio = (window[0].open - previous.open) / std_dev;
        if !ratio.is_finite() {
            return hold_signal();
        }

        if ratio > self.threshold() && previous.is_bearish() {
            return buy_signal(current.open, self.base_order_value * ratio);
        }

        hold_signal()
    }
}
