use crate::config::IndicatorSettings;
use crate::error::{EngineError, EngineResult};
use crate::models::{Bar, RawBar};
use log::debug;

// Every series below is aligned to its input and NaN until enough history
// exists. Index `i` only ever reads inputs `0..=i`.

pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    let mut sma_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return sma_values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values[period - 1] = window_sum / period as f64;
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values[i] = window_sum / period as f64;
    }

    sma_values
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Wilder RSI, first defined at index `period`.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut rsi_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    rsi_values
}

/// Wilder ATR over true range, first defined at index `period`.
pub fn calculate_atr(bars: &[RawBar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut atr = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return atr;
    }

    let mut tr_sum = 0.0f64;
    let mut prev_close = bars[0].close;
    for i in 1..n {
        let bar = &bars[i];
        let high_low = bar.high - bar.low;
        let high_prev = (bar.high - prev_close).abs();
        let low_prev = (bar.low - prev_close).abs();
        let tr = high_low.max(high_prev).max(low_prev);

        if i <= period {
            tr_sum += tr;
            if i == period {
                atr[i] = tr_sum / period as f64;
            }
        } else {
            atr[i] = ((atr[i - 1] * (period as f64 - 1.0)) + tr) / period as f64;
        }
        prev_close = bar.close;
    }

    atr
}

/// Population standard deviation over a trailing window.
pub fn calculate_std_dev(prices: &[f64], period: usize) -> Vec<f64> {
    let mut values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return values;
    }

    for i in (period - 1)..prices.len() {
        let slice = &prices[i + 1 - period..=i];
        let mean = slice.iter().sum::<f64>() / period as f64;
        let variance = slice.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / period as f64;
        values[i] = variance.sqrt();
    }

    values
}

/// Number of leading bars that carry at least one undefined indicator.
pub fn warmup_len(settings: &IndicatorSettings) -> usize {
    (settings.sma_period.max(1) - 1)
        .max(settings.rsi_period)
        .max(settings.atr_period)
        .max(settings.std_dev_period.max(1) - 1)
}

/// Computes SMA, RSI, ATR and std-dev for every bar and returns the bars
/// where all four are defined.
pub fn enrich(raw_bars: &[RawBar], settings: &IndicatorSettings) -> EngineResult<Vec<Bar>> {
    let closes: Vec<f64> = raw_bars.iter().map(|bar| bar.close).collect();
    let sma = calculate_sma(&closes, settings.sma_period);
    let rsi = calculate_rsi(&closes, settings.rsi_period);
    let atr = calculate_atr(raw_bars, settings.atr_period);
    let std_dev = calculate_std_dev(&closes, settings.std_dev_period);

    let bars: Vec<Bar> = raw_bars
        .iter()
        .enumerate()
        .map(|(i, raw)| Bar {
            timestamp: raw.timestamp,
            open: raw.open,
            close: raw.close,
            high: raw.high,
            low: raw.low,
            sma: sma[i],
            rsi: rsi[i],
            atr: atr[i],
            std_dev: std_dev[i],
        })
        .skip_while(|bar| !bar.indicators_are_finite())
        .collect();

    if bars.is_empty() {
        return Err(EngineError::DataInsufficient(format!(
            "{} raw bars are not enough to warm up indicators (need more than {})",
            raw_bars.len(),
            warmup_len(settings)
        )));
    }

    debug!(
        "Enriched {} bars, dropped {} warm-up bars",
        bars.len(),
        raw_bars.len() - bars.len()
    );
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn raw_bars(closes: &[f64]) -> Vec<RawBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| RawBar {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()
                    + Duration::minutes(15 * i as i64),
                open: *close,
                high: close + 1.0,
                low: close - 1.0,
                close: *close,
                volume: 1_000.0,
            })
            .collect()
    }

    fn settings(period: usize) -> IndicatorSettings {
        IndicatorSettings {
            sma_period: period,
            rsi_period: period,
            atr_period: period,
            std_dev_period: period,
        }
    }

    #[test]
    fn sma_is_undefined_until_window_fills() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(sma[0].is_nan() && sma[1].is_nan());
        assert!((sma[2] - 2.0).abs() < 1e-12);
        assert!((sma[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let rsi = calculate_rsi(&rising, 3);
        assert!(rsi[2].is_nan());
        assert_eq!(rsi[3], 100.0);
        assert_eq!(rsi[9], 100.0);

        let flat = vec![5.0; 6];
        assert_eq!(calculate_rsi(&flat, 3)[5], 50.0);
    }

    #[test]
    fn atr_uses_true_range() {
        let bars = raw_bars(&[10.0, 10.0, 10.0, 10.0]);
        let atr = calculate_atr(&bars, 2);
        assert!(atr[1].is_nan());
        assert!((atr[2] - 2.0).abs() < 1e-12);
        assert!((atr[3] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn std_dev_is_population_form() {
        let values = calculate_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!((values[7] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn enrich_drops_warmup_bars() {
        let closes: Vec<f64> = (0..12).map(|i| 100.0 + (i % 3) as f64).collect();
        let raw = raw_bars(&closes);
        let bars = enrich(&raw, &settings(4)).unwrap();

        assert_eq!(warmup_len(&settings(4)), 4);
        assert_eq!(bars.len(), 8);
        assert_eq!(bars[0].timestamp, raw[4].timestamp);
        assert!(bars.iter().all(|bar| bar.indicators_are_finite()));
    }

    #[test]
    fn enrich_is_causal() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let full = enrich(&raw_bars(&closes), &settings(5)).unwrap();
        let prefix = enrich(&raw_bars(&closes[..20]), &settings(5)).unwrap();
        for (a, b) in prefix.iter().zip(full.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn enrich_rejects_too_little_history() {
        let raw = raw_bars(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            enrich(&raw, &settings(5)),
            Err(EngineError::DataInsufficient(_))
        ));
    }
}
