//! Property tests for simulation invariants.
//!
//! 1. Causality: decisions up to bar k never depend on bars after k
//! 2. Conservation: the equity identity holds on every bar
//! 3. Single lot: at most one position is open at any time

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use replay_engine::config::SimulationConfig;
use replay_engine::engine::Engine;
use replay_engine::models::{BacktestResult, Bar, BacktestRun};
use replay_engine::strategy::create_strategy;

// ── Generators ───────────────────────────────────────────────────────

/// (open step, body, wick, std-dev) per bar.
fn arb_steps() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    prop::collection::vec(
        (-3.0..2.0_f64, -2.5..2.5_f64, 0.05..2.0_f64, 0.3..3.0_f64),
        12..80,
    )
}

fn build_bars(steps: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 12, 11, 14, 30, 0).unwrap();
    let mut open = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, (step, body, wick, std_dev))| {
            open = (open + step).max(5.0);
            let close = (open + body).max(1.0);
            Bar {
                timestamp: start + Duration::minutes(15 * i as i64),
                open,
                close,
                high: open.max(close) + wick,
                low: (open.min(close) - wick).max(0.5),
                sma: open,
                rsi: 50.0,
                atr: wick * 2.0 + 0.1,
                std_dev: *std_dev,
            }
        })
        .collect()
}

fn simulate(config: &SimulationConfig, bars: &[Bar]) -> BacktestResult {
    let strategy = create_strategy("bearish_comeback", config).unwrap();
    let engine = Engine::new(config.clone()).unwrap();
    let BacktestRun { result } = engine.backtest(strategy.as_ref(), bars).unwrap();
    result
}

fn loose_config() -> SimulationConfig {
    // Low threshold so generated series trade often.
    let mut config = SimulationConfig::default();
    config.strategy1.a = 1.0;
    config.strategy1.b = 0.2;
    config
}

// ── 1. Causality ─────────────────────────────────────────────────────

proptest! {
    /// Truncating the future leaves every earlier decision unchanged.
    #[test]
    fn prefix_runs_agree_with_full_run(steps in arb_steps(), cut in 0.0..1.0_f64) {
        let config = loose_config();
        let bars = build_bars(&steps);
        let window_len = config.strategy1.period + 1;
        let k = window_len + ((bars.len() - window_len) as f64 * cut) as usize;
        let k = k.min(bars.len());

        let full = simulate(&config, &bars);
        let prefix = simulate(&config, &bars[..k]);
        let horizon = bars[k - 1].timestamp;

        prop_assert_eq!(&prefix.equity_curve[..], &full.equity_curve[..k]);
        let full_entries: Vec<_> = full.entries.iter().filter(|e| e.timestamp <= horizon).cloned().collect();
        let full_exits: Vec<_> = full.exits.iter().filter(|e| e.timestamp <= horizon).cloned().collect();
        prop_assert_eq!(prefix.entries, full_entries);
        prop_assert_eq!(prefix.exits, full_exits);
    }

    /// Rewriting bars after k does not change what happened up to k.
    #[test]
    fn future_bars_do_not_leak(steps in arb_steps(), replacement in arb_steps()) {
        let config = loose_config();
        let bars = build_bars(&steps);
        let k = bars.len() / 2 + 1;
        prop_assume!(k >= config.strategy1.period + 1);

        let mut altered = bars[..k].to_vec();
        let tail = build_bars(&replacement);
        let step = Duration::minutes(15);
        for (offset, bar) in tail.into_iter().enumerate() {
            let mut bar = bar;
            bar.timestamp = bars[k - 1].timestamp + step * (offset as i32 + 1);
            altered.push(bar);
        }

        let original = simulate(&config, &bars);
        let rewritten = simulate(&config, &altered);
        prop_assert_eq!(&original.equity_curve[..k], &rewritten.equity_curve[..k]);
    }
}

// ── 2 & 3. Conservation and single lot ───────────────────────────────

proptest! {
    #[test]
    fn equity_identity_and_single_lot(steps in arb_steps(), buy_multiplier in 0.5..3.0_f64) {
        let mut config = loose_config();
        config.multipliers.buy_multiplier = buy_multiplier;
        let bars = build_bars(&steps);
        let result = simulate(&config, &bars);

        prop_assert_eq!(result.equity_curve.len(), bars.len());
        for point in &result.equity_curve {
            let expected = point.uninvested_balance + point.open_position_amount;
            prop_assert!((point.balance_absolute - expected).abs() <= 1e-6 * expected.abs().max(1.0));
            prop_assert!(point.uninvested_balance >= -1e-6);
            prop_assert!(point.open_positions <= 1);
        }

        prop_assert!(result.entries.len() == result.exits.len()
            || result.entries.len() == result.exits.len() + 1);
        for entry in &result.entries {
            prop_assert!(entry.amount > 0.0);
            prop_assert!(entry.amount <= config.account.max_order_value + 1e-9);
        }
        if result.open_region.is_none() {
            let realised: f64 = result.trades.iter().map(|t| t.pnl).sum();
            prop_assert!((result.final_balance - (result.initial_balance + realised)).abs() < 1e-6);
        }
    }
}
