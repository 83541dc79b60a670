use crate::config::SimulationConfig;
use crate::engine::Engine;
use crate::indicators;
use crate::market_data::{ensure_market_data_file, load_bars};
use crate::models::{BacktestResult, BacktestRun};
use crate::results::ResultStore;
use crate::strategy::create_strategy;
use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct BacktestArgs<'a> {
    pub config_file: &'a Path,
    pub data_file: &'a Path,
    pub output: Option<&'a Path>,
    pub results_dir: &'a Path,
    pub record_in_leaderboard: bool,
}

pub fn run(args: BacktestArgs) -> Result<BacktestResult> {
    ensure_market_data_file(args.data_file)?;
    let config = SimulationConfig::load_from_file(args.config_file)?;
    info!(
        "Running {} backtest with config {}",
        config.general.strategy,
        args.config_file.display()
    );

    let raw_bars = load_bars(args.data_file)?;
    let bars = indicators::enrich(&raw_bars, &config.indicators)
        .context("Failed to compute indicators")?;
    let strategy = create_strategy(&config.general.strategy, &config)?;
    let engine = Engine::new(config)?;
    let BacktestRun { result } = engine
        .backtest(strategy.as_ref(), &bars)
        .context("Backtest failed")?;

    print_summary(&result);

    if let Some(output) = args.output {
        let file = File::create(output)
            .with_context(|| format!("Unable to create result file {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &result)
            .context("Failed to serialize backtest result")?;
        writer.flush().context("Failed to flush backtest result")?;
        info!("Backtest result written to {}", output.display());
    }

    if args.record_in_leaderboard {
        let store = ResultStore::new(args.results_dir);
        store.add_to_top_results(&result)?;
        info!("Recorded run {} in {}", result.id, store.leaderboard_path().display());
    }

    Ok(result)
}

fn print_summary(result: &BacktestResult) {
    let performance = &result.performance;
    info!(
        "Backtest {} finished: {} -> {} ({} bars)",
        result.id,
        result.start_date.format("%Y-%m-%d %H:%M"),
        result.end_date.format("%Y-%m-%d %H:%M"),
        result.equity_curve.len()
    );
    info!(
        "Final balance ${:.2} (profit ${:.2}, {:.2}%), {} trades, win rate {:.2}%, max drawdown {:.2}%",
        result.final_balance,
        result.profit,
        performance.total_return_percent,
        performance.total_trades,
        performance.win_rate * 100.0,
        performance.max_drawdown_percent
    );
    info!(
        "Stop-loss exits: {}, take-profit exits: {}{}",
        result.stoploss_regions.len(),
        result.takeprofit_regions.len(),
        if result.open_region.is_some() {
            ", position still open"
        } else {
            ""
        }
    );
}
