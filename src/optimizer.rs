use crate::config::SimulationConfig;
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::indicators;
use crate::models::{BacktestResult, RawBar};
use crate::results::compare_profit;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    pub iterations: usize,
    pub seed: u64,
    pub top_n: usize,
    pub show_progress: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            iterations: 100,
            seed: 42,
            top_n: 10,
            show_progress: true,
        }
    }
}

struct BacktestTask {
    id: usize,
    config: SimulationConfig,
}

struct BacktestTaskResult {
    task_id: usize,
    result: Option<BacktestResult>,
    error: Option<String>,
}

#[derive(Debug)]
pub struct OptimizationReport {
    /// Successful runs, most profitable first.
    pub results: Vec<BacktestResult>,
    pub failed: usize,
}

impl OptimizationReport {
    pub fn top(&self, n: usize) -> &[BacktestResult] {
        &self.results[..n.min(self.results.len())]
    }
}

/// Random search over the tunable parameters of a base configuration.
pub struct Optimizer {
    base_config: SimulationConfig,
    raw_bars: Arc<Vec<RawBar>>,
}

impl Optimizer {
    pub fn new(base_config: SimulationConfig, raw_bars: Vec<RawBar>) -> Self {
        Self {
            base_config,
            raw_bars: Arc::new(raw_bars),
        }
    }

    /// Configuration for iteration `index`. Depends only on the base
    /// configuration, the seed and the index.
    pub fn variation(&self, seed: u64, index: usize) -> SimulationConfig {
        let mut config = self.base_config.clone();
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
        config.randomise(&mut rng);
        config
    }

    pub fn run(&self, options: &OptimizeOptions) -> Result<OptimizationReport> {
        let variation_count = options.iterations;
        if variation_count == 0 {
            return Ok(OptimizationReport {
                results: Vec::new(),
                failed: 0,
            });
        }
        info!("Running {} backtests...", variation_count);

        let num_workers = std::cmp::min(variation_count, std::cmp::max(1, num_cpus::get()));
        info!("Using {} worker threads", num_workers);

        let (tx, rx): (Sender<BacktestTask>, Receiver<BacktestTask>) = bounded(variation_count);
        let (result_tx, result_rx): (Sender<BacktestTaskResult>, Receiver<BacktestTaskResult>) =
            bounded(variation_count);

        let mut handles = Vec::new();
        for _worker_id in 0..num_workers {
            let rx = rx.clone();
            let result_tx = result_tx.clone();
            let raw_bars = Arc::clone(&self.raw_bars);

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    let start_time = Instant::now();
                    let result = Self::run_single_backtest(raw_bars.as_slice(), &task);
                    let duration = start_time.elapsed();

                    if let Some(backtest) = &result.result {
                        info!(
                            "Worker finished task {} in {:.2}s. Profit: ${:.2}, Trades: {}, Max DD: {:.2}%, A: {}, B: {}, SL: {}, TP: {}",
                            task.id,
                            duration.as_secs_f64(),
                            backtest.profit,
                            backtest.performance.total_trades,
                            backtest.performance.max_drawdown_percent,
                            task.config.strategy1.a,
                            task.config.strategy1.b,
                            task.config.multipliers.stoploss_atr_multiplier,
                            task.config.multipliers.takeprofit_atr_multiplier
                        );
                    } else if let Some(error) = &result.error {
                        warn!(
                            "Worker finished task {} in {:.2}s with error: {}",
                            task.id,
                            duration.as_secs_f64(),
                            error
                        );
                    }

                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        drop(result_tx);

        for i in 0..variation_count {
            let task = BacktestTask {
                id: i,
                config: self.variation(options.seed, i),
            };
            tx.send(task)?;
        }

        drop(tx);

        let mut results = Vec::new();
        let mut completed = 0;
        let mut failed = 0;
        let pb = if options.show_progress {
            ProgressBar::new(variation_count as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )?
                .progress_chars("#>-"),
        );

        while completed < variation_count {
            match result_rx.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(result) => {
                    completed += 1;
                    pb.set_position(completed as u64);

                    match result.result {
                        Some(backtest) => results.push((result.task_id, backtest)),
                        None => failed += 1,
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("Result channel closed unexpectedly. Some results may be lost.");
                    failed += variation_count - completed;
                    break;
                }
            }
        }

        if failed > 0 {
            warn!("Backtesting completed with {} failed runs", failed);
            pb.finish_with_message("Backtesting completed with errors");
        } else {
            pb.finish_with_message("Backtesting completed");
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("Optimizer worker thread panicked"))?;
        }

        // Task id breaks profit ties so the ranking is independent of
        // worker scheduling.
        results.sort_by(|(id_a, a), (id_b, b)| {
            compare_profit(b.profit, a.profit).then_with(|| id_a.cmp(id_b))
        });

        Ok(OptimizationReport {
            results: results.into_iter().map(|(_, result)| result).collect(),
            failed,
        })
    }

    fn run_single_backtest(raw_bars: &[RawBar], task: &BacktestTask) -> BacktestTaskResult {
        match Self::simulate(raw_bars, &task.config) {
            Ok(result) => BacktestTaskResult {
                task_id: task.id,
                result: Some(result),
                error: None,
            },
            Err(e) => BacktestTaskResult {
                task_id: task.id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn simulate(raw_bars: &[RawBar], config: &SimulationConfig) -> EngineResult<BacktestResult> {
        let strategy = create_strategy(&config.general.strategy, config)?;
        let bars = indicators::enrich(raw_bars, &config.indicators)?;
        let engine = Engine::new(config.clone())?;
        let run = engine.backtest(strategy.as_ref(), &bars)?;
        Ok(run.result)
    }
}

pub fn print_results(results: &[BacktestResult], top_n: usize) {
    println!(
        "\n=== TOP {} CONFIGURATIONS ===\n",
        std::cmp::min(top_n, results.len())
    );

    for (i, result) in results.iter().take(top_n).enumerate() {
        let performance = &result.performance;
        let config = &result.config;
        println!("Rank {}:", i + 1);
        println!("  Profit: ${:.2}", result.profit);
        println!("  Final Balance: ${:.2}", result.final_balance);
        println!("  Sharpe Ratio: {:.4}", performance.sharpe_ratio);
        println!(
            "  Max Drawdown: ${:.2} ({:.2}%)",
            performance.max_drawdown, performance.max_drawdown_percent
        );
        println!("  Win Rate: {:.2}%", performance.win_rate * 100.0);
        println!("  Total Trades: {}", performance.total_trades);
        println!("  Parameters:");
        println!("    A: {}", config.strategy1.a);
        println!("    B: {}", config.strategy1.b);
        println!("    maxOrderValue: {}", config.account.max_order_value);
        println!("    buyMultiplier: {:.4}", config.multipliers.buy_multiplier);
        println!(
            "    stoplossAtrMultiplier: {}",
            config.multipliers.stoploss_atr_multiplier
        );
        println!(
            "    takeprofitAtrMultiplier: {}",
            config.multipliers.takeprofit_atr_multiplier
        );
        println!("    rsiPeriod: {}", config.indicators.rsi_period);
        println!("    atrPeriod: {}", config.indicators.atr_period);
        println!();
    }
}
