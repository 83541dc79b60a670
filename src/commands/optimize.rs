use crate::config::SimulationConfig;
use crate::market_data::{ensure_market_data_file, load_bars};
use crate::optimizer::{print_results, OptimizationReport, OptimizeOptions, Optimizer};
use crate::results::ResultStore;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::path::Path;

pub fn run(
    config_file: &Path,
    data_file: &Path,
    results_dir: &Path,
    options: &OptimizeOptions,
    leaderboard_size: usize,
) -> Result<OptimizationReport> {
    info!(
        "Received optimize command: {} iterations, seed {}",
        options.iterations, options.seed
    );
    ensure_market_data_file(data_file)?;
    let base_config = SimulationConfig::load_from_file(config_file)?;
    let raw_bars = load_bars(data_file)?;

    let optimizer = Optimizer::new(base_config, raw_bars);
    let report = optimizer.run(options)?;
    if report.results.is_empty() {
        return Err(anyhow!(
            "All {} optimization runs failed; see warnings above",
            report.failed
        ));
    }
    if report.failed > 0 {
        warn!(
            "{} of {} runs failed and were skipped",
            report.failed, options.iterations
        );
    }

    let store = ResultStore::new(results_dir);
    let simulation_id = store.write_simulation(&report.results)?;
    let leaderboard = store.merge_into_leaderboard(&report.results, leaderboard_size)?;
    info!(
        "Simulation {} stored; leaderboard holds {} runs",
        simulation_id,
        leaderboard.len()
    );

    print_results(&report.results, options.top_n);
    Ok(report)
}
