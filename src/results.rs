use crate::config::SimulationConfig;
use crate::models::BacktestResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_RESULTS_DIR: &str = "backtest_results";
const LEADERBOARD_FILE: &str = "best_backtests.json";
const SIMULATION_ID_LEN: usize = 6;
const ID_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Compact record of a run kept on the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub strategy_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub profit: f64,
    pub total_trades: i32,
    pub win_rate: f64,
    pub max_drawdown_percent: f64,
    pub config: SimulationConfig,
    pub created_at: DateTime<Utc>,
}

impl From<&BacktestResult> for LeaderboardEntry {
    fn from(result: &BacktestResult) -> Self {
        Self {
            id: result.id.clone(),
            strategy_id: result.strategy_id.clone(),
            start_date: result.start_date,
            end_date: result.end_date,
            initial_balance: result.initial_balance,
            final_balance: result.final_balance,
            profit: result.profit,
            total_trades: result.performance.total_trades,
            win_rate: result.performance.win_rate,
            max_drawdown_percent: result.performance.max_drawdown_percent,
            config: result.config.clone(),
            created_at: result.created_at,
        }
    }
}

/// File-backed store for sweep outputs and the best-run leaderboard.
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn leaderboard_path(&self) -> PathBuf {
        self.root.join(LEADERBOARD_FILE)
    }

    pub fn simulation_path(&self, simulation_id: &str) -> PathBuf {
        self.root.join(format!("sim-{}.json", simulation_id))
    }

    /// Writes every result of a sweep to `sim-<id>.json` and returns the id.
    pub fn write_simulation(&self, results: &[BacktestResult]) -> Result<String> {
        let simulation_id = generate_simulation_id(&mut rand::thread_rng());
        let path = self.simulation_path(&simulation_id);
        write_json(&path, &results)?;
        info!(
            "Wrote {} results for simulation {} to {}",
            results.len(),
            simulation_id,
            path.display()
        );
        Ok(simulation_id)
    }

    pub fn load_simulation(&self, simulation_id: &str) -> Result<Vec<BacktestResult>> {
        let path = self.simulation_path(simulation_id);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open simulation file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid simulation JSON in {}", path.display()))
    }

    /// Reads the leaderboard. A missing or unreadable file yields an empty
    /// list.
    pub fn load_best_backtests(&self) -> Vec<LeaderboardEntry> {
        let path = self.leaderboard_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    "{} is missing or unreadable ({}); starting from an empty leaderboard",
                    path.display(),
                    err
                );
                return Vec::new();
            }
        };
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "{} is empty or contains invalid JSON ({}); starting from an empty leaderboard",
                    path.display(),
                    err
                );
                Vec::new()
            }
        }
    }

    pub fn add_to_top_results(&self, result: &BacktestResult) -> Result<()> {
        let mut entries = self.load_best_backtests();
        entries.push(LeaderboardEntry::from(result));
        write_json(&self.leaderboard_path(), &entries)
    }

    pub fn overwrite_top_results(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        write_json(&self.leaderboard_path(), &entries)
    }

    /// Merges `results` into the leaderboard, keeping the `capacity` most
    /// profitable runs. Returns the new leaderboard.
    pub fn merge_into_leaderboard(
        &self,
        results: &[BacktestResult],
        capacity: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let mut entries = self.load_best_backtests();
        entries.extend(results.iter().map(LeaderboardEntry::from));
        rank_by_profit(&mut entries);
        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(entry.id.clone()));
        entries.truncate(capacity);
        self.overwrite_top_results(&entries)?;
        Ok(entries)
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_DIR)
    }
}

/// Sorts entries by profit, best first. Non-finite profits sink to the end.
pub fn rank_by_profit(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| compare_profit(b.profit, a.profit));
}

pub(crate) fn compare_profit(a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => Ordering::Equal,
    }
}

/// Six ASCII letters, upper or lower case.
pub fn generate_simulation_id<R: Rng>(rng: &mut R) -> String {
    (0..SIMULATION_ID_LEN)
        .map(|_| ID_LETTERS[rng.gen_range(0..ID_LETTERS.len())] as char)
        .collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create results directory {}", parent.display())
            })?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("Unable to create results file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {} to disk", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyPerformance;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn temp_store() -> ResultStore {
        ResultStore::new(
            std::env::temp_dir().join(format!("replay-results-{}", uuid::Uuid::new_v4())),
        )
    }

    fn result(id: &str, profit: f64) -> BacktestResult {
        let start = Utc.with_ymd_and_hms(2024, 12, 11, 14, 30, 0).unwrap();
        BacktestResult {
            id: id.to_string(),
            strategy_id: "bearish_comeback".to_string(),
            start_date: start,
            end_date: start,
            initial_balance: 10_000.0,
            final_balance: 10_000.0 + profit,
            profit,
            performance: StrategyPerformance {
                total_trades: 1,
                winning_trades: if profit > 0.0 { 1 } else { 0 },
                losing_trades: if profit < 0.0 { 1 } else { 0 },
                win_rate: if profit > 0.0 { 1.0 } else { 0.0 },
                total_return: profit,
                total_return_percent: profit / 100.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
                max_drawdown_percent: 0.0,
                avg_trade_pnl: profit,
                avg_trade_pnl_percent: 0.0,
                median_trade_pnl: profit,
                avg_winning_pnl: 0.0,
                avg_losing_pnl: 0.0,
                best_trade: profit,
                worst_trade: profit,
                exposure_percent: 0.0,
            },
            entries: Vec::new(),
            exits: Vec::new(),
            stoploss_regions: Vec::new(),
            takeprofit_regions: Vec::new(),
            open_region: None,
            equity_curve: Vec::new(),
            trades: Vec::new(),
            config: SimulationConfig::default(),
            created_at: start,
        }
    }

    #[test]
    fn simulation_ids_are_six_letters() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let id = generate_simulation_id(&mut rng);
            assert_eq!(id.len(), 6);
            assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn write_and_reload_simulation() {
        let store = temp_store();
        let results = vec![result("a", 10.0), result("b", -5.0)];
        let sim_id = store.write_simulation(&results).unwrap();

        assert!(store.simulation_path(&sim_id).exists());
        let loaded = store.load_simulation(&sim_id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, "b");

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn missing_or_corrupt_leaderboard_loads_empty() {
        let store = temp_store();
        assert!(store.load_best_backtests().is_empty());

        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.leaderboard_path(), "{ not json").unwrap();
        assert!(store.load_best_backtests().is_empty());

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn add_appends_to_leaderboard() {
        let store = temp_store();
        store.add_to_top_results(&result("a", 1.0)).unwrap();
        store.add_to_top_results(&result("b", 2.0)).unwrap();

        let entries = store.load_best_backtests();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a");

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn merge_keeps_most_profitable() {
        let store = temp_store();
        store.add_to_top_results(&result("old", 50.0)).unwrap();

        let merged = store
            .merge_into_leaderboard(
                &[result("x", 10.0), result("y", 80.0), result("z", -3.0)],
                2,
            )
            .unwrap();
        let ids: Vec<&str> = merged.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "old"]);
        assert_eq!(store.load_best_backtests(), merged);

        store.overwrite_top_results(&[]).unwrap();
        assert!(store.load_best_backtests().is_empty());

        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn merge_drops_repeated_run_behind_equal_profit() {
        let store = temp_store();
        store
            .merge_into_leaderboard(&[result("x", 10.0), result("y", 10.0)], 5)
            .unwrap();

        let merged = store.merge_into_leaderboard(&[result("x", 10.0)], 5).unwrap();
        let ids: Vec<&str> = merged.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);

        let _ = fs::remove_dir_all(store.root());
    }
}
