use crate::results::{rank_by_profit, LeaderboardEntry, ResultStore};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(results_dir: &Path, top: usize) -> Result<Vec<LeaderboardEntry>> {
    let store = ResultStore::new(results_dir);
    let mut entries = store.load_best_backtests();
    rank_by_profit(&mut entries);
    info!(
        "Leaderboard at {} holds {} runs",
        store.leaderboard_path().display(),
        entries.len()
    );

    for (i, entry) in entries.iter().take(top).enumerate() {
        println!(
            "{:>3}. {}  profit ${:>10.2}  trades {:>4}  win {:>6.2}%  maxDD {:>6.2}%  A={} B={} SL={} TP={}",
            i + 1,
            entry.id,
            entry.profit,
            entry.total_trades,
            entry.win_rate * 100.0,
            entry.max_drawdown_percent,
            entry.config.strategy1.a,
            entry.config.strategy1.b,
            entry.config.multipliers.stoploss_atr_multiplier,
            entry.config.multipliers.takeprofit_atr_multiplier
        );
    }

    entries.truncate(top);
    Ok(entries)
}
