pub mod backtest;
pub mod export_market_data;
pub mod leaderboard;
pub mod optimize;
pub mod randomize_config;
