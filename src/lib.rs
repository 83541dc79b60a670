pub mod account;
pub mod commands;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod models;
pub mod optimizer;
pub mod performance;
pub mod results;
pub mod strategy;
pub mod strategy_utils;
pub mod trading_rules;
