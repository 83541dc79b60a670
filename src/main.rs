use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use replay_engine::{
    commands::{backtest, export_market_data, leaderboard, optimize, randomize_config},
    optimizer::OptimizeOptions,
    results::DEFAULT_RESULTS_DIR,
};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_MARKET_DATA_FILE: &str = "data/bars.json";
const DEFAULT_SNAPSHOT_FILE: &str = "data/market-data.bin";
const DEFAULT_LEADERBOARD_SIZE: usize = 20;

#[derive(Parser)]
#[command(name = "replay-engine")]
#[command(about = "Replays historical bars through a rule-gated trading strategy")]
struct Cli {
    /// Path to the simulation configuration
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Directory holding simulation files and the leaderboard
    #[arg(long = "results-dir", value_name = "PATH", global = true)]
    results_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest with the configured parameters
    Backtest {
        /// Path to the market data file (.json or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Write the full result as JSON to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Append the run to the leaderboard
        #[arg(long)]
        record: bool,
    },
    /// Random-search the tunable parameters and update the leaderboard
    Optimize {
        /// Path to the market data file (.json or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Number of randomised configurations to evaluate
        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: usize,
        /// Base seed; iteration i uses seed + i
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of runs to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Number of runs kept on the leaderboard
        #[arg(long = "leaderboard-size", default_value_t = DEFAULT_LEADERBOARD_SIZE)]
        leaderboard_size: usize,
    },
    /// Print the best stored runs
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Draw fresh tunable parameters into the configuration file
    RandomizeConfig {
        /// Write to this file instead of overwriting the configuration
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Convert a JSON bar file into a binary market data snapshot
    ExportMarketData {
        /// Source JSON bar file
        #[arg(short, long = "input", value_name = "PATH")]
        input: Option<PathBuf>,
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Cli {
        config,
        results_dir,
        command,
    } = cli;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting replay engine. Simulated results are not a forecast of live performance.");

    let config_file = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let results_dir = results_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR));

    match command {
        Commands::Backtest {
            data_file,
            output,
            record,
        } => {
            let data_file = resolve_market_data_path(data_file);
            backtest::run(backtest::BacktestArgs {
                config_file: &config_file,
                data_file: &data_file,
                output: output.as_deref(),
                results_dir: &results_dir,
                record_in_leaderboard: record,
            })?;
        }
        Commands::Optimize {
            data_file,
            iterations,
            seed,
            top,
            leaderboard_size,
        } => {
            let data_file = resolve_market_data_path(data_file);
            let options = OptimizeOptions {
                iterations,
                seed,
                top_n: top,
                show_progress: true,
            };
            optimize::run(
                &config_file,
                &data_file,
                &results_dir,
                &options,
                leaderboard_size,
            )?;
        }
        Commands::Leaderboard { top } => {
            leaderboard::run(&results_dir, top)?;
        }
        Commands::RandomizeConfig { output, seed } => {
            randomize_config::run(&config_file, output.as_deref(), seed)?;
        }
        Commands::ExportMarketData { input, output } => {
            let input_path = resolve_market_data_path(input);
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_FILE));
            export_market_data::run(&input_path, &output_path)?;
        }
    }

    Ok(())
}

fn resolve_market_data_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }

    PathBuf::from(DEFAULT_MARKET_DATA_FILE)
}
