use crate::config::SimulationConfig;
use anyhow::Result;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// Rewrites the tunable parameters of `config_file`, in place unless
/// `output` is given.
pub fn run(config_file: &Path, output: Option<&Path>, seed: Option<u64>) -> Result<SimulationConfig> {
    let mut config = SimulationConfig::load_from_file(config_file)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    config.randomise(&mut rng);

    let destination = output.unwrap_or(config_file);
    config.save_to_file(destination)?;
    info!(
        "Randomised configuration written to {} (A={}, B={}, SL={}, TP={})",
        destination.display(),
        config.strategy1.a,
        config.strategy1.b,
        config.multipliers.stoploss_atr_multiplier,
        config.multipliers.takeprofit_atr_multiplier
    );
    Ok(config)
}
