use crate::error::{EngineError, EngineResult};
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const DEFAULT_STRATEGY_TEMPLATE: &str = "bearish_comeback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub strategy: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            strategy: DEFAULT_STRATEGY_TEMPLATE.to_string(),
        }
    }
}

/// Sizing and capacity limits for the simulated account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub initial_balance: f64,
    pub max_order_value: f64,
    pub max_concurrent_positions: u32,
    pub base_order_value: f64,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            max_order_value: 5_000.0,
            max_concurrent_positions: 1,
            base_order_value: 1_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Multipliers {
    pub buy_multiplier: f64,
    /// Carried for the charting collaborator; the simulation never reads it.
    #[serde(default = "default_band_multiplier")]
    pub band_multiplier: f64,
    pub stoploss_atr_multiplier: f64,
    pub takeprofit_atr_multiplier: f64,
}

fn default_band_multiplier() -> f64 {
    1.5
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            buy_multiplier: 1.0,
            band_multiplier: default_band_multiplier(),
            stoploss_atr_multiplier: 1.5,
            takeprofit_atr_multiplier: 3.0,
        }
    }
}

/// Constants of the bearish-comeback threshold `A - B * ln(period + 1)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearishComebackSettings {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(default = "default_strategy_period")]
    pub period: usize,
}

fn default_strategy_period() -> usize {
    7
}

impl Default for BearishComebackSettings {
    fn default() -> Self {
        Self {
            a: 3.6,
            b: 1.45,
            period: default_strategy_period(),
        }
    }
}

/// Look-back periods used when enriching raw bars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSettings {
    pub sma_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub std_dev_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            sma_period: 20,
            rsi_period: 14,
            atr_period: 14,
            std_dev_period: 20,
        }
    }
}

/// Immutable parameter snapshot for one simulation run.
///
/// Mirrors the `config.json` layout (`account.*`, `multipliers.*`,
/// `strategy1.*`, `indicators.*`). Components receive it at construction and
/// never reload it mid-run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    pub account: AccountSettings,
    pub multipliers: Multipliers,
    pub strategy1: BearishComebackSettings,
    #[serde(default)]
    pub indicators: IndicatorSettings,
}

impl SimulationConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open configuration at {}", path.display()))?;
        let config: SimulationConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid configuration JSON in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Configuration {} rejected", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create configuration directory {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Unable to create configuration at {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .context("Failed to serialize configuration")?;
        writer
            .flush()
            .context("Failed to flush configuration to disk")?;
        Ok(())
    }

    /// Order size the risk gate evaluates before a signal is known.
    pub fn requested_order_amount(&self) -> f64 {
        self.account.base_order_value * self.multipliers.buy_multiplier
    }

    pub fn validate(&self) -> EngineResult<()> {
        let account = &self.account;
        require_f64(
            "account.initialBalance",
            account.initial_balance,
            Some(f64::MIN_POSITIVE),
            None,
        )?;
        require_f64("account.maxOrderValue", account.max_order_value, Some(0.0), None)?;
        require_f64("account.baseOrderValue", account.base_order_value, Some(0.0), None)?;
        // Single-lot model: the envelope and ledger track one position at most.
        if account.max_concurrent_positions > 1 {
            return Err(EngineError::InvalidConfig(format!(
                "Setting account.maxConcurrentPositions must be 0 or 1 (value: {})",
                account.max_concurrent_positions
            )));
        }

        let multipliers = &self.multipliers;
        require_f64(
            "multipliers.buyMultiplier",
            multipliers.buy_multiplier,
            Some(0.0),
            None,
        )?;
        require_f64(
            "multipliers.bandMultiplier",
            multipliers.band_multiplier,
            Some(0.0),
            None,
        )?;
        require_f64(
            "multipliers.stoplossAtrMultiplier",
            multipliers.stoploss_atr_multiplier,
            Some(0.0),
            None,
        )?;
        require_f64(
            "multipliers.takeprofitAtrMultiplier",
            multipliers.takeprofit_atr_multiplier,
            Some(0.0),
            None,
        )?;

        require_f64("strategy1.A", self.strategy1.a, None, None)?;
        require_f64("strategy1.B", self.strategy1.b, None, None)?;
        require_usize("strategy1.period", self.strategy1.period, 1)?;

        let indicators = &self.indicators;
        require_usize("indicators.smaPeriod", indicators.sma_period, 1)?;
        require_usize("indicators.rsiPeriod", indicators.rsi_period, 1)?;
        require_usize("indicators.atrPeriod", indicators.atr_period, 1)?;
        require_usize("indicators.stdDevPeriod", indicators.std_dev_period, 1)?;

        if self.general.strategy.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "Setting general.strategy must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Draws a fresh set of tunable parameters, keeping the account's initial
    /// balance, base order value and capacity untouched.
    pub fn randomise<R: Rng>(&mut self, rng: &mut R) {
        let initial_balance = self.account.initial_balance;

        self.indicators.rsi_period = rng.gen_range(10..=20);
        self.indicators.atr_period = rng.gen_range(15..=25);
        let low = (0.2 * initial_balance) as i64;
        let high = ((0.8 * initial_balance) as i64).max(low);
        self.account.max_order_value = rng.gen_range(low..=high) as f64;
        self.multipliers.buy_multiplier = rng.gen_range(1.0..3.0);
        self.multipliers.band_multiplier = rng.gen_range(1.0..2.0);
        self.strategy1.a = round2(rng.gen_range(3.4..3.8));
        self.strategy1.b = round2(rng.gen_range(1.2..1.7));
        self.multipliers.stoploss_atr_multiplier = round2(rng.gen_range(1.25..2.25));
        self.multipliers.takeprofit_atr_multiplier = round2(rng.gen_range(2.5..3.5));
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn require_f64(key: &str, value: f64, min: Option<f64>, max: Option<f64>) -> EngineResult<()> {
    if !value.is_finite() {
        return Err(EngineError::InvalidConfig(format!(
            "Setting {} must be finite (value: {})",
            key, value
        )));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(EngineError::InvalidConfig(format!(
                "Setting {} must be >= {} (value: {})",
                key, min_value, value
            )));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(EngineError::InvalidConfig(format!(
                "Setting {} must be <= {} (value: {})",
                key, max_value, value
            )));
        }
    }
    Ok(())
}

fn require_usize(key: &str, value: usize, min: usize) -> EngineResult<()> {
    if value < min {
        return Err(EngineError::InvalidConfig(format!(
            "Setting {} must be >= {} (value: {})",
            key, min, value
        )));
    }
    Ok(())
}
