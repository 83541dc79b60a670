use crate::config::SimulationConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::*;

/// Entry-signal generator evaluated once per bar on a trailing window.
///
/// `generate_signal` receives exactly the bars up to and including the
/// decision bar; implementations must not keep state between calls.
pub trait Strategy {
    fn get_template_id(&self) -> &str;
    /// Number of bars in the trailing window, decision bar included.
    fn window_len(&self) -> usize;
    fn generate_signal(&self, window: &[Bar]) -> StrategySignal;
    /// Bars required before a run can start.
    fn get_min_data_points(&self) -> usize {
        self.window_len()
    }
}

#[path = "strategies/bearish_comeback.rs"]
pub mod bearish_comeback;

pub use bearish_comeback::BearishComebackStrategy;

pub fn create_strategy(
    template_id: &str,
    config: &SimulationConfig,
) -> EngineResult<Box<dyn Strategy + Send + Sync>> {
    match template_id {
        "bearish_comeback" => Ok(Box::new(BearishComebackStrategy::new(
            &config.strategy1,
            config.account.base_order_value,
        )?)),
        _ => Err(EngineError::UnknownStrategy(template_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_known_templates() {
        let config = SimulationConfig::default();
        let strategy = create_strategy("bearish_comeback", &config).unwrap();
        assert_eq!(strategy.get_template_id(), "bearish_comeback");
        assert_eq!(strategy.window_len(), config.strategy1.period + 1);
    }

    #[test]
    fn registry_rejects_unknown_templates() {
        let config = SimulationConfig::default();
        assert!(matches!(
            create_strategy("lightning", &config),
            Err(EngineError::UnknownStrategy(id)) if id == "lightning"
        ));
    }
}
