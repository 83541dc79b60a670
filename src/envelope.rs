use crate::error::{EngineError, EngineResult};
use crate::models::{Bar, EnvelopeRegion, RegionKind};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub kind: RegionKind,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum EnvelopeState {
    Inactive,
    Active {
        entry_price: f64,
        lower_bound: f64,
        upper_bound: f64,
        region_start: DateTime<Utc>,
    },
}

/// Stop-loss / take-profit bounds around the open position.
///
/// Bounds are fixed when the position opens and never trail. Every
/// activation produces one region, closed with the kind of the bound that
/// fired.
#[derive(Debug, Clone)]
pub struct ExitEnvelope {
    stoploss_atr_multiplier: f64,
    takeprofit_atr_multiplier: f64,
    state: EnvelopeState,
    regions: Vec<EnvelopeRegion>,
}

impl ExitEnvelope {
    pub fn new(stoploss_atr_multiplier: f64, takeprofit_atr_multiplier: f64) -> Self {
        Self {
            stoploss_atr_multiplier,
            takeprofit_atr_multiplier,
            state: EnvelopeState::Inactive,
            regions: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, EnvelopeState::Active { .. })
    }

    /// `(lower, upper)` while active.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self.state {
            EnvelopeState::Active {
                lower_bound,
                upper_bound,
                ..
            } => Some((lower_bound, upper_bound)),
            EnvelopeState::Inactive => None,
        }
    }

    /// Arms the envelope around a fresh entry.
    pub fn update(&mut self, entry_price: f64, atr: f64, timestamp: DateTime<Utc>) -> EngineResult<()> {
        if self.is_active() {
            return Err(EngineError::EnvelopeState(format!(
                "update at {} while an envelope is already active",
                timestamp
            )));
        }
        if !entry_price.is_finite() || !atr.is_finite() {
            return Err(EngineError::EnvelopeState(format!(
                "non-finite entry price {} or ATR {} at {}",
                entry_price, atr, timestamp
            )));
        }
        self.state = EnvelopeState::Active {
            entry_price,
            lower_bound: entry_price - atr * self.stoploss_atr_multiplier,
            upper_bound: entry_price + atr * self.takeprofit_atr_multiplier,
            region_start: timestamp,
        };
        Ok(())
    }

    /// Checks `bar` against the armed bounds. Stop-loss wins when both fire.
    pub fn exit(&self, bar: &Bar) -> EngineResult<Option<ExitTrigger>> {
        let (lower, upper) = self.bounds().ok_or_else(|| {
            EngineError::EnvelopeState(format!("exit check at {} with no active envelope", bar.timestamp))
        })?;

        if bar.low <= lower {
            return Ok(Some(ExitTrigger {
                kind: RegionKind::StopLoss,
                price: lower,
            }));
        }
        if bar.high >= upper {
            return Ok(Some(ExitTrigger {
                kind: RegionKind::TakeProfit,
                price: upper,
            }));
        }
        Ok(None)
    }

    /// Disarms the envelope and closes its region.
    pub fn remove(&mut self, timestamp: DateTime<Utc>, kind: RegionKind) -> EngineResult<&EnvelopeRegion> {
        let region = match std::mem::replace(&mut self.state, EnvelopeState::Inactive) {
            EnvelopeState::Active {
                entry_price,
                lower_bound,
                upper_bound,
                region_start,
            } => EnvelopeRegion {
                kind: Some(kind),
                start: region_start,
                end: Some(timestamp),
                entry_price,
                lower_bound,
                upper_bound,
            },
            EnvelopeState::Inactive => {
                return Err(EngineError::EnvelopeState(format!(
                    "remove at {} with no active envelope",
                    timestamp
                )))
            }
        };
        self.regions.push(region);
        Ok(&self.regions[self.regions.len() - 1])
    }

    pub fn regions(&self) -> &[EnvelopeRegion] {
        &self.regions
    }

    pub fn stoploss_regions(&self) -> Vec<EnvelopeRegion> {
        self.regions_of(RegionKind::StopLoss)
    }

    pub fn takeprofit_regions(&self) -> Vec<EnvelopeRegion> {
        self.regions_of(RegionKind::TakeProfit)
    }

    fn regions_of(&self, kind: RegionKind) -> Vec<EnvelopeRegion> {
        self.regions
            .iter()
            .filter(|region| region.kind == Some(kind))
            .cloned()
            .collect()
    }

    /// The armed region, if a position is still open.
    pub fn open_region(&self) -> Option<EnvelopeRegion> {
        match self.state {
            EnvelopeState::Active {
                entry_price,
                lower_bound,
                upper_bound,
                region_start,
            } => Some(EnvelopeRegion {
                kind: None,
                start: region_start,
                end: None,
                entry_price,
                lower_bound,
                upper_bound,
            }),
            EnvelopeState::Inactive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 11, 14, 30, 0).unwrap() + Duration::minutes(15 * offset)
    }

    fn bar(offset: i64, high: f64, low: f64) -> Bar {
        Bar {
            timestamp: at(offset),
            open: 100.0,
            close: 100.0,
            high,
            low,
            sma: 100.0,
            rsi: 50.0,
            atr: 5.0,
            std_dev: 1.0,
        }
    }

    fn armed() -> ExitEnvelope {
        let mut envelope = ExitEnvelope::new(1.5, 3.0);
        envelope.update(100.0, 5.0, at(0)).unwrap();
        envelope
    }

    #[test]
    fn update_sets_atr_bounds() {
        let envelope = armed();
        let (lower, upper) = envelope.bounds().unwrap();
        assert!((lower - 92.5).abs() < 1e-12);
        assert!((upper - 115.0).abs() < 1e-12);
    }

    #[test]
    fn low_through_lower_bound_fills_stoploss_at_bound() {
        let envelope = armed();
        let trigger = envelope.exit(&bar(1, 101.0, 92.0)).unwrap().unwrap();
        assert_eq!(trigger.kind, RegionKind::StopLoss);
        assert!((trigger.price - 92.5).abs() < 1e-12);
    }

    #[test]
    fn high_through_upper_bound_fills_takeprofit_at_bound() {
        let envelope = armed();
        let trigger = envelope.exit(&bar(1, 116.0, 99.0)).unwrap().unwrap();
        assert_eq!(trigger.kind, RegionKind::TakeProfit);
        assert!((trigger.price - 115.0).abs() < 1e-12);
    }

    #[test]
    fn stoploss_wins_when_both_bounds_breach() {
        let envelope = armed();
        let trigger = envelope.exit(&bar(1, 120.0, 90.0)).unwrap().unwrap();
        assert_eq!(trigger.kind, RegionKind::StopLoss);
    }

    #[test]
    fn bar_inside_bounds_does_not_trigger() {
        let envelope = armed();
        assert!(envelope.exit(&bar(1, 114.9, 92.6)).unwrap().is_none());
    }

    #[test]
    fn remove_closes_region_with_kind() {
        let mut envelope = armed();
        let region = envelope.remove(at(3), RegionKind::TakeProfit).unwrap().clone();
        assert_eq!(region.kind, Some(RegionKind::TakeProfit));
        assert_eq!(region.start, at(0));
        assert_eq!(region.end, Some(at(3)));
        assert!(!envelope.is_active());
        assert_eq!(envelope.takeprofit_regions().len(), 1);
        assert!(envelope.stoploss_regions().is_empty());
        assert!(envelope.open_region().is_none());
    }

    #[test]
    fn regions_are_kept_in_closing_order() {
        let mut envelope = armed();
        envelope.remove(at(2), RegionKind::StopLoss).unwrap();
        envelope.update(95.0, 2.0, at(4)).unwrap();
        envelope.remove(at(6), RegionKind::TakeProfit).unwrap();

        let kinds: Vec<_> = envelope.regions().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![Some(RegionKind::StopLoss), Some(RegionKind::TakeProfit)]);
        assert_eq!(envelope.regions()[1].start, at(4));
        assert!((envelope.regions()[1].lower_bound - 92.0).abs() < 1e-12);
    }

    #[test]
    fn misuse_is_reported() {
        let mut envelope = ExitEnvelope::new(1.5, 3.0);
        assert!(matches!(
            envelope.exit(&bar(0, 101.0, 99.0)),
            Err(EngineError::EnvelopeState(_))
        ));
        assert!(matches!(
            envelope.remove(at(0), RegionKind::StopLoss),
            Err(EngineError::EnvelopeState(_))
        ));

        envelope.update(100.0, 5.0, at(0)).unwrap();
        assert!(matches!(
            envelope.update(101.0, 5.0, at(1)),
            Err(EngineError::EnvelopeState(_))
        ));
        assert!(envelope.open_region().is_some());
    }
}
