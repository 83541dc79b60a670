use crate::account::{Account, SaleProceeds};
use crate::config::SimulationConfig;
use crate::envelope::ExitEnvelope;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::performance::PerformanceCalculator;
use crate::strategy::Strategy;
use crate::trading_rules::{self, RiskPayload};
use chrono::Utc;
use log::{debug, warn};
use uuid::Uuid;

#[derive(Debug, PartialEq)]
enum EntrySignalOutcome {
    Executed,
    Skipped {
        reason: &'static str,
        details: Option<String>,
    },
}

/// Everything one run mutates. Owned by `Engine::backtest` for the duration
/// of the walk and dropped with it.
struct SimulationState {
    account: Account,
    envelope: ExitEnvelope,
    entries: Vec<OrderEvent>,
    exits: Vec<OrderEvent>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
}

impl SimulationState {
    fn new(config: &SimulationConfig, capacity: usize) -> Self {
        Self {
            account: Account::new(config.account.initial_balance),
            envelope: ExitEnvelope::new(
                config.multipliers.stoploss_atr_multiplier,
                config.multipliers.takeprofit_atr_multiplier,
            ),
            entries: Vec::new(),
            exits: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(capacity),
        }
    }

    fn record_equity(&mut self, bar: &Bar) {
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            balance_absolute: self.account.balance_absolute(),
            uninvested_balance: self.account.uninvested_balance(),
            open_position_amount: self.account.open_position_amount(),
            open_positions: self.account.open_positions(),
        });
    }
}

/// Replays enriched bars through a strategy for a single account.
pub struct Engine {
    config: SimulationConfig,
}

impl Engine {
    pub fn new(config: SimulationConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn backtest(&self, strategy: &dyn Strategy, bars: &[Bar]) -> EngineResult<BacktestRun> {
        let window_len = strategy.window_len().max(1);
        validate_bars(bars, strategy.get_min_data_points().max(window_len))?;
        let period = window_len - 1;
        let strategy_id = strategy.get_template_id().to_string();
        let requested_amount = self.config.requested_order_amount();

        let mut state = SimulationState::new(&self.config, bars.len());

        // Warm-up bars are never evaluated; the account is untouched.
        for bar in &bars[..period] {
            state.record_equity(bar);
        }

        for i in period..bars.len() {
            let bar = &bars[i];

            let validation = {
                let payload = RiskPayload::new(&state.account, requested_amount);
                trading_rules::validate(&payload, &self.config.account)
            };

            if validation.can_buy() {
                let window = &bars[i - period..=i];
                let signal = strategy.generate_signal(window);
                if signal.action == SignalAction::Buy {
                    if let EntrySignalOutcome::Skipped { reason, details } =
                        self.execute_buy_signal(&mut state, bar, &signal)?
                    {
                        warn!(
                            "Skipped {} entry at {}: {}{}",
                            strategy_id,
                            bar.timestamp,
                            reason,
                            details.map(|d| format!(" ({})", d)).unwrap_or_default()
                        );
                    }
                }
            }

            if state.envelope.is_active() {
                self.check_exit(&mut state, bar, &strategy_id)?;
            }

            state.account.mark_to_market(bar.close)?;
            state.record_equity(bar);
        }

        debug!(
            "{} run closed {} envelope regions",
            strategy_id,
            state.envelope.regions().len()
        );
        if state.account.open_positions() > 0 {
            debug!(
                "{} run ended with an open position valued at {:.2}",
                strategy_id,
                state.account.open_position_amount()
            );
        }

        Ok(BacktestRun {
            result: self.build_result(state, &strategy_id, bars),
        })
    }

    fn execute_buy_signal(
        &self,
        state: &mut SimulationState,
        bar: &Bar,
        signal: &StrategySignal,
    ) -> EngineResult<EntrySignalOutcome> {
        if !signal.price.is_finite() || signal.price <= 0.0 {
            return Ok(EntrySignalOutcome::Skipped {
                reason: "invalid fill price",
                details: Some(format!("price {}", signal.price)),
            });
        }

        let clamped = {
            let payload = RiskPayload::new(&state.account, signal.amount);
            trading_rules::clamp_order(signal.amount, &payload, &self.config.account)
        };
        if !clamped.valid {
            return Ok(EntrySignalOutcome::Skipped {
                reason: "order size not positive after clamping",
                details: Some(format!("suggested {:.4}", signal.amount)),
            });
        }

        let position = state
            .account
            .apply_buy(bar.timestamp, clamped.amount, signal.price)?;
        state.entries.push(OrderEvent {
            timestamp: bar.timestamp,
            side: OrderSide::Buy,
            price: signal.price,
            amount: clamped.amount,
        });
        state
            .envelope
            .update(signal.price, bar.atr, bar.timestamp)?;

        debug!(
            "BUY {:.4} shares at {:.4} on {} (amount {:.2})",
            position.shares, signal.price, bar.timestamp, clamped.amount
        );
        Ok(EntrySignalOutcome::Executed)
    }

    fn check_exit(
        &self,
        state: &mut SimulationState,
        bar: &Bar,
        strategy_id: &str,
    ) -> EngineResult<()> {
        let trigger = match state.envelope.exit(bar)? {
            Some(trigger) => trigger,
            None => return Ok(()),
        };

        let proceeds = state.account.apply_sell(bar.timestamp, trigger.price)?;
        state.exits.push(OrderEvent {
            timestamp: bar.timestamp,
            side: OrderSide::Sell,
            price: trigger.price,
            amount: proceeds.amount,
        });
        state.envelope.remove(bar.timestamp, trigger.kind)?;

        let trade = build_trade(strategy_id, &proceeds, trigger.price, trigger.kind);
        debug!(
            "SELL ({}) at {:.4} on {}: pnl {:.2}",
            trigger.kind.as_str(),
            trigger.price,
            bar.timestamp,
            trade.pnl
        );
        state.trades.push(trade);
        Ok(())
    }

    fn build_result(
        &self,
        state: SimulationState,
        strategy_id: &str,
        bars: &[Bar],
    ) -> BacktestResult {
        let SimulationState {
            account,
            envelope,
            entries,
            exits,
            trades,
            equity_curve,
        } = state;

        let initial_balance = account.initial_balance();
        let final_balance = account.balance_absolute();
        let performance = PerformanceCalculator::calculate_performance(
            &trades,
            initial_balance,
            final_balance,
            &equity_curve,
        );

        BacktestResult {
            id: Uuid::new_v4().to_string(),
            strategy_id: strategy_id.to_string(),
            start_date: bars[0].timestamp,
            end_date: bars[bars.len() - 1].timestamp,
            initial_balance,
            final_balance,
            profit: account.profit(),
            performance,
            entries,
            exits,
            stoploss_regions: envelope.stoploss_regions(),
            takeprofit_regions: envelope.takeprofit_regions(),
            open_region: envelope.open_region(),
            equity_curve,
            trades,
            config: self.config.clone(),
            created_at: Utc::now(),
        }
    }
}

fn build_trade(
    strategy_id: &str,
    proceeds: &SaleProceeds,
    exit_price: f64,
    exit_kind: RegionKind,
) -> Trade {
    let entry = &proceeds.position;
    let pnl = proceeds.amount - entry.entry_amount;
    let pnl_percent = if entry.entry_amount > 0.0 {
        pnl / entry.entry_amount * 100.0
    } else {
        0.0
    };
    Trade {
        id: generate_trade_id(strategy_id, entry.opened_at),
        entry_time: entry.opened_at,
        entry_price: entry.entry_price,
        exit_time: proceeds.closed_at,
        exit_price,
        amount: entry.entry_amount,
        shares: proceeds.shares,
        pnl,
        pnl_percent,
        exit_kind,
    }
}

/// Rejects input the walk cannot replay faithfully.
pub fn validate_bars(bars: &[Bar], window_len: usize) -> EngineResult<()> {
    if bars.len() < window_len.max(1) {
        return Err(EngineError::DataInsufficient(format!(
            "need at least {} bars, got {}",
            window_len.max(1),
            bars.len()
        )));
    }
    for (index, bar) in bars.iter().enumerate() {
        if !bar.prices_are_finite() {
            return Err(EngineError::DataInsufficient(format!(
                "bar {} at {} has non-finite prices",
                index, bar.timestamp
            )));
        }
        if !bar.indicators_are_finite() {
            return Err(EngineError::DataInsufficient(format!(
                "bar {} at {} has missing or non-finite indicators",
                index, bar.timestamp
            )));
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(EngineError::DataInsufficient(format!(
                "timestamps not strictly ascending at bar {} ({} after {})",
                index,
                bar.timestamp,
                bars[index - 1].timestamp
            )));
        }
    }
    Ok(())
}
