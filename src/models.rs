use crate::config::SimulationConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV record as delivered by the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// A price bar enriched with the indicators the simulation consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub sma: f64,
    pub rsi: f64,
    pub atr: f64,
    pub std_dev: f64,
}

impl Bar {
    pub fn prices_are_finite(&self) -> bool {
        self.open.is_finite() && self.close.is_finite() && self.high.is_finite() && self.low.is_finite()
    }

    pub fn indicators_are_finite(&self) -> bool {
        self.sma.is_finite() && self.rsi.is_finite() && self.atr.is_finite() && self.std_dev.is_finite()
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Executed entry or exit. `amount` is the cash value of the fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    StopLoss,
    TakeProfit,
}

impl RegionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::StopLoss => "STOPLOSS",
            RegionKind::TakeProfit => "TAKEPROFIT",
        }
    }
}

/// Span of bars during which a stop-loss/take-profit envelope was armed.
/// `kind` is `None` only while the region is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRegion {
    pub kind: Option<RegionKind>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Completed round trip, derived from a BUY/SELL pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub amount: f64,
    pub shares: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub exit_kind: RegionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance_absolute: f64,
    pub uninvested_balance: f64,
    pub open_position_amount: f64,
    pub open_positions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPerformance {
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub win_rate: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub avg_trade_pnl: f64,
    pub avg_trade_pnl_percent: f64,
    pub median_trade_pnl: f64,
    pub avg_winning_pnl: f64,
    pub avg_losing_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    /// Share of bars that ended with a position open, in percent.
    pub exposure_percent: f64,
}

#[derive(Debug, Clone)]
pub struct DrawdownInfo {
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
}

/// Serializable summary of one run, consumed by reporting and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub strategy_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub profit: f64,
    pub performance: StrategyPerformance,
    pub entries: Vec<OrderEvent>,
    pub exits: Vec<OrderEvent>,
    pub stoploss_regions: Vec<EnvelopeRegion>,
    pub takeprofit_regions: Vec<EnvelopeRegion>,
    pub open_region: Option<EnvelopeRegion>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub config: SimulationConfig,
    pub created_at: DateTime<Utc>,
}

impl BacktestResult {
    /// Entries and exits merged in timestamp order, BUY before SELL on ties.
    pub fn order_events(&self) -> Vec<OrderEvent> {
        let mut events: Vec<OrderEvent> = self
            .entries
            .iter()
            .chain(self.exits.iter())
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| side_rank(a.side).cmp(&side_rank(b.side)))
        });
        events
    }
}

fn side_rank(side: OrderSide) -> u8 {
    match side {
        OrderSide::Buy => 0,
        OrderSide::Sell => 1,
    }
}

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub result: BacktestResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Hold,
}

/// Strategy decision for the last bar of a window. `price` and `amount` are
/// only meaningful for `SignalAction::Buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub action: SignalAction,
    pub price: f64,
    pub amount: f64,
}

pub fn generate_trade_id(strategy_id: &str, entry_time: DateTime<Utc>) -> String {
    format!("{}_{}", strategy_id, entry_time.format("%Y-%m-%dT%H:%M"))
}
