use thiserror::Error;

/// Failures raised by a single simulation run.
///
/// Every variant is local to one run. `InsufficientFunds`, `EnvelopeState`
/// and `LedgerInvariant` indicate an internal consistency bug when they
/// surface from `Engine::backtest`; callers should treat them as fatal for
/// that run rather than retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("insufficient funds: requested {requested:.2}, available {available:.2}")]
    InsufficientFunds { requested: f64, available: f64 },

    #[error("exit envelope misuse: {0}")]
    EnvelopeState(String),

    #[error("insufficient or malformed input data: {0}")]
    DataInsufficient(String),

    #[error("account ledger invariant violated: {0}")]
    LedgerInvariant(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("a position is already open")]
    PositionAlreadyOpen,

    #[error("no open position to sell")]
    NoOpenPosition,

    #[error("unknown strategy template: {0}")]
    UnknownStrategy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
