//! Domain error types.

/// Failure reported by a strategy lifecycle method.
///
/// A panic inside `initialize`, `on_market_data` or `cleanup` is caught by the
/// lifecycle manager and converted into one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for StrategyError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for StrategyError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<SimError> for StrategyError {
    fn from(err: SimError) -> Self {
        Self::new(err.to_string())
    }
}

/// Failure reported by a signal function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct SignalError {
    pub reason: String,
}

impl SignalError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Top-level error type for barreplay.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("strategy '{id}' is already registered")]
    DuplicateStrategy { id: String },

    #[error("unknown strategy '{id}'")]
    UnknownStrategy { id: String },

    #[error("strategy '{id}' failed to initialize: {reason}")]
    StrategyInitialization { id: String, reason: String },

    #[error("signal '{name}' is already registered")]
    DuplicateSignal { name: String },

    #[error("unknown signal '{name}'")]
    UnknownSignal { name: String },

    #[error("signal '{name}' failed: {reason}")]
    Signal { name: String, reason: String },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("invalid run state: {reason}")]
    RunState { reason: String },

    #[error("run {run_id} aborted: {reason}")]
    RunAborted { run_id: String, reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. }
            | SimError::ConfigMissing { .. }
            | SimError::ConfigInvalid { .. } => 2,
            SimError::Database { .. } | SimError::DatabaseQuery { .. } => 3,
            SimError::DuplicateStrategy { .. }
            | SimError::UnknownStrategy { .. }
            | SimError::StrategyInitialization { .. }
            | SimError::RunState { .. }
            | SimError::RunAborted { .. } => 4,
            SimError::NoData { .. } => 5,
            SimError::DuplicateSignal { .. }
            | SimError::UnknownSignal { .. }
            | SimError::Signal { .. }
            | SimError::OrderRejected { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
