//! Run configuration.
//!
//! Immutable once a run is built. `validate` rejects anything the engine
//! cannot run with; the builder calls it before touching data.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;

use super::error::SimError;

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub symbols: Vec<String>,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub max_positions: usize,
    pub enable_options: bool,
    pub enable_signals: bool,
    /// Take a performance snapshot every this many ticks.
    pub metrics_cadence: usize,
    pub risk_free_rate: f64,
    /// Number of bars handed to signal functions as look-back.
    pub signal_lookback: usize,
}

impl RunConfiguration {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, symbols: Vec<String>) -> Self {
        Self {
            name: "replay".to_string(),
            start_date,
            end_date,
            initial_capital: 100_000.0,
            symbols,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            max_positions: 10,
            enable_options: false,
            enable_signals: true,
            metrics_cadence: 20,
            risk_free_rate: 0.0,
            signal_lookback: 20,
        }
    }

    /// First instant of the window.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last instant of the window (end date is inclusive).
    pub fn window_end(&self) -> DateTime<Utc> {
        let end_of_day =
            NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        self.end_date.and_time(end_of_day).and_utc()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.start_date > self.end_date {
            return Err(invalid("start_date", "start_date must not be after end_date"));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital", "initial_capital must be positive"));
        }
        if self.symbols.is_empty() {
            return Err(SimError::ConfigMissing {
                section: "run".to_string(),
                key: "symbols".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(invalid("symbols", "symbols must not be blank"));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(invalid("symbols", &format!("duplicate symbol {symbol}")));
            }
        }
        if !non_negative(self.commission_per_trade) {
            return Err(invalid(
                "commission_per_trade",
                "commission_per_trade must be non-negative",
            ));
        }
        if !non_negative(self.commission_pct) {
            return Err(invalid("commission_pct", "commission_pct must be non-negative"));
        }
        if !non_negative(self.slippage_pct) {
            return Err(invalid("slippage_pct", "slippage_pct must be non-negative"));
        }
        if self.max_positions == 0 {
            return Err(invalid("max_positions", "max_positions must be at least 1"));
        }
        if self.metrics_cadence == 0 {
            return Err(invalid("metrics_cadence", "metrics_cadence must be at least 1"));
        }
        if self.risk_free_rate < 0.0 || self.risk_free_rate >= 1.0 {
            return Err(invalid("risk_free_rate", "risk_free_rate must be between 0 and 1"));
        }
        if self.signal_lookback == 0 {
            return Err(invalid("signal_lookback", "signal_lookback must be at least 1"));
        }
        Ok(())
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn invalid(key: &str, reason: &str) -> SimError {
    SimError::ConfigInvalid {
        section: "run".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
