//! Configuration validation.
//!
//! Checks the `[run]` and `[strategy.*]` sections of an INI file before
//! anything is built from them, then turns `[run]` into a
//! [`RunConfiguration`].

use crate::domain::config::RunConfiguration;
use crate::domain::error::SimError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

const RUN: &str = "run";

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    validate_dates(config)?;
    validate_symbols(config)?;
    validate_positive_double(config, "initial_capital")?;
    for key in ["commission_per_trade", "commission_pct", "slippage_pct"] {
        validate_non_negative(config, key)?;
    }
    for key in ["max_positions", "metrics_cadence", "signal_lookback"] {
        validate_positive_int(config, key)?;
    }
    validate_risk_free_rate(config)?;
    validate_strategy_sections(config)?;
    Ok(())
}

fn invalid(key: &str, reason: impl Into<String>) -> SimError {
    SimError::ConfigInvalid {
        section: RUN.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SimError> {
    let start_date = parse_date(config.get_string(RUN, "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string(RUN, "end_date").as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(invalid("start_date", "start_date must not be after end_date"));
    }
    Ok(())
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, SimError> {
    match value {
        None => Err(SimError::ConfigMissing {
            section: RUN.to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| invalid(field, format!("invalid {} format, expected YYYY-MM-DD", field))),
    }
}

/// Comma-separated, trimmed, upper-cased; blanks dropped.
pub fn parse_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), SimError> {
    let symbols = config
        .get_string(RUN, "symbols")
        .map(|s| parse_symbols(&s))
        .unwrap_or_default();
    if symbols.is_empty() {
        return Err(SimError::ConfigMissing {
            section: RUN.to_string(),
            key: "symbols".to_string(),
        });
    }
    Ok(())
}

/// A present key whose text does not parse as a number reads as NaN.
fn read_double(config: &dyn ConfigPort, key: &str, default: f64) -> f64 {
    match config.get_string(RUN, key) {
        Some(_) => config.get_double(RUN, key, f64::NAN),
        None => default,
    }
}

fn validate_positive_double(config: &dyn ConfigPort, key: &str) -> Result<(), SimError> {
    let value = read_double(config, key, 1.0);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(key, format!("{key} must be positive")));
    }
    Ok(())
}

fn validate_non_negative(config: &dyn ConfigPort, key: &str) -> Result<(), SimError> {
    let value = read_double(config, key, 0.0);
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(key, format!("{key} must be non-negative")));
    }
    Ok(())
}

fn validate_positive_int(config: &dyn ConfigPort, key: &str) -> Result<(), SimError> {
    if config.get_string(RUN, key).is_none() {
        return Ok(());
    }
    if config.get_int(RUN, key, 0) < 1 {
        return Err(invalid(key, format!("{key} must be an integer of at least 1")));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), SimError> {
    let value = read_double(config, "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_strategy_sections(config: &dyn ConfigPort) -> Result<(), SimError> {
    let sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with("strategy."))
        .collect();
    if sections.is_empty() {
        return Err(SimError::ConfigMissing {
            section: "strategy.<id>".to_string(),
            key: "kind".to_string(),
        });
    }
    for section in sections {
        for key in ["kind", "symbol"] {
            if config
                .get_string(&section, key)
                .is_none_or(|v| v.trim().is_empty())
            {
                return Err(SimError::ConfigMissing {
                    section,
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Build the typed run configuration from `[run]`.
pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfiguration, SimError> {
    let start_date = parse_date(config.get_string(RUN, "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string(RUN, "end_date").as_deref(), "end_date")?;
    let symbols = config
        .get_string(RUN, "symbols")
        .map(|s| parse_symbols(&s))
        .unwrap_or_default();

    let defaults = RunConfiguration::new(start_date, end_date, symbols);
    let int = |key: &str, default: usize| -> usize {
        usize::try_from(config.get_int(RUN, key, default as i64)).unwrap_or(0)
    };

    let run_config = RunConfiguration {
        name: config
            .get_string(RUN, "name")
            .unwrap_or_else(|| defaults.name.clone()),
        initial_capital: read_double(config, "initial_capital", defaults.initial_capital),
        commission_per_trade: read_double(config, "commission_per_trade", 0.0),
        commission_pct: read_double(config, "commission_pct", 0.0),
        slippage_pct: read_double(config, "slippage_pct", 0.0),
        max_positions: int("max_positions", defaults.max_positions),
        enable_options: config.get_bool(RUN, "enable_options", defaults.enable_options),
        enable_signals: config.get_bool(RUN, "enable_signals", defaults.enable_signals),
        metrics_cadence: int("metrics_cadence", defaults.metrics_cadence),
        risk_free_rate: read_double(config, "risk_free_rate", defaults.risk_free_rate),
        signal_lookback: int("signal_lookback", defaults.signal_lookback),
        ..defaults
    };
    run_config.validate()?;
    Ok(run_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const VALID: &str = "\
[run]
start_date = 2024-01-01
end_date = 2024-12-31
symbols = aapl, MSFT
initial_capital = 50000
metrics_cadence = 5

[strategy.core]
kind = buy_and_hold
symbol = AAPL
";

    /// `VALID` with `line` in `[run]`, replacing any existing value for its key.
    fn with_run_line(line: &str) -> FileConfigAdapter {
        let key = line.split('=').next().unwrap_or_default().trim();
        let kept: Vec<&str> = VALID
            .lines()
            .filter(|l| !l.contains('=') || l.split('=').next().map(str::trim) != Some(key))
            .collect();
        let content = format!("{}\n", kept.join("\n"))
            .replacen("[run]\n", &format!("[run]\n{line}\n"), 1);
        FileConfigAdapter::from_string(&content).unwrap()
    }

    fn assert_invalid(config: &FileConfigAdapter, expected_key: &str) {
        match validate_run_config(config) {
            Err(SimError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected ConfigInvalid for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes_and_builds() {
        let config = FileConfigAdapter::from_string(VALID).unwrap();
        validate_run_config(&config).unwrap();

        let run = build_run_config(&config).unwrap();
        assert_eq!(run.symbols, vec!["AAPL", "MSFT"]);
        assert!((run.initial_capital - 50_000.0).abs() < f64::EPSILON);
        assert_eq!(run.metrics_cadence, 5);
        assert_eq!(run.max_positions, 10);
        assert!(run.enable_signals);
        assert!(!run.enable_options);
    }

    #[test]
    fn missing_dates() {
        let config = FileConfigAdapter::from_string("[run]\nsymbols = A\n").unwrap();
        assert!(matches!(
            validate_run_config(&config),
            Err(SimError::ConfigMissing { ref key, .. }) if key == "start_date"
        ));
    }

    #[test]
    fn bad_values_name_their_key() {
        assert_invalid(&with_run_line("initial_capital = -5"), "initial_capital");
        assert_invalid(&with_run_line("initial_capital = lots"), "initial_capital");
        assert_invalid(&with_run_line("slippage_pct = -0.1"), "slippage_pct");
        assert_invalid(&with_run_line("metrics_cadence = 0"), "metrics_cadence");
        assert_invalid(&with_run_line("max_positions = two"), "max_positions");
        assert_invalid(&with_run_line("risk_free_rate = 1.5"), "risk_free_rate");
    }

    #[test]
    fn non_finite_amounts_are_rejected() {
        assert_invalid(&with_run_line("initial_capital = inf"), "initial_capital");
        assert_invalid(&with_run_line("commission_pct = NaN"), "commission_pct");
        assert_invalid(&with_run_line("slippage_pct = inf"), "slippage_pct");
    }

    #[test]
    fn one_day_window_is_valid() {
        let content = VALID.replace("2024-12-31", "2024-01-01");
        let config = FileConfigAdapter::from_string(&content).unwrap();
        assert!(validate_run_config(&config).is_ok());
        let run = build_run_config(&config).unwrap();
        assert_eq!(run.start_date, run.end_date);
    }

    #[test]
    fn reversed_dates() {
        let content = VALID.replace("2024-12-31", "2023-12-31");
        let config = FileConfigAdapter::from_string(&content).unwrap();
        assert_invalid(&config, "start_date");
    }

    #[test]
    fn empty_symbols() {
        let content = VALID.replace("aapl, MSFT", " , ");
        let config = FileConfigAdapter::from_string(&content).unwrap();
        assert!(matches!(
            validate_run_config(&config),
            Err(SimError::ConfigMissing { ref key, .. }) if key == "symbols"
        ));
    }

    #[test]
    fn strategy_sections_required() {
        let content = VALID.split("[strategy.core]").next().unwrap().to_string();
        let config = FileConfigAdapter::from_string(&content).unwrap();
        assert!(validate_run_config(&config).is_err());

        let content = VALID.replace("symbol = AAPL\n", "");
        let config = FileConfigAdapter::from_string(&content).unwrap();
        assert!(matches!(
            validate_run_config(&config),
            Err(SimError::ConfigMissing { ref key, .. }) if key == "symbol"
        ));
    }

    #[test]
    fn parse_symbols_normalises() {
        assert_eq!(parse_symbols(" spy,,qqq , "), vec!["SPY", "QQQ"]);
    }
}
