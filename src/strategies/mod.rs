//! Built-in strategies and the INI factory that builds them.
//!
//! Each `[strategy.<id>]` section names a `kind` plus its settings:
//!
//! ```ini
//! [strategy.core]
//! kind = buy_and_hold
//! symbol = SPY
//! allocation = 0.5
//!
//! [strategy.swing]
//! kind = signal_follower
//! symbol = QQQ
//! signal = mean_reversion
//! quantity = 10
//! min_confidence = 0.2
//! param.entry_z = 1.5
//! ```

pub mod buy_and_hold;
pub mod signal_follower;

pub use buy_and_hold::{BuyAndHold, Sizing};
pub use signal_follower::SignalFollower;

use crate::domain::error::SimError;
use crate::domain::signal::SignalRegistry;
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;

pub const SECTION_PREFIX: &str = "strategy.";

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SimError> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

/// Ids of every `[strategy.<id>]` section, sorted.
pub fn strategy_ids(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter_map(|s| s.strip_prefix(SECTION_PREFIX).map(str::to_string))
        .filter(|id| !id.is_empty())
        .collect()
}

/// Build the strategy configured in `[strategy.<id>]`.
pub fn build_strategy(
    config: &dyn ConfigPort,
    id: &str,
    signals: &SignalRegistry,
) -> Result<Box<dyn Strategy>, SimError> {
    let section = format!("{SECTION_PREFIX}{id}");
    let kind = required(config, &section, "kind")?;
    let symbol = required(config, &section, "symbol")?.to_uppercase();

    match kind.as_str() {
        "buy_and_hold" => {
            let sizing = match config.get_string(&section, "quantity") {
                Some(_) => Sizing::Quantity(config.get_double(&section, "quantity", 0.0)),
                None => Sizing::Allocation(config.get_double(&section, "allocation", 1.0)),
            };
            Ok(Box::new(BuyAndHold::new(&symbol, sizing)))
        }
        "signal_follower" => {
            let signal = required(config, &section, "signal")?;
            if !signals.contains(&signal) {
                return Err(SimError::UnknownSignal { name: signal });
            }
            let quantity = config.get_double(&section, "quantity", 1.0);
            let mut strategy = SignalFollower::new(&signal, &symbol, quantity)
                .with_min_confidence(config.get_double(&section, "min_confidence", 0.0));
            for key in signal_params(config, &section) {
                let value = config.get_double(&section, &format!("param.{key}"), f64::NAN);
                if value.is_finite() {
                    strategy = strategy.with_parameter(&key, value);
                } else if let Some(text) = config.get_string(&section, &format!("param.{key}")) {
                    strategy = strategy.with_parameter(&key, text);
                }
            }
            Ok(Box::new(strategy))
        }
        other => Err(SimError::ConfigInvalid {
            section,
            key: "kind".to_string(),
            reason: format!("unknown strategy kind '{other}'"),
        }),
    }
}

/// Parameter names declared as `param.<name>` keys in `section`.
fn signal_params(config: &dyn ConfigPort, section: &str) -> Vec<String> {
    config
        .keys(section)
        .into_iter()
        .filter_map(|key| key.strip_prefix("param.").map(str::to_string))
        .filter(|name| !name.is_empty())
        .collect()
}
