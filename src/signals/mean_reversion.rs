//! Z-score mean reversion signal.
//!
//! z = (price - mean) / stddev over the look-back closes (population
//! stddev). `z <= -entry_z` buys, `z >= entry_z` sells, `|z| <= exit_z`
//! closes, anything between holds.

use crate::domain::error::SignalError;
use crate::domain::signal::{SignalInput, SignalMetadata, SignalOutput, SignalType};

pub const NAME: &str = "mean_reversion";

const DEFAULT_ENTRY_Z: f64 = 2.0;
const DEFAULT_EXIT_Z: f64 = 0.5;

pub fn metadata() -> SignalMetadata {
    SignalMetadata::new("Z-score of price against the look-back mean", "mean_reversion")
        .with_min_lookback(5)
}

pub fn evaluate(input: &SignalInput) -> Result<Option<SignalOutput>, SignalError> {
    let closes = input.closes();
    if closes.is_empty() {
        return Ok(None);
    }

    let entry_z = input.param_f64("entry_z").unwrap_or(DEFAULT_ENTRY_Z);
    let exit_z = input.param_f64("exit_z").unwrap_or(DEFAULT_EXIT_Z);
    if !(entry_z > exit_z && exit_z >= 0.0) {
        return Err(SignalError::new("entry_z must exceed exit_z >= 0"));
    }

    let n = closes.len() as f64;
    let mean = closes.iter().sum::<f64>() / n;
    let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return Ok(Some(
            SignalOutput::new(SignalType::Hold, 0.0).with_metadata("z_score", 0.0),
        ));
    }

    let z = (input.current_price - mean) / stddev;
    let signal_type = if z <= -entry_z {
        SignalType::Buy
    } else if z >= entry_z {
        SignalType::Sell
    } else if z.abs() <= exit_z {
        SignalType::Close
    } else {
        SignalType::Hold
    };
    let confidence = (z.abs() / (2.0 * entry_z)).min(1.0);

    Ok(Some(
        SignalOutput::new(signal_type, confidence)
            .with_metadata("z_score", z)
            .with_metadata("mean", mean)
            .with_metadata("stddev", stddev),
    ))
}
