//! Rate-of-change momentum signal.
//!
//! ROC = ((C[last] - C[last-n]) / C[last-n]) * 100, with n = `period`
//! (default: the whole look-back window). Above `threshold` percent is a
//! buy, below `-threshold` a sell, anything else a hold.

use crate::domain::error::SignalError;
use crate::domain::signal::{SignalInput, SignalMetadata, SignalOutput, SignalType};

pub const NAME: &str = "momentum";

const DEFAULT_THRESHOLD_PCT: f64 = 2.0;

pub fn metadata() -> SignalMetadata {
    SignalMetadata::new("Rate of change of close over the look-back window", "trend")
        .with_min_lookback(2)
}

pub fn evaluate(input: &SignalInput) -> Result<Option<SignalOutput>, SignalError> {
    let closes = input.closes();
    let Some(&last) = closes.last() else {
        return Ok(None);
    };

    let period = input
        .param_usize("period")
        .unwrap_or(closes.len() - 1)
        .min(closes.len() - 1);
    if period == 0 {
        return Err(SignalError::new("period must be at least 1"));
    }
    let threshold = input.param_f64("threshold").unwrap_or(DEFAULT_THRESHOLD_PCT);
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(SignalError::new("threshold must be positive"));
    }

    let prior = closes[closes.len() - 1 - period];
    let roc = if prior == 0.0 {
        0.0
    } else {
        ((last - prior) / prior) * 100.0
    };

    let signal_type = if roc > threshold {
        SignalType::Buy
    } else if roc < -threshold {
        SignalType::Sell
    } else {
        SignalType::Hold
    };
    let confidence = match signal_type {
        SignalType::Hold => 1.0 - roc.abs() / threshold,
        _ => roc.abs() / (2.0 * threshold),
    };

    Ok(Some(
        SignalOutput::new(signal_type, confidence)
            .with_metadata("roc_pct", roc)
            .with_metadata("period", period as u64),
    ))
}
