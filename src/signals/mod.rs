//! Built-in signal functions.

pub mod mean_reversion;
pub mod momentum;

use crate::domain::signal::{SignalRegistry, SignalRegistryBuilder};

/// Builder pre-loaded with every built-in signal. Callers may register
/// their own before building.
pub fn builtin_builder() -> SignalRegistryBuilder {
    SignalRegistry::builder()
        .register(momentum::NAME, momentum::evaluate, momentum::metadata())
        .register(
            mean_reversion::NAME,
            mean_reversion::evaluate,
            mean_reversion::metadata(),
        )
}
