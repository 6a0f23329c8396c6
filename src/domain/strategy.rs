//! Strategy contract and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::StrategyContext;
use super::error::StrategyError;
use super::event::MarketEvent;

/// A pluggable decision unit. Everything it does to the outside world goes
/// through the [`StrategyContext`] it is handed.
pub trait Strategy {
    /// Called once before the first tick. An error aborts the whole run.
    fn initialize(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError>;

    /// Called once per tick. An error is logged against this strategy only;
    /// it keeps receiving later ticks.
    fn on_market_data(
        &mut self,
        ctx: &mut StrategyContext,
        event: &MarketEvent,
    ) -> Result<(), StrategyError>;

    /// Called once when the run ends, whatever its outcome.
    fn cleanup(&mut self, _ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        Ok(())
    }
}

/// ```text
/// Created → Running → Stopped
///     \        |
///      └──→ Error ←┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyState {
    #[default]
    Created,
    Running,
    Stopped,
    Error,
}

impl StrategyState {
    pub fn is_running(&self) -> bool {
        matches!(self, StrategyState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StrategyState::Stopped | StrategyState::Error)
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyState::Created => "created",
            StrategyState::Running => "running",
            StrategyState::Stopped => "stopped",
            StrategyState::Error => "error",
        };
        f.write_str(s)
    }
}
