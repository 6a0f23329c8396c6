//! Trades a single symbol on the verdicts of a named signal.
//!
//! `buy` opens a long of `quantity` units when flat; `sell` and `close`
//! flatten an open long. `hold` does nothing.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::context::StrategyContext;
use crate::domain::error::StrategyError;
use crate::domain::event::MarketEvent;
use crate::domain::order::{OrderRequest, OrderSide};
use crate::domain::position::Position;
use crate::domain::signal::SignalType;
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct SignalFollower {
    signal: String,
    symbol: String,
    quantity: f64,
    parameters: BTreeMap<String, Value>,
    min_confidence: f64,
}

impl SignalFollower {
    pub fn new(signal: &str, symbol: &str, quantity: f64) -> Self {
        Self {
            signal: signal.to_string(),
            symbol: symbol.to_string(),
            quantity,
            parameters: BTreeMap::new(),
            min_confidence: 0.0,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence;
        self
    }
}

impl Strategy for SignalFollower {
    fn initialize(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(format!("quantity must be positive, got {}", self.quantity).into());
        }
        if !ctx.config().enable_signals {
            return Err("signals are disabled for this run".into());
        }
        if !ctx.config().symbols.contains(&self.symbol) {
            return Err(format!("{} is not a configured symbol", self.symbol).into());
        }
        ctx.log_info(&format!("following {} on {}", self.signal, self.symbol));
        Ok(())
    }

    fn on_market_data(
        &mut self,
        ctx: &mut StrategyContext,
        _event: &MarketEvent,
    ) -> Result<(), StrategyError> {
        let Some(output) = ctx.execute_signal(&self.signal, &self.symbol, Some(self.parameters.clone()))
        else {
            return Ok(());
        };
        if output.confidence < self.min_confidence {
            return Ok(());
        }

        let position = ctx.position(&self.symbol);
        let flat = position.is_none_or(Position::is_flat);
        let request = match (output.signal_type, position) {
            (SignalType::Buy, _) if flat => {
                OrderRequest::market(&self.symbol, OrderSide::Buy, self.quantity)
            }
            (SignalType::Sell | SignalType::Close, Some(held)) if held.is_long() => {
                OrderRequest::market(&self.symbol, OrderSide::Sell, held.quantity)
            }
            _ => return Ok(()),
        };

        let side = request.side;
        ctx.submit_order(request.with_tag(self.signal.clone()))
            .ok_or_else(|| StrategyError::new(format!("{side} order for {} refused", self.symbol)))?;
        Ok(())
    }
}
