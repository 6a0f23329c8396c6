//! Buy once, hold to the end.

use crate::domain::context::StrategyContext;
use crate::domain::error::StrategyError;
use crate::domain::event::MarketEvent;
use crate::domain::order::{OrderRequest, OrderSide};
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub enum Sizing {
    /// Fixed number of units.
    Quantity(f64),
    /// Fraction of cash, rounded down to whole units.
    Allocation(f64),
}

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    symbol: String,
    sizing: Sizing,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(symbol: &str, sizing: Sizing) -> Self {
        Self {
            symbol: symbol.to_string(),
            sizing,
            entered: false,
        }
    }

    fn quantity(&self, cash: f64, price: f64) -> f64 {
        match self.sizing {
            Sizing::Quantity(q) => q,
            Sizing::Allocation(fraction) => (cash * fraction / price).floor(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn initialize(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        match self.sizing {
            Sizing::Quantity(q) if !(q.is_finite() && q > 0.0) => {
                return Err(format!("quantity must be positive, got {q}").into());
            }
            Sizing::Allocation(a) if !(a > 0.0 && a <= 1.0) => {
                return Err(format!("allocation must be in (0, 1], got {a}").into());
            }
            _ => {}
        }
        if !ctx.config().symbols.contains(&self.symbol) {
            return Err(format!("{} is not a configured symbol", self.symbol).into());
        }
        Ok(())
    }

    fn on_market_data(
        &mut self,
        ctx: &mut StrategyContext,
        _event: &MarketEvent,
    ) -> Result<(), StrategyError> {
        if self.entered {
            return Ok(());
        }
        let Some(price) = ctx.current_price(&self.symbol) else {
            return Ok(());
        };

        let quantity = self.quantity(ctx.portfolio().cash, price);
        if quantity <= 0.0 {
            ctx.log_warning(&format!("not enough cash to buy {}", self.symbol));
            self.entered = true;
            return Ok(());
        }

        let order_id = ctx
            .submit_order(OrderRequest::market(&self.symbol, OrderSide::Buy, quantity))
            .ok_or_else(|| StrategyError::new(format!("entry order for {} refused", self.symbol)))?;
        self.entered = true;
        ctx.log_info(&format!(
            "bought {quantity} {} at {price:.2} ({order_id})",
            self.symbol
        ));
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        let metrics = ctx.performance_metrics();
        ctx.log_info(&format!(
            "final value {:.2}, return {:.2}%",
            ctx.portfolio().total_value,
            metrics.total_return * 100.0
        ));
        Ok(())
    }
}
