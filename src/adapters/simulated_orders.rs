//! Fill simulation for submitted orders.
//!
//! Market orders fill immediately at the current close moved against the
//! trader by the slippage percentage. Limit orders are fill-or-kill: they
//! fill at their limit price when the close is at or through it, and are
//! otherwise acknowledged without a fill and cancelled. Nothing rests on a
//! book between ticks.

use tracing::trace;

use crate::domain::config::RunConfiguration;
use crate::domain::error::SimError;
use crate::domain::order::{Fill, OrderAck, OrderId, OrderSide, OrderTicket, OrderType};
use crate::ports::order_port::OrderProcessor;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCosts {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionCosts {
    fn default() -> Self {
        ExecutionCosts {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, costs: &ExecutionCosts) -> f64 {
    costs.commission_per_trade + (trade_value * costs.commission_pct / 100.0)
}

/// Buys pay up, sells receive less.
pub fn apply_slippage(market_price: f64, side: OrderSide, slippage_pct: f64) -> f64 {
    match side {
        OrderSide::Buy => market_price * (1.0 + slippage_pct / 100.0),
        OrderSide::Sell => market_price * (1.0 - slippage_pct / 100.0),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedOrderProcessor {
    costs: ExecutionCosts,
}

impl SimulatedOrderProcessor {
    pub fn new(costs: ExecutionCosts) -> Self {
        Self { costs }
    }

    pub fn from_config(config: &RunConfiguration) -> Self {
        Self::new(ExecutionCosts {
            commission_per_trade: config.commission_per_trade,
            commission_pct: config.commission_pct,
            slippage_pct: config.slippage_pct,
        })
    }

    pub fn costs(&self) -> &ExecutionCosts {
        &self.costs
    }

    fn execution_price(&self, ticket: &OrderTicket) -> Option<f64> {
        let side = ticket.request.side;
        match ticket.request.order_type {
            OrderType::Market => Some(apply_slippage(
                ticket.market_price,
                side,
                self.costs.slippage_pct,
            )),
            OrderType::Limit(limit) => {
                let marketable = match side {
                    OrderSide::Buy => ticket.market_price <= limit,
                    OrderSide::Sell => ticket.market_price >= limit,
                };
                marketable.then_some(limit)
            }
        }
    }
}

impl OrderProcessor for SimulatedOrderProcessor {
    fn submit(&self, ticket: &OrderTicket) -> Result<OrderAck, SimError> {
        let request = &ticket.request;
        if !(ticket.market_price.is_finite() && ticket.market_price > 0.0) {
            return Err(SimError::OrderRejected {
                reason: format!("no valid price for {}", request.symbol),
            });
        }
        if let OrderType::Limit(limit) = request.order_type {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(SimError::OrderRejected {
                    reason: format!("invalid limit price {limit}"),
                });
            }
        }

        let order_id = OrderId::generate();
        let fill = self.execution_price(ticket).map(|price| {
            let commission = calculate_commission(request.quantity * price, &self.costs);
            Fill {
                order_id: order_id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                quantity: request.quantity,
                price,
                commission,
                timestamp: ticket.timestamp,
            }
        });

        trace!(
            strategy_id = %ticket.strategy_id,
            %order_id,
            symbol = %request.symbol,
            filled = fill.is_some(),
            "order processed"
        );
        Ok(OrderAck { order_id, fill })
    }
}
