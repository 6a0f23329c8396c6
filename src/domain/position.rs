//! Position tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantities closer to zero than this are treated as flat.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed: positive long, negative short.
    pub quantity: f64,
    pub average_price: f64,
    pub last_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn open(symbol: &str, quantity: f64, price: f64, opened_at: DateTime<Utc>) -> Self {
        let mut position = Position {
            symbol: symbol.to_string(),
            quantity,
            average_price: price,
            last_price: price,
            market_value: 0.0,
            unrealized_pnl: 0.0,
            opened_at,
        };
        position.revalue(price);
        position
    }

    pub fn is_long(&self) -> bool {
        self.quantity > QUANTITY_EPSILON
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= QUANTITY_EPSILON
    }

    /// Re-price the position. Market value is signed, so a short carries a
    /// negative value against the sale proceeds already credited to cash.
    pub fn revalue(&mut self, price: f64) {
        self.last_price = price;
        self.market_value = self.quantity * price;
        self.unrealized_pnl = self.quantity * (price - self.average_price);
    }
}
