//! Order requests, acknowledgements and fills.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "price")]
pub enum OrderType {
    Market,
    Limit(f64),
}

/// What a strategy asks for. Quantity is always positive; direction is `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            tag: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Limit(price),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Opaque order identifier handed back to strategies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        OrderId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An order as handed to the order processor: the request plus the
/// simulation state it was submitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTicket {
    pub run_id: String,
    pub strategy_id: String,
    pub request: OrderRequest,
    pub timestamp: DateTime<Utc>,
    /// Close of the current bar for `request.symbol`.
    pub market_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Quantity with direction applied.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: OrderId,
    /// `None` when a limit order was not marketable. Such an order is
    /// cancelled, never filled later.
    pub fill: Option<Fill>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn side_sign() {
        assert_eq!(OrderSide::Buy.sign(), 1.0);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
        assert_eq!(OrderSide::Sell.to_string(), "sell");
    }

    #[test]
    fn request_constructors() {
        let m = OrderRequest::market("AAPL", OrderSide::Buy, 10.0).with_tag("entry");
        assert_eq!(m.order_type, OrderType::Market);
        assert_eq!(m.tag.as_deref(), Some("entry"));

        let l = OrderRequest::limit("AAPL", OrderSide::Sell, 5.0, 99.5);
        assert_eq!(l.order_type, OrderType::Limit(99.5));
        assert!(l.tag.is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = OrderId::generate();
        let b = OrderId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn fill_signed_quantity_and_notional() {
        let fill = Fill {
            order_id: OrderId("o-1".into()),
            symbol: "AAPL".into(),
            side: OrderSide::Sell,
            quantity: 4.0,
            price: 25.0,
            commission: 1.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        };
        assert_eq!(fill.signed_quantity(), -4.0);
        assert_eq!(fill.notional(), 100.0);
    }

    #[test]
    fn order_type_serializes_tagged() {
        let json = serde_json::to_string(&OrderType::Limit(10.0)).unwrap();
        assert_eq!(json, r#"{"type":"limit","price":10.0}"#);
        let json = serde_json::to_string(&OrderType::Market).unwrap();
        assert_eq!(json, r#"{"type":"market"}"#);
    }
}
