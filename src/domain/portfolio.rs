//! Per-strategy portfolio ledger and equity tracking.
//!
//! Cash and positions change only through [`Portfolio::settle`]. Revaluation
//! ([`Portfolio::mark_to_market`]) moves prices, never quantities or cash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::order::Fill;
use super::position::{Position, QUANTITY_EPSILON};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_capital: f64,
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    pub total_value: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_commission: f64,
    pub fill_count: usize,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            total_value: initial_capital,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            total_commission: 0.0,
            fill_count: 0,
            equity_curve: Vec::new(),
        }
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.values().map(|p| p.market_value).sum()
    }

    /// Apply a fill. Returns the P&L realized by this fill (before commission).
    pub fn settle(&mut self, fill: &Fill) -> f64 {
        let delta = fill.signed_quantity();
        self.cash -= delta * fill.price + fill.commission;
        self.total_commission += fill.commission;
        self.fill_count += 1;

        let mut realized = 0.0;
        let mut remove = false;

        match self.positions.get_mut(&fill.symbol) {
            None => {
                let position = Position::open(&fill.symbol, delta, fill.price, fill.timestamp);
                self.positions.insert(fill.symbol.clone(), position);
            }
            Some(position) => {
                let old_qty = position.quantity;
                let new_qty = old_qty + delta;

                if old_qty * delta >= 0.0 {
                    position.average_price =
                        (old_qty * position.average_price + delta * fill.price) / new_qty;
                } else {
                    let closed = delta.abs().min(old_qty.abs());
                    realized = closed * (fill.price - position.average_price) * old_qty.signum();

                    if old_qty * new_qty < 0.0 {
                        // Flipped through flat: remainder opens at the fill price.
                        position.average_price = fill.price;
                        position.opened_at = fill.timestamp;
                    }
                }

                position.quantity = new_qty;
                if new_qty.abs() <= QUANTITY_EPSILON {
                    remove = true;
                } else {
                    position.revalue(fill.price);
                }
            }
        }

        if remove {
            self.positions.remove(&fill.symbol);
        }

        self.realized_pnl += realized;
        self.refresh_totals();
        realized
    }

    /// Re-price held positions and append an equity point. Symbols missing
    /// from `prices` keep their last price.
    pub fn mark_to_market(&mut self, timestamp: DateTime<Utc>, prices: &HashMap<String, f64>) {
        for position in self.positions.values_mut() {
            if let Some(&price) = prices.get(&position.symbol) {
                position.revalue(price);
            }
        }
        self.refresh_totals();
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: self.total_value,
        });
    }

    fn refresh_totals(&mut self) {
        self.unrealized_pnl = self.positions.values().map(|p| p.unrealized_pnl).sum();
        self.total_value = self.cash + self.positions_value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderId, OrderSide};
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn fill(symbol: &str, side: OrderSide, quantity: f64, price: f64, commission: f64) -> Fill {
        Fill {
            order_id: OrderId::generate(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            commission,
            timestamp: ts(2),
        }
    }

    fn assert_balanced(p: &Portfolio) {
        assert!((p.cash + p.positions_value() - p.total_value).abs() < 1e-6);
    }

    #[test]
    fn new_portfolio() {
        let p = Portfolio::new(100_000.0);
        assert!((p.cash - 100_000.0).abs() < f64::EPSILON);
        assert!((p.total_value - 100_000.0).abs() < f64::EPSILON);
        assert!(p.positions.is_empty());
        assert!(p.equity_curve.is_empty());
        assert_eq!(p.fill_count, 0);
    }

    #[test]
    fn buy_opens_position_and_debits_cash() {
        let mut p = Portfolio::new(10_000.0);
        let realized = p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 100.0, 1.0));

        assert_eq!(realized, 0.0);
        assert!((p.cash - 8_999.0).abs() < 1e-9);
        let pos = p.get_position("AAPL").unwrap();
        assert_eq!(pos.quantity, 10.0);
        assert_eq!(pos.average_price, 100.0);
        assert!((p.total_value - 9_999.0).abs() < 1e-9);
        assert!((p.total_commission - 1.0).abs() < 1e-9);
        assert_balanced(&p);
    }

    #[test]
    fn adding_to_position_averages_price() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 100.0, 0.0));
        p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 110.0, 0.0));

        let pos = p.get_position("AAPL").unwrap();
        assert_eq!(pos.quantity, 20.0);
        assert!((pos.average_price - 105.0).abs() < 1e-9);
        assert_balanced(&p);
    }

    #[test]
    fn partial_sell_realizes_pnl() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 100.0, 0.0));
        let realized = p.settle(&fill("AAPL", OrderSide::Sell, 4.0, 110.0, 0.0));

        assert!((realized - 40.0).abs() < 1e-9);
        assert!((p.realized_pnl - 40.0).abs() < 1e-9);
        let pos = p.get_position("AAPL").unwrap();
        assert_eq!(pos.quantity, 6.0);
        assert_eq!(pos.average_price, 100.0);
        assert_balanced(&p);
    }

    #[test]
    fn full_close_removes_position() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 100.0, 0.0));
        p.settle(&fill("AAPL", OrderSide::Sell, 10.0, 90.0, 0.0));

        assert!(!p.has_position("AAPL"));
        assert!((p.realized_pnl - (-100.0)).abs() < 1e-9);
        assert!((p.cash - 9_900.0).abs() < 1e-9);
        assert!((p.total_value - 9_900.0).abs() < 1e-9);
    }

    #[test]
    fn flip_long_to_short_resets_average() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("AAPL", OrderSide::Buy, 5.0, 100.0, 0.0));
        let realized = p.settle(&fill("AAPL", OrderSide::Sell, 8.0, 120.0, 0.0));

        assert!((realized - 100.0).abs() < 1e-9);
        let pos = p.get_position("AAPL").unwrap();
        assert_eq!(pos.quantity, -3.0);
        assert_eq!(pos.average_price, 120.0);
        assert_balanced(&p);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("MSFT", OrderSide::Sell, 10.0, 100.0, 0.0));
        assert!((p.cash - 11_000.0).abs() < 1e-9);
        assert!((p.total_value - 10_000.0).abs() < 1e-9);

        let mut prices = HashMap::new();
        prices.insert("MSFT".to_string(), 90.0);
        p.mark_to_market(ts(3), &prices);

        assert!((p.total_value - 10_100.0).abs() < 1e-9);
        assert!((p.unrealized_pnl - 100.0).abs() < 1e-9);
        assert_balanced(&p);
    }

    #[test]
    fn mark_to_market_appends_equity_and_keeps_missing_prices() {
        let mut p = Portfolio::new(10_000.0);
        p.settle(&fill("AAPL", OrderSide::Buy, 10.0, 100.0, 0.0));
        p.settle(&fill("MSFT", OrderSide::Buy, 10.0, 50.0, 0.0));

        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 110.0);
        p.mark_to_market(ts(3), &prices);

        assert_eq!(p.equity_curve.len(), 1);
        assert_eq!(p.get_position("MSFT").unwrap().last_price, 50.0);
        assert!((p.total_value - 10_100.0).abs() < 1e-9);
        assert!((p.equity_curve[0].equity - 10_100.0).abs() < 1e-9);
        assert_eq!(p.equity_curve[0].timestamp, ts(3));
    }
}
