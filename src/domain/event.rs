//! Market events fanned out to strategies, one per tick.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::bar::MarketBar;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    /// 1-based count of ticks processed, including this one.
    pub tick: usize,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Current bar per symbol. Symbols whose history has run out are absent.
    pub bars: BTreeMap<String, MarketBar>,
}

impl MarketEvent {
    pub fn bar(&self, symbol: &str) -> Option<&MarketBar> {
        self.bars.get(symbol)
    }

    pub fn close(&self, symbol: &str) -> Option<f64> {
        self.bars.get(symbol).map(|b| b.close)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lookup_present_and_absent() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut bars = BTreeMap::new();
        bars.insert(
            "AAPL".to_string(),
            MarketBar {
                symbol: "AAPL".into(),
                timestamp: ts,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10,
                adj_close: 1.5,
            },
        );
        let event = MarketEvent {
            tick: 1,
            bar_index: 0,
            timestamp: ts,
            bars,
        };

        assert_eq!(event.close("AAPL"), Some(1.5));
        assert!(event.bar("MSFT").is_none());
        assert_eq!(event.symbols().collect::<Vec<_>>(), vec!["AAPL"]);
    }
}
