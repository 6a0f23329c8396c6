//! Read-only per-symbol bar cache for one run window.
//!
//! Loaded once before the first tick and never mutated afterwards, so it can
//! be shared behind an `Arc` by every strategy context.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::bar::{is_time_ordered, MarketBar};
use crate::ports::repository_port::Repository;

#[derive(Debug, Clone, Default)]
pub struct MarketDataCache {
    series: HashMap<String, Vec<MarketBar>>,
    /// Symbols that have data, in configured order.
    order: Vec<String>,
}

impl MarketDataCache {
    /// Fetch every symbol once. A symbol with no data, or whose fetch fails,
    /// is logged and left out.
    pub fn load(
        repository: &dyn Repository,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let mut loaded = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match repository.load_bars(symbol, start, end) {
                Ok(bars) if bars.is_empty() => {
                    warn!(%symbol, "no bars in window, symbol will be absent");
                }
                Ok(bars) => {
                    debug!(%symbol, bars = bars.len(), "loaded bars");
                    loaded.push((symbol.clone(), bars));
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "failed to load bars, symbol will be absent");
                }
            }
        }
        Self::from_series(loaded)
    }

    /// Build from already-fetched series. Out-of-order input is sorted.
    pub fn from_series(series: Vec<(String, Vec<MarketBar>)>) -> Self {
        let mut cache = MarketDataCache::default();
        for (symbol, mut bars) in series {
            if bars.is_empty() || cache.series.contains_key(&symbol) {
                continue;
            }
            if !is_time_ordered(&bars) {
                warn!(%symbol, "bars out of time order, sorting");
                bars.sort_by_key(|b| b.timestamp);
            }
            cache.order.push(symbol.clone());
            cache.series.insert(symbol, bars);
        }
        cache
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn bars(&self, symbol: &str) -> Option<&[MarketBar]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    /// `None` once `index` is past the end of the symbol's history.
    pub fn bar_at(&self, symbol: &str, index: usize) -> Option<&MarketBar> {
        self.series.get(symbol).and_then(|bars| bars.get(index))
    }

    /// The bar stamped exactly at `timestamp`. A symbol that did not trade
    /// then, or whose history starts later, has none.
    pub fn bar_on(&self, symbol: &str, timestamp: DateTime<Utc>) -> Option<&MarketBar> {
        let bars = self.series.get(symbol)?;
        bars.binary_search_by_key(&timestamp, |b| b.timestamp)
            .ok()
            .map(|i| &bars[i])
    }

    /// Up to `len` bars stamped at or before `timestamp`, oldest first.
    pub fn window_until(&self, symbol: &str, timestamp: DateTime<Utc>, len: usize) -> &[MarketBar] {
        match self.series.get(symbol) {
            Some(bars) => {
                let end = bars.partition_point(|b| b.timestamp <= timestamp);
                &bars[end.saturating_sub(len)..end]
            }
            None => &[],
        }
    }

    /// Longest history; ties go to the earlier configured symbol.
    pub fn reference_symbol(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for symbol in &self.order {
            let len = self.series.get(symbol).map_or(0, Vec::len);
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((symbol.as_str(), len));
            }
        }
        best.map(|(symbol, _)| symbol)
    }

    pub fn total_bars(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Bars stamped at `timestamp`, keyed by symbol.
    pub fn bars_on(&self, timestamp: DateTime<Utc>) -> BTreeMap<String, MarketBar> {
        self.order
            .iter()
            .filter_map(|symbol| {
                self.bar_on(symbol, timestamp)
                    .map(|bar| (symbol.clone(), bar.clone()))
            })
            .collect()
    }
}
