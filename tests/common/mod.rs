#![allow(dead_code)]

use barreplay::adapters::memory_repository::MemoryRepository;
use barreplay::domain::bar::MarketBar;
use barreplay::domain::config::RunConfiguration;
use barreplay::domain::context::StrategyContext;
use barreplay::domain::engine::{RunOutcome, RunSummary, SimulationEngine};
use barreplay::domain::error::StrategyError;
use barreplay::domain::event::MarketEvent;
use barreplay::domain::strategy::Strategy;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
}

pub fn make_bar(symbol: &str, offset: i64, close: f64) -> MarketBar {
    MarketBar {
        symbol: symbol.to_string(),
        timestamp: day(offset),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000,
        adj_close: close,
    }
}

/// Daily bars from 2024-01-01 with the given closes.
pub fn bars_with_closes(symbol: &str, closes: &[f64]) -> Vec<MarketBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| make_bar(symbol, i as i64, *close))
        .collect()
}

/// `count` daily bars closing at 100, 101, 102, ...
pub fn rising_bars(symbol: &str, count: usize) -> Vec<MarketBar> {
    let closes: Vec<f64> = (0..count).map(|i| 100.0 + i as f64).collect();
    bars_with_closes(symbol, &closes)
}

pub fn repository_with(series: &[(&str, usize)]) -> Arc<MemoryRepository> {
    let repo = MemoryRepository::new();
    for (symbol, count) in series {
        repo.insert_bars(&rising_bars(symbol, *count));
    }
    Arc::new(repo)
}

pub fn run_config(symbols: &[&str]) -> RunConfiguration {
    RunConfiguration::new(
        date(2024, 1, 1),
        date(2024, 12, 31),
        symbols.iter().map(|s| s.to_string()).collect(),
    )
}

pub fn engine_for(repo: &Arc<MemoryRepository>, config: RunConfiguration) -> SimulationEngine {
    SimulationEngine::builder(config)
        .repository(repo.clone())
        .build()
        .unwrap()
}

pub fn finished(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Finished(summary) => summary,
        other => panic!("expected a finished run, got {other:?}"),
    }
}

/// What a [`Watcher`] observed on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub tick: usize,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub current_time: Option<DateTime<Utc>>,
    pub prices: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Default)]
pub struct WatcherLog {
    pub initialized: usize,
    pub price_during_init: Vec<(String, Option<f64>)>,
    pub ticks: Vec<Observation>,
    pub cleanups: usize,
}

/// Records everything it sees; optionally fails on chosen ticks.
pub struct Watcher {
    pub symbols: Vec<String>,
    pub fail_on: Vec<usize>,
    pub panic_on: Vec<usize>,
    pub log: Arc<Mutex<WatcherLog>>,
}

impl Watcher {
    pub fn new(symbols: &[&str]) -> (Self, Arc<Mutex<WatcherLog>>) {
        let log = Arc::new(Mutex::new(WatcherLog::default()));
        let watcher = Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            fail_on: Vec::new(),
            panic_on: Vec::new(),
            log: Arc::clone(&log),
        };
        (watcher, log)
    }

    pub fn failing_on(mut self, tick: usize) -> Self {
        self.fail_on.push(tick);
        self
    }

    pub fn panicking_on(mut self, tick: usize) -> Self {
        self.panic_on.push(tick);
        self
    }
}

impl Strategy for Watcher {
    fn initialize(&mut self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        let mut log = self.log.lock().unwrap();
        log.initialized += 1;
        log.price_during_init = self
            .symbols
            .iter()
            .map(|s| (s.clone(), ctx.current_price(s)))
            .collect();
        Ok(())
    }

    fn on_market_data(
        &mut self,
        ctx: &mut StrategyContext,
        event: &MarketEvent,
    ) -> Result<(), StrategyError> {
        self.log.lock().unwrap().ticks.push(Observation {
            tick: event.tick,
            bar_index: event.bar_index,
            timestamp: event.timestamp,
            current_time: ctx.current_time(),
            prices: self
                .symbols
                .iter()
                .map(|s| (s.clone(), ctx.current_price(s)))
                .collect(),
        });
        if self.panic_on.contains(&event.tick) {
            panic!("watcher panicked on tick {}", event.tick);
        }
        if self.fail_on.contains(&event.tick) {
            return Err(format!("watcher failed on tick {}", event.tick).into());
        }
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        self.log.lock().unwrap().cleanups += 1;
        Ok(())
    }
}
