//! In-process repository.
//!
//! Holds bars, option quotes and run artefacts in memory behind a mutex.
//! Used for CSV-only runs and throughout the test suite, where
//! [`MemoryRepository::fail_with`] simulates an unavailable store.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::domain::bar::MarketBar;
use crate::domain::error::SimError;
use crate::domain::options::{OptionContract, OptionsChain};
use crate::domain::run::{PerformanceSnapshot, RunRecord, RunResults, RunStatus};
use crate::domain::signal::SignalRecord;
use crate::ports::repository_port::Repository;

#[derive(Default)]
struct Store {
    bars: HashMap<String, BTreeMap<DateTime<Utc>, MarketBar>>,
    /// underlying -> quote time -> contracts
    options: HashMap<String, BTreeMap<DateTime<Utc>, Vec<OptionContract>>>,
    runs: BTreeMap<String, RunRecord>,
    snapshots: Vec<PerformanceSnapshot>,
    signals: Vec<SignalRecord>,
    failure: Option<String>,
}

#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, SimError> {
        self.store.lock().map_err(|_| SimError::Database {
            reason: "repository lock poisoned".to_string(),
        })
    }

    /// Lock for a repository call, honouring an injected failure.
    fn open(&self) -> Result<MutexGuard<'_, Store>, SimError> {
        let store = self.lock()?;
        if let Some(reason) = &store.failure {
            return Err(SimError::Database {
                reason: reason.clone(),
            });
        }
        Ok(store)
    }

    /// Make every subsequent repository call fail with `reason`.
    pub fn fail_with(&self, reason: &str) {
        if let Ok(mut store) = self.lock() {
            store.failure = Some(reason.to_string());
        }
    }

    pub fn recover(&self) {
        if let Ok(mut store) = self.lock() {
            store.failure = None;
        }
    }

    /// Insert or replace bars keyed by (symbol, timestamp). Returns how many
    /// bars were written.
    pub fn insert_bars(&self, bars: &[MarketBar]) -> usize {
        let Ok(mut store) = self.lock() else {
            return 0;
        };
        for bar in bars {
            store
                .bars
                .entry(bar.symbol.clone())
                .or_default()
                .insert(bar.timestamp, bar.clone());
        }
        bars.len()
    }

    /// Record a quote set for the contracts' underlyings at `quoted_at`.
    pub fn insert_option_quotes(&self, quoted_at: DateTime<Utc>, contracts: &[OptionContract]) -> usize {
        let Ok(mut store) = self.lock() else {
            return 0;
        };
        for contract in contracts {
            store
                .options
                .entry(contract.underlying.clone())
                .or_default()
                .entry(quoted_at)
                .or_default()
                .push(contract.clone());
        }
        contracts.len()
    }

    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.lock().ok()?.runs.get(run_id).cloned()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock()
            .map(|s| s.runs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshots(&self, run_id: &str) -> Vec<PerformanceSnapshot> {
        self.lock()
            .map(|s| {
                s.snapshots
                    .iter()
                    .filter(|snap| snap.run_id == run_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn signal_records(&self) -> Vec<SignalRecord> {
        self.lock().map(|s| s.signals.clone()).unwrap_or_default()
    }
}

impl Repository for MemoryRepository {
    fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, SimError> {
        let store = self.open()?;
        if start > end {
            return Ok(Vec::new());
        }
        Ok(store
            .bars
            .get(symbol)
            .map(|series| series.range(start..=end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default())
    }

    /// The most recent quote set at or before `timestamp`.
    fn load_options_chain(
        &self,
        underlying: &str,
        timestamp: DateTime<Utc>,
        expiration: Option<NaiveDate>,
    ) -> Result<Option<OptionsChain>, SimError> {
        let store = self.open()?;
        let Some((quoted_at, contracts)) = store
            .options
            .get(underlying)
            .and_then(|quotes| quotes.range(..=timestamp).next_back())
        else {
            return Ok(None);
        };

        let contracts: Vec<OptionContract> = contracts
            .iter()
            .filter(|c| expiration.is_none_or(|exp| c.expiration == exp))
            .cloned()
            .collect();
        if contracts.is_empty() {
            return Ok(None);
        }

        Ok(Some(OptionsChain {
            underlying: underlying.to_string(),
            timestamp: *quoted_at,
            contracts,
        }))
    }

    fn create_run(&self, record: &RunRecord) -> Result<(), SimError> {
        let mut store = self.open()?;
        if store.runs.contains_key(&record.run_id) {
            return Err(SimError::DatabaseQuery {
                reason: format!("run {} already exists", record.run_id),
            });
        }
        store.runs.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), SimError> {
        let mut store = self.open()?;
        let run = store.runs.get_mut(run_id).ok_or_else(|| SimError::DatabaseQuery {
            reason: format!("unknown run {run_id}"),
        })?;
        run.status = status;
        run.completed_at = completed_at;
        Ok(())
    }

    fn update_run_results(&self, run_id: &str, results: &RunResults) -> Result<(), SimError> {
        let mut store = self.open()?;
        let run = store.runs.get_mut(run_id).ok_or_else(|| SimError::DatabaseQuery {
            reason: format!("unknown run {run_id}"),
        })?;
        run.final_capital = Some(results.final_capital);
        run.total_return = Some(results.total_return);
        run.max_drawdown = Some(results.max_drawdown);
        run.sharpe_ratio = Some(results.sharpe_ratio);
        Ok(())
    }

    fn store_performance_snapshots(
        &self,
        run_id: &str,
        snapshots: &[PerformanceSnapshot],
    ) -> Result<usize, SimError> {
        let mut store = self.open()?;
        store.snapshots.extend(snapshots.iter().map(|s| PerformanceSnapshot {
            run_id: run_id.to_string(),
            ..s.clone()
        }));
        Ok(snapshots.len())
    }

    fn store_signal_records(&self, records: &[SignalRecord]) -> Result<usize, SimError> {
        let mut store = self.open()?;
        store.signals.extend_from_slice(records);
        Ok(records.len())
    }
}
