//! Persistence port: bars, option chains, run records, snapshots, signals.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::bar::MarketBar;
use crate::domain::error::SimError;
use crate::domain::options::OptionsChain;
use crate::domain::run::{PerformanceSnapshot, RunRecord, RunResults, RunStatus};
use crate::domain::signal::SignalRecord;

pub trait Repository: Send + Sync {
    /// Bars for `symbol` with `start <= timestamp <= end`, oldest first.
    fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, SimError>;

    /// The most recent chain for `underlying` quoted at or before `timestamp`,
    /// optionally restricted to one expiration.
    fn load_options_chain(
        &self,
        underlying: &str,
        timestamp: DateTime<Utc>,
        expiration: Option<NaiveDate>,
    ) -> Result<Option<OptionsChain>, SimError>;

    fn create_run(&self, record: &RunRecord) -> Result<(), SimError>;

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), SimError>;

    fn update_run_results(&self, run_id: &str, results: &RunResults) -> Result<(), SimError>;

    fn store_performance_snapshots(
        &self,
        run_id: &str,
        snapshots: &[PerformanceSnapshot],
    ) -> Result<usize, SimError>;

    fn store_signal_records(&self, records: &[SignalRecord]) -> Result<usize, SimError>;
}
