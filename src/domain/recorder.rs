//! Persistence of the run record and its performance snapshots.
//!
//! The run record is created exactly once and finalized exactly once.
//! Snapshot and finalization writes are best effort: a failing repository is
//! logged and the simulation carries on.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::config::RunConfiguration;
use super::error::SimError;
use super::run::{PerformanceSnapshot, RunRecord, RunResults, RunStatus};
use crate::ports::repository_port::Repository;

pub struct RunRecorder {
    repository: Arc<dyn Repository>,
    record: Option<RunRecord>,
    snapshots_written: usize,
}

impl RunRecorder {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            record: None,
            snapshots_written: 0,
        }
    }

    pub fn record(&self) -> Option<&RunRecord> {
        self.record.as_ref()
    }

    pub fn snapshots_written(&self) -> usize {
        self.snapshots_written
    }

    /// Persist a new `running` record. A second call is refused.
    pub fn create_run(
        &mut self,
        run_id: &str,
        config: &RunConfiguration,
        strategy_ids: &[&str],
    ) -> Result<&RunRecord, SimError> {
        if self.record.is_some() {
            return Err(SimError::RunState {
                reason: format!("run {run_id} already created"),
            });
        }

        let mut parameters = BTreeMap::new();
        parameters.insert("name".to_string(), config.name.clone().into());
        parameters.insert("symbols".to_string(), config.symbols.clone().into());
        parameters.insert(
            "commission_per_trade".to_string(),
            config.commission_per_trade.into(),
        );
        parameters.insert("commission_pct".to_string(), config.commission_pct.into());
        parameters.insert("slippage_pct".to_string(), config.slippage_pct.into());
        parameters.insert("max_positions".to_string(), config.max_positions.into());
        parameters.insert("enable_options".to_string(), config.enable_options.into());
        parameters.insert("enable_signals".to_string(), config.enable_signals.into());
        parameters.insert("metrics_cadence".to_string(), config.metrics_cadence.into());
        parameters.insert("risk_free_rate".to_string(), config.risk_free_rate.into());

        let record = RunRecord {
            run_id: run_id.to_string(),
            strategy_id: strategy_ids.join(","),
            start_date: config.start_date,
            end_date: config.end_date,
            initial_capital: config.initial_capital,
            final_capital: None,
            total_return: None,
            max_drawdown: None,
            sharpe_ratio: None,
            created_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            parameters,
            metadata: BTreeMap::new(),
        };

        self.repository.create_run(&record)?;
        info!(run_id = %record.run_id, strategies = %record.strategy_id, "run created");
        Ok(self.record.insert(record))
    }

    pub fn record_snapshots(&mut self, snapshots: &[PerformanceSnapshot]) {
        let Some(record) = &self.record else {
            return;
        };
        if snapshots.is_empty() {
            return;
        }
        match self
            .repository
            .store_performance_snapshots(&record.run_id, snapshots)
        {
            Ok(n) => {
                self.snapshots_written += n;
                debug!(run_id = %record.run_id, count = n, "snapshots stored");
            }
            Err(e) => {
                error!(run_id = %record.run_id, error = %e, "failed to store snapshots");
            }
        }
    }

    /// Write results (completed runs only) and the terminal status. Refused
    /// if the run was never created or is already terminal.
    pub fn finalize(
        &mut self,
        status: RunStatus,
        results: Option<RunResults>,
    ) -> Result<&RunRecord, SimError> {
        let record = self.record.as_mut().ok_or_else(|| SimError::RunState {
            reason: "run was never created".to_string(),
        })?;
        if record.status.is_terminal() {
            return Err(SimError::RunState {
                reason: format!("run {} already {}", record.run_id, record.status),
            });
        }

        if let Some(results) = results {
            if let Err(e) = self.repository.update_run_results(&record.run_id, &results) {
                error!(run_id = %record.run_id, error = %e, "failed to store run results");
            }
            record.final_capital = Some(results.final_capital);
            record.total_return = Some(results.total_return);
            record.max_drawdown = Some(results.max_drawdown);
            record.sharpe_ratio = Some(results.sharpe_ratio);
        }

        let completed_at = Utc::now();
        if let Err(e) =
            self.repository
                .update_run_status(&record.run_id, status, Some(completed_at))
        {
            error!(run_id = %record.run_id, error = %e, "failed to store run status");
        }
        record.status = status;
        record.completed_at = Some(completed_at);

        info!(run_id = %record.run_id, %status, "run finalized");
        Ok(record)
    }
}
