//! The simulation orchestrator: one clock, one data cursor, many strategies.
//!
//! ```text
//! build ──> add_strategy* ──> run
//!                              │ create run record
//!                              │ initialize_all ──(fail)──> finalize(failed)
//!                              ▼
//!            ┌──> pause? ──> return Paused (run() again to continue)
//!            │    stop? / exhausted / past end_date ──> finalize(completed)
//!            │    event = bars stamped at the reference time
//!            │    dispatch ──> mark to market ──> snapshot every N ticks
//!            │    (panic outside a strategy) ──> finalize(failed)
//!            └──── index += 1
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cache::MarketDataCache;
use super::config::RunConfiguration;
use super::context::RunEnvironment;
use super::error::SimError;
use super::event::MarketEvent;
use super::manager::{panic_message, StrategyManager};
use super::metrics::PerformanceMetrics;
use super::portfolio::{EquityPoint, Portfolio};
use super::recorder::RunRecorder;
use super::run::{RunRecord, RunResults, RunStatus};
use super::signal::SignalRegistry;
use super::strategy::{Strategy, StrategyState};
use crate::adapters::simulated_orders::SimulatedOrderProcessor;
use crate::ports::order_port::OrderProcessor;
use crate::ports::repository_port::Repository;

/// Cloneable handle for pausing or stopping a run from outside the loop.
/// Flags are only looked at between ticks.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Clock and progress, owned and advanced only by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub current_time: Option<DateTime<Utc>>,
    pub current_bar_index: usize,
    pub total_bars: usize,
    pub ticks_processed: usize,
    pub running: bool,
    pub paused: bool,
    pub initialized: bool,
    /// Set once the run has been finalized.
    pub status: Option<RunStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub id: String,
    pub state: StrategyState,
    pub final_value: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub ticks_handled: usize,
    pub tick_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub ticks_processed: usize,
    /// Bar index the clock stopped at.
    pub final_bar_index: usize,
    pub results: RunResults,
    pub strategies: Vec<StrategySummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Paused { ticks_processed: usize },
    Finished(RunSummary),
}

pub struct SimulationEngineBuilder {
    config: RunConfiguration,
    repository: Option<Arc<dyn Repository>>,
    orders: Option<Arc<dyn OrderProcessor>>,
    signals: Option<Arc<SignalRegistry>>,
    control: RunControl,
    run_id: Option<String>,
}

impl SimulationEngineBuilder {
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn order_processor(mut self, orders: Arc<dyn OrderProcessor>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn signals(mut self, signals: Arc<SignalRegistry>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Validate the configuration and load the market data cache.
    pub fn build(self) -> Result<SimulationEngine, SimError> {
        self.config.validate()?;
        let repository = self.repository.ok_or_else(|| SimError::RunState {
            reason: "no repository configured".to_string(),
        })?;

        let orders = self
            .orders
            .unwrap_or_else(|| Arc::new(SimulatedOrderProcessor::from_config(&self.config)));
        let signals = self
            .signals
            .unwrap_or_else(|| Arc::new(SignalRegistry::empty()));
        let run_id = self
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let cache = MarketDataCache::load(
            repository.as_ref(),
            &self.config.symbols,
            self.config.window_start(),
            self.config.window_end(),
        );
        if cache.is_empty() {
            warn!(%run_id, "no market data for any symbol in the window");
        }

        let state = RunState {
            total_bars: cache.total_bars(),
            ..RunState::default()
        };
        info!(
            %run_id,
            symbols = cache.symbols().count(),
            total_bars = state.total_bars,
            reference = cache.reference_symbol().unwrap_or("-"),
            "engine ready"
        );

        let env = Arc::new(RunEnvironment {
            run_id,
            config: self.config,
            cache,
            repository: Arc::clone(&repository),
            orders,
            signals,
        });

        Ok(SimulationEngine {
            manager: StrategyManager::new(Arc::clone(&env)),
            recorder: RunRecorder::new(repository),
            env,
            state,
            control: self.control,
        })
    }
}

pub struct SimulationEngine {
    env: Arc<RunEnvironment>,
    manager: StrategyManager,
    recorder: RunRecorder,
    state: RunState,
    control: RunControl,
}

impl SimulationEngine {
    pub fn builder(config: RunConfiguration) -> SimulationEngineBuilder {
        SimulationEngineBuilder {
            config,
            repository: None,
            orders: None,
            signals: None,
            control: RunControl::default(),
            run_id: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.env.run_id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.env.config
    }

    pub fn cache(&self) -> &MarketDataCache {
        &self.env.cache
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn manager(&self) -> &StrategyManager {
        &self.manager
    }

    pub fn record(&self) -> Option<&RunRecord> {
        self.recorder.record()
    }

    /// Register a strategy. Only allowed before the run starts.
    pub fn add_strategy(&mut self, id: &str, strategy: Box<dyn Strategy>) -> Result<(), SimError> {
        if self.state.initialized || self.state.status.is_some() {
            return Err(SimError::RunState {
                reason: format!("cannot add strategy {id} after the run has started"),
            });
        }
        self.manager.add(id, strategy)
    }

    /// Drive the run until it finishes or is paused. Calling `run` on a
    /// paused engine continues from the next tick once the control has
    /// been resumed.
    pub fn run(&mut self) -> Result<RunOutcome, SimError> {
        if let Some(status) = self.state.status {
            return Err(SimError::RunState {
                reason: format!("run {} already {status}", self.env.run_id),
            });
        }

        if !self.state.initialized {
            self.start()?;
        }
        self.state.running = true;

        let window_end = self.env.config.window_end();
        let cadence = self.env.config.metrics_cadence.max(1);

        while self.state.current_bar_index < self.state.total_bars {
            if self.control.stop_requested() {
                info!(run_id = %self.env.run_id, tick = self.state.ticks_processed, "stop requested");
                break;
            }
            if self.control.is_paused() {
                self.state.paused = true;
                self.state.running = false;
                info!(run_id = %self.env.run_id, tick = self.state.ticks_processed, "run paused");
                return Ok(RunOutcome::Paused {
                    ticks_processed: self.state.ticks_processed,
                });
            }
            self.state.paused = false;

            let index = self.state.current_bar_index;
            let Some(timestamp) = self.reference_time(index) else {
                break;
            };
            if timestamp > window_end {
                debug!(run_id = %self.env.run_id, %timestamp, "past end of window");
                break;
            }

            let stepped =
                panic::catch_unwind(AssertUnwindSafe(|| self.step(index, timestamp, cadence)));
            if let Err(payload) = stepped {
                let reason = panic_message(&*payload);
                error!(
                    run_id = %self.env.run_id,
                    tick = self.state.ticks_processed + 1,
                    %reason,
                    "run aborted"
                );
                self.finalize(RunStatus::Failed);
                return Err(SimError::RunAborted {
                    run_id: self.env.run_id.clone(),
                    reason,
                });
            }
        }

        Ok(RunOutcome::Finished(self.finalize(RunStatus::Completed)))
    }

    /// One tick: dispatch, mark to market, snapshot, advance the clock.
    fn step(&mut self, index: usize, timestamp: DateTime<Utc>, cadence: usize) {
        self.state.current_time = Some(timestamp);

        let tick = self.state.ticks_processed + 1;
        let event = MarketEvent {
            tick,
            bar_index: index,
            timestamp,
            bars: self.env.cache.bars_on(timestamp),
        };

        self.manager.dispatch(&event);

        let prices: HashMap<String, f64> = event
            .bars
            .iter()
            .map(|(symbol, bar)| (symbol.clone(), bar.close))
            .collect();
        self.manager.mark_to_market(timestamp, &prices);
        self.state.ticks_processed = tick;

        if tick % cadence == 0 {
            let snapshots = self.manager.performance_snapshots();
            self.recorder.record_snapshots(&snapshots);
        }

        self.state.current_bar_index += 1;
        self.state.current_time = self
            .reference_time(self.state.current_bar_index)
            .or(self.state.current_time);
    }

    fn start(&mut self) -> Result<(), SimError> {
        let ids: Vec<String> = self.manager.ids().iter().map(|s| s.to_string()).collect();
        if ids.is_empty() {
            warn!(run_id = %self.env.run_id, "no strategies registered");
        }
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.recorder
            .create_run(&self.env.run_id, &self.env.config, &id_refs)?;

        if let Err(e) = self.manager.initialize_all() {
            error!(run_id = %self.env.run_id, error = %e, "initialization failed, aborting run");
            self.finalize(RunStatus::Failed);
            return Err(e);
        }

        self.state.initialized = true;
        self.state.current_time = self.reference_time(0);
        info!(run_id = %self.env.run_id, strategies = ids.len(), "run started");
        Ok(())
    }

    fn reference_time(&self, index: usize) -> Option<DateTime<Utc>> {
        let symbol = self.env.cache.reference_symbol()?;
        self.env.cache.bar_at(symbol, index).map(|bar| bar.timestamp)
    }

    /// Clean up every strategy, then close the run record.
    fn finalize(&mut self, status: RunStatus) -> RunSummary {
        self.manager.cleanup_all();

        let results = self.combined_results();
        let stored_results = (status == RunStatus::Completed).then(|| results.clone());
        if let Err(e) = self.recorder.finalize(status, stored_results) {
            error!(run_id = %self.env.run_id, error = %e, "failed to finalize run record");
        }

        self.state.running = false;
        self.state.paused = false;
        self.state.status = Some(status);

        let summary = RunSummary {
            run_id: self.env.run_id.clone(),
            status,
            ticks_processed: self.state.ticks_processed,
            final_bar_index: self.state.current_bar_index,
            results,
            strategies: self.strategy_summaries(),
        };
        info!(
            run_id = %summary.run_id,
            %status,
            ticks = summary.ticks_processed,
            final_capital = summary.results.final_capital,
            total_return = summary.results.total_return,
            "run finished"
        );
        summary
    }

    fn strategy_summaries(&self) -> Vec<StrategySummary> {
        self.manager
            .ids()
            .into_iter()
            .filter_map(|id| {
                let context = self.manager.context(id)?;
                let metrics = context.performance_metrics();
                Some(StrategySummary {
                    id: id.to_string(),
                    state: self.manager.state(id)?,
                    final_value: context.portfolio().total_value,
                    total_return: metrics.total_return,
                    max_drawdown: metrics.max_drawdown,
                    sharpe_ratio: metrics.sharpe_ratio,
                    ticks_handled: self.manager.ticks_handled(id)?,
                    tick_failures: self.manager.tick_failures(id)?,
                })
            })
            .collect()
    }

    /// Results over the sum of every strategy's portfolio.
    fn combined_results(&self) -> RunResults {
        let portfolios: Vec<&Portfolio> = self
            .manager
            .ids()
            .into_iter()
            .filter_map(|id| self.manager.portfolio(id))
            .collect();

        if portfolios.is_empty() {
            return RunResults {
                final_capital: self.env.config.initial_capital,
                total_return: 0.0,
                max_drawdown: 0.0,
                sharpe_ratio: 0.0,
            };
        }

        let initial: f64 = portfolios.iter().map(|p| p.initial_capital).sum();
        let final_capital: f64 = portfolios.iter().map(|p| p.total_value).sum();

        let points = portfolios
            .iter()
            .map(|p| p.equity_curve.len())
            .min()
            .unwrap_or(0);
        let equity_curve: Vec<EquityPoint> = (0..points)
            .map(|i| EquityPoint {
                timestamp: portfolios[0].equity_curve[i].timestamp,
                equity: portfolios.iter().map(|p| p.equity_curve[i].equity).sum(),
            })
            .collect();

        let mut combined = Portfolio::new(initial);
        combined.cash = final_capital;
        combined.total_value = final_capital;
        combined.equity_curve = equity_curve;
        let metrics = PerformanceMetrics::compute(&combined, self.env.config.risk_free_rate);

        RunResults {
            final_capital,
            total_return: metrics.total_return,
            max_drawdown: metrics.max_drawdown,
            sharpe_ratio: metrics.sharpe_ratio,
        }
    }
}
