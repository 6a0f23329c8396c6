//! Strategy registration, lifecycle and per-tick dispatch.
//!
//! Strategies are invoked one at a time in registration order. A tick is not
//! complete until every running strategy has returned from it.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::context::{Cursor, RunEnvironment, StrategyContext};
use super::error::{SimError, StrategyError};
use super::event::MarketEvent;
use super::portfolio::Portfolio;
use super::run::PerformanceSnapshot;
use super::strategy::{Strategy, StrategyState};

struct Registration {
    id: String,
    strategy: Box<dyn Strategy>,
    context: StrategyContext,
    state: StrategyState,
    ticks_handled: usize,
    tick_failures: usize,
    cleaned_up: bool,
}

pub struct StrategyManager {
    env: Arc<RunEnvironment>,
    registrations: Vec<Registration>,
}

/// Run a strategy callback, turning a panic into an ordinary error.
fn guarded<F>(call: F) -> Result<(), StrategyError>
where
    F: FnOnce() -> Result<(), StrategyError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(StrategyError::new(format!("panic: {}", panic_message(&*payload)))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl StrategyManager {
    pub fn new(env: Arc<RunEnvironment>) -> Self {
        Self {
            env,
            registrations: Vec::new(),
        }
    }

    /// Register a strategy under a unique id and give it a fresh context.
    pub fn add(&mut self, id: &str, strategy: Box<dyn Strategy>) -> Result<(), SimError> {
        if self.contains(id) {
            return Err(SimError::DuplicateStrategy { id: id.to_string() });
        }
        let context = StrategyContext::new(id, Arc::clone(&self.env));
        self.registrations.push(Registration {
            id: id.to_string(),
            strategy,
            context,
            state: StrategyState::Created,
            ticks_handled: 0,
            tick_failures: 0,
            cleaned_up: false,
        });
        debug!(strategy_id = %id, "strategy registered");
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registrations.iter().any(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.id.as_str()).collect()
    }

    fn find(&self, id: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.id == id)
    }

    pub fn state(&self, id: &str) -> Option<StrategyState> {
        self.find(id).map(|r| r.state)
    }

    pub fn portfolio(&self, id: &str) -> Option<&Portfolio> {
        self.find(id).map(|r| r.context.portfolio())
    }

    pub fn context(&self, id: &str) -> Option<&StrategyContext> {
        self.find(id).map(|r| &r.context)
    }

    /// Ticks the strategy returned from successfully.
    pub fn ticks_handled(&self, id: &str) -> Option<usize> {
        self.find(id).map(|r| r.ticks_handled)
    }

    pub fn tick_failures(&self, id: &str) -> Option<usize> {
        self.find(id).map(|r| r.tick_failures)
    }

    /// Initialize every strategy in registration order. The first failure
    /// marks that strategy `Error` and is returned; strategies after it are
    /// not initialized.
    pub fn initialize_all(&mut self) -> Result<(), SimError> {
        for reg in &mut self.registrations {
            if reg.state != StrategyState::Created {
                continue;
            }
            let strategy = &mut reg.strategy;
            let context = &mut reg.context;
            match guarded(|| strategy.initialize(context)) {
                Ok(()) => {
                    reg.state = StrategyState::Running;
                    info!(strategy_id = %reg.id, "strategy initialized");
                }
                Err(e) => {
                    reg.state = StrategyState::Error;
                    error!(strategy_id = %reg.id, error = %e, "strategy initialization failed");
                    return Err(SimError::StrategyInitialization {
                        id: reg.id.clone(),
                        reason: e.message,
                    });
                }
            }
        }
        Ok(())
    }

    /// Deliver one tick to every running strategy. A failing strategy is
    /// logged and stays `Running`; the others are unaffected.
    pub fn dispatch(&mut self, event: &MarketEvent) {
        let cursor = Cursor {
            tick: event.tick,
            bar_index: event.bar_index,
            timestamp: event.timestamp,
        };
        for reg in &mut self.registrations {
            if !reg.state.is_running() {
                continue;
            }
            reg.context.set_cursor(cursor);

            let strategy = &mut reg.strategy;
            let context = &mut reg.context;
            match guarded(|| strategy.on_market_data(context, event)) {
                Ok(()) => reg.ticks_handled += 1,
                Err(e) => {
                    reg.tick_failures += 1;
                    warn!(
                        strategy_id = %reg.id,
                        tick = event.tick,
                        timestamp = %event.timestamp,
                        error = %e,
                        "strategy failed on tick"
                    );
                }
            }
        }
    }

    /// Revalue every strategy's portfolio at the tick's closes.
    pub fn mark_to_market(&mut self, timestamp: DateTime<Utc>, prices: &HashMap<String, f64>) {
        for reg in &mut self.registrations {
            reg.context.mark_to_market(timestamp, prices);
        }
    }

    pub fn performance_snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.registrations
            .iter()
            .map(|r| r.context.performance_snapshot())
            .collect()
    }

    /// Give every registration its cleanup call, whatever its state. Each
    /// strategy is cleaned up at most once.
    pub fn cleanup_all(&mut self) {
        for reg in &mut self.registrations {
            if reg.cleaned_up {
                continue;
            }
            reg.cleaned_up = true;

            let strategy = &mut reg.strategy;
            let context = &mut reg.context;
            match guarded(|| strategy.cleanup(context)) {
                Ok(()) => {
                    if reg.state != StrategyState::Error {
                        reg.state = StrategyState::Stopped;
                    }
                    debug!(strategy_id = %reg.id, state = %reg.state, "strategy cleaned up");
                }
                Err(e) => {
                    reg.state = StrategyState::Error;
                    error!(strategy_id = %reg.id, error = %e, "strategy cleanup failed");
                }
            }
        }
    }
}
