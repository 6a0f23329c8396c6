//! Per-strategy façade over the simulation environment.
//!
//! A context is bound to one (strategy, run) pair for its whole life. It owns
//! that strategy's portfolio, so no strategy can reach another's ledger.
//! Collaborator failures never surface as errors here: lookups come back
//! empty or `None` and the failure is logged.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::bar::MarketBar;
use super::cache::MarketDataCache;
use super::config::RunConfiguration;
use super::metrics::PerformanceMetrics;
use super::options::OptionsChain;
use super::order::{OrderId, OrderRequest, OrderTicket};
use super::portfolio::Portfolio;
use super::position::Position;
use super::run::PerformanceSnapshot;
use super::signal::{SignalInput, SignalOutput, SignalRecord, SignalRegistry};
use crate::ports::order_port::OrderProcessor;
use crate::ports::repository_port::Repository;

/// Everything shared, read-only, by all contexts of one run.
pub struct RunEnvironment {
    pub run_id: String,
    pub config: RunConfiguration,
    pub cache: MarketDataCache,
    pub repository: Arc<dyn Repository>,
    pub orders: Arc<dyn OrderProcessor>,
    pub signals: Arc<SignalRegistry>,
}

/// Position of the simulation clock as seen by one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub tick: usize,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
}

pub struct StrategyContext {
    strategy_id: String,
    env: Arc<RunEnvironment>,
    portfolio: Portfolio,
    cursor: Option<Cursor>,
}

impl StrategyContext {
    pub fn new(strategy_id: &str, env: Arc<RunEnvironment>) -> Self {
        let portfolio = Portfolio::new(env.config.initial_capital);
        Self {
            strategy_id: strategy_id.to_string(),
            env,
            portfolio,
            cursor: None,
        }
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    pub fn run_id(&self) -> &str {
        &self.env.run_id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.env.config
    }

    /// `None` until the first tick is delivered.
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        self.cursor.map(|c| c.timestamp)
    }

    pub(crate) fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = Some(cursor);
    }

    // --- market data ---

    /// Bars from the repository. `end` is clamped to the current simulation
    /// time so a strategy cannot read ahead of the clock.
    pub fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MarketBar> {
        let end = match self.cursor {
            Some(cursor) if cursor.timestamp < end => cursor.timestamp,
            _ => end,
        };
        if start > end {
            return Vec::new();
        }

        match self.env.repository.load_bars(symbol, start, end) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(
                    strategy_id = %self.strategy_id,
                    run_id = %self.env.run_id,
                    %symbol,
                    error = %e,
                    "historical bar lookup failed"
                );
                Vec::new()
            }
        }
    }

    /// The current bar for `symbol`, if a tick is in progress and the
    /// symbol has a bar stamped at the tick time.
    pub fn current_bar(&self, symbol: &str) -> Option<&MarketBar> {
        let cursor = self.cursor?;
        self.env.cache.bar_on(symbol, cursor.timestamp)
    }

    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.current_bar(symbol).map(|bar| bar.close)
    }

    pub fn options_chain(
        &self,
        underlying: &str,
        expiration: Option<NaiveDate>,
    ) -> Option<OptionsChain> {
        if !self.env.config.enable_options {
            return None;
        }
        let cursor = self.cursor?;

        match self
            .env
            .repository
            .load_options_chain(underlying, cursor.timestamp, expiration)
        {
            Ok(chain) => chain,
            Err(e) => {
                warn!(
                    strategy_id = %self.strategy_id,
                    run_id = %self.env.run_id,
                    %underlying,
                    error = %e,
                    "options chain lookup failed"
                );
                None
            }
        }
    }

    // --- signals ---

    /// Evaluate a registered signal against the current market state and
    /// persist what it produced.
    pub fn execute_signal(
        &self,
        name: &str,
        symbol: &str,
        parameters: Option<BTreeMap<String, Value>>,
    ) -> Option<SignalOutput> {
        if !self.env.config.enable_signals {
            debug!(strategy_id = %self.strategy_id, signal = %name, "signals disabled");
            return None;
        }
        let cursor = self.cursor?;
        let current_price = self.current_price(symbol)?;

        let lookback = self
            .env
            .cache
            .window_until(symbol, cursor.timestamp, self.env.config.signal_lookback)
            .to_vec();

        let input = SignalInput {
            run_id: self.env.run_id.clone(),
            strategy_id: self.strategy_id.clone(),
            symbol: symbol.to_string(),
            timestamp: cursor.timestamp,
            current_price,
            lookback,
            options_chain: self.options_chain(symbol, None),
            parameters: parameters.unwrap_or_default(),
        };

        let output = match self.env.signals.execute(name, &input) {
            Ok(Some(output)) => output,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    strategy_id = %self.strategy_id,
                    run_id = %self.env.run_id,
                    signal = %name,
                    %symbol,
                    error = %e,
                    "signal execution failed"
                );
                return None;
            }
        };

        let record = SignalRecord::from_evaluation(name, &input, &output);
        if let Err(e) = self.env.repository.store_signal_records(&[record]) {
            warn!(
                strategy_id = %self.strategy_id,
                run_id = %self.env.run_id,
                signal = %name,
                error = %e,
                "failed to persist signal record"
            );
        }

        Some(output)
    }

    // --- orders ---

    /// Hand an order to the order processor. Any fill it reports is settled
    /// into this strategy's portfolio before returning. An unfilled limit
    /// order is cancelled; resubmit it on a later tick to try again.
    pub fn submit_order(&mut self, request: OrderRequest) -> Option<OrderId> {
        if !(request.quantity.is_finite() && request.quantity > 0.0) {
            self.refuse(&request, "quantity must be positive");
            return None;
        }
        let Some(cursor) = self.cursor else {
            self.refuse(&request, "no tick in progress");
            return None;
        };
        let Some(market_price) = self.current_price(&request.symbol) else {
            self.refuse(&request, "no current price");
            return None;
        };
        if !self.portfolio.has_position(&request.symbol)
            && self.portfolio.position_count() >= self.env.config.max_positions
        {
            self.refuse(&request, "max_positions reached");
            return None;
        }

        let ticket = OrderTicket {
            run_id: self.env.run_id.clone(),
            strategy_id: self.strategy_id.clone(),
            request,
            timestamp: cursor.timestamp,
            market_price,
        };

        let ack = match self.env.orders.submit(&ticket) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    strategy_id = %self.strategy_id,
                    run_id = %self.env.run_id,
                    symbol = %ticket.request.symbol,
                    error = %e,
                    "order submission failed"
                );
                return None;
            }
        };

        if let Some(fill) = &ack.fill {
            let realized = self.portfolio.settle(fill);
            debug!(
                strategy_id = %self.strategy_id,
                order_id = %ack.order_id,
                symbol = %fill.symbol,
                side = %fill.side,
                quantity = fill.quantity,
                price = fill.price,
                realized,
                "order filled"
            );
        } else {
            debug!(
                strategy_id = %self.strategy_id,
                order_id = %ack.order_id,
                symbol = %ticket.request.symbol,
                "limit not marketable, order cancelled"
            );
        }

        Some(ack.order_id)
    }

    fn refuse(&self, request: &OrderRequest, reason: &str) {
        warn!(
            strategy_id = %self.strategy_id,
            run_id = %self.env.run_id,
            symbol = %request.symbol,
            side = %request.side,
            quantity = request.quantity,
            reason,
            "order refused"
        );
    }

    // --- portfolio ---

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.portfolio.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.portfolio.get_position(symbol)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::compute(&self.portfolio, self.env.config.risk_free_rate)
    }

    pub fn performance_snapshot(&self) -> PerformanceSnapshot {
        let metrics = self.performance_metrics();
        let (tick, bar_index, timestamp) = match self.cursor {
            Some(c) => (c.tick, c.bar_index, c.timestamp),
            None => (0, 0, self.env.config.window_start()),
        };
        PerformanceSnapshot {
            run_id: self.env.run_id.clone(),
            strategy_id: self.strategy_id.clone(),
            tick,
            bar_index,
            timestamp,
            cash: self.portfolio.cash,
            positions_value: self.portfolio.positions_value(),
            total_value: self.portfolio.total_value,
            realized_pnl: self.portfolio.realized_pnl,
            unrealized_pnl: self.portfolio.unrealized_pnl,
            total_return: metrics.total_return,
            max_drawdown: metrics.max_drawdown,
            sharpe_ratio: metrics.sharpe_ratio,
            position_count: self.portfolio.position_count(),
        }
    }

    /// Revalue this strategy's positions at the tick's closes.
    pub(crate) fn mark_to_market(&mut self, timestamp: DateTime<Utc>, prices: &HashMap<String, f64>) {
        self.portfolio.mark_to_market(timestamp, prices);
    }

    // --- logging ---

    pub fn log_info(&self, message: &str) {
        info!(target: "strategy", strategy_id = %self.strategy_id, run_id = %self.env.run_id, "{message}");
    }

    pub fn log_warning(&self, message: &str) {
        warn!(target: "strategy", strategy_id = %self.strategy_id, run_id = %self.env.run_id, "{message}");
    }

    pub fn log_error(&self, message: &str) {
        error!(target: "strategy", strategy_id = %self.strategy_id, run_id = %self.env.run_id, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repository::MemoryRepository;
    use crate::adapters::simulated_orders::SimulatedOrderProcessor;
    use crate::domain::error::SignalError;
    use crate::domain::options::{OptionContract, OptionType};
    use crate::domain::order::OrderSide;
    use crate::domain::signal::{SignalMetadata, SignalType};
    use chrono::{Duration, TimeZone};

    fn day(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i as i64)
    }

    fn bars(symbol: &str, count: usize, start_price: f64) -> Vec<MarketBar> {
        (0..count)
            .map(|i| MarketBar {
                symbol: symbol.to_string(),
                timestamp: day(i),
                open: start_price + i as f64,
                high: start_price + i as f64 + 1.0,
                low: start_price + i as f64 - 1.0,
                close: start_price + i as f64,
                volume: 1000,
                adj_close: start_price + i as f64,
            })
            .collect()
    }

    fn config() -> RunConfiguration {
        let mut config = RunConfiguration::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            vec!["AAPL".into(), "MSFT".into()],
        );
        config.initial_capital = 10_000.0;
        config.max_positions = 1;
        config.signal_lookback = 3;
        config
    }

    fn registry() -> SignalRegistry {
        SignalRegistry::builder()
            .register(
                "lookback_len",
                |input: &SignalInput| {
                    Ok(Some(
                        SignalOutput::new(SignalType::Hold, 0.5)
                            .with_metadata("bars", input.lookback.len() as u64)
                            .with_metadata("has_chain", input.options_chain.is_some()),
                    ))
                },
                SignalMetadata::new("reports look-back size", "test"),
            )
            .register(
                "broken",
                |_: &SignalInput| Err(SignalError::new("kaput")),
                SignalMetadata::default(),
            )
            .build()
            .unwrap()
    }

    fn context_with(config: RunConfiguration, repo: Arc<MemoryRepository>) -> StrategyContext {
        let cache = MarketDataCache::from_series(vec![
            ("AAPL".into(), bars("AAPL", 10, 100.0)),
            ("MSFT".into(), bars("MSFT", 5, 50.0)),
        ]);
        let env = RunEnvironment {
            run_id: "run-1".into(),
            orders: Arc::new(SimulatedOrderProcessor::from_config(&config)),
            config,
            cache,
            repository: repo,
            signals: Arc::new(registry()),
        };
        StrategyContext::new("alpha", Arc::new(env))
    }

    fn seeded_repo() -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new();
        repo.insert_bars(&bars("AAPL", 10, 100.0));
        Arc::new(repo)
    }

    fn at(ctx: &mut StrategyContext, index: usize) {
        ctx.set_cursor(Cursor {
            tick: index + 1,
            bar_index: index,
            timestamp: day(index),
        });
    }

    #[test]
    fn current_price_unavailable_before_first_tick() {
        let ctx = context_with(config(), seeded_repo());
        assert_eq!(ctx.current_price("AAPL"), None);
        assert!(ctx.current_time().is_none());
    }

    #[test]
    fn current_price_follows_cursor_and_history_end() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 2);
        assert_eq!(ctx.current_price("AAPL"), Some(102.0));
        assert_eq!(ctx.current_price("MSFT"), Some(52.0));

        at(&mut ctx, 7);
        assert_eq!(ctx.current_price("AAPL"), Some(107.0));
        assert_eq!(ctx.current_price("MSFT"), None);
        assert_eq!(ctx.current_price("TSLA"), None);
    }

    #[test]
    fn historical_bars_are_clamped_to_clock() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 3);
        let bars = ctx.historical_bars("AAPL", day(0), day(9));
        assert_eq!(bars.len(), 4);
        assert_eq!(bars.last().unwrap().timestamp, day(3));
    }

    #[test]
    fn historical_bars_failure_is_empty() {
        let repo = seeded_repo();
        repo.fail_with("connection reset");
        let mut ctx = context_with(config(), repo);
        at(&mut ctx, 3);
        assert!(ctx.historical_bars("AAPL", day(0), day(3)).is_empty());
    }

    #[test]
    fn options_disabled_is_unavailable() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 0);
        assert!(ctx.options_chain("AAPL", None).is_none());
    }

    #[test]
    fn options_chain_scoped_to_current_time() {
        let repo = seeded_repo();
        repo.insert_option_quotes(
            day(1),
            &[OptionContract {
                symbol: "AAPL240216C00105000".into(),
                underlying: "AAPL".into(),
                expiration: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
                strike: 105.0,
                option_type: OptionType::Call,
                bid: 2.0,
                ask: 2.2,
                last: 2.1,
                volume: 10,
                open_interest: 50,
                implied_volatility: Some(0.3),
                delta: Some(0.45),
            }],
        );
        let mut cfg = config();
        cfg.enable_options = true;
        let mut ctx = context_with(cfg, repo);

        at(&mut ctx, 0);
        assert!(ctx.options_chain("AAPL", None).is_none());

        at(&mut ctx, 2);
        let chain = ctx.options_chain("AAPL", None).unwrap();
        assert_eq!(chain.contracts.len(), 1);
        assert_eq!(chain.timestamp, day(1));
    }

    #[test]
    fn execute_signal_builds_lookback_and_persists() {
        let repo = seeded_repo();
        let mut ctx = context_with(config(), repo.clone());
        at(&mut ctx, 5);

        let out = ctx.execute_signal("lookback_len", "AAPL", None).unwrap();
        assert_eq!(out.metadata.get("bars"), Some(&serde_json::json!(3)));
        assert_eq!(out.metadata.get("has_chain"), Some(&serde_json::json!(false)));

        let records = repo.signal_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].strategy_id, "alpha");
        assert_eq!(records[0].run_id, "run-1");
        assert_eq!(records[0].price, 105.0);
    }

    #[test]
    fn execute_signal_unavailable_cases() {
        let repo = seeded_repo();
        let mut ctx = context_with(config(), repo.clone());
        assert!(ctx.execute_signal("lookback_len", "AAPL", None).is_none());

        at(&mut ctx, 1);
        assert!(ctx.execute_signal("broken", "AAPL", None).is_none());
        assert!(ctx.execute_signal("missing", "AAPL", None).is_none());
        assert!(ctx.execute_signal("lookback_len", "TSLA", None).is_none());
        assert!(repo.signal_records().is_empty());

        let mut cfg = config();
        cfg.enable_signals = false;
        let mut ctx = context_with(cfg, repo);
        at(&mut ctx, 1);
        assert!(ctx.execute_signal("lookback_len", "AAPL", None).is_none());
    }

    #[test]
    fn signal_persistence_failure_still_returns_output() {
        let repo = seeded_repo();
        let mut ctx = context_with(config(), repo.clone());
        at(&mut ctx, 1);
        repo.fail_with("disk full");
        assert!(ctx.execute_signal("lookback_len", "AAPL", None).is_some());
    }

    #[test]
    fn submit_order_settles_fill_into_own_portfolio() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 0);

        let id = ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 10.0));
        assert!(id.is_some());

        let pos = ctx.position("AAPL").unwrap();
        assert_eq!(pos.quantity, 10.0);
        assert!((ctx.portfolio().cash - 9_000.0).abs() < 1e-9);
        assert!((ctx.portfolio().total_value - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn unfilled_limit_does_not_rest_across_ticks() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 2);
        let id = ctx.submit_order(OrderRequest::limit("AAPL", OrderSide::Sell, 5.0, 103.5));
        assert!(id.is_some());
        assert!(ctx.position("AAPL").is_none());

        at(&mut ctx, 4);
        assert_eq!(ctx.current_price("AAPL"), Some(104.0));
        assert!(ctx.position("AAPL").is_none());
        assert!((ctx.portfolio().cash - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn submit_order_refusals() {
        let mut ctx = context_with(config(), seeded_repo());
        assert!(
            ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 1.0))
                .is_none()
        );

        at(&mut ctx, 0);
        assert!(
            ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 0.0))
                .is_none()
        );
        assert!(
            ctx.submit_order(OrderRequest::market("TSLA", OrderSide::Buy, 1.0))
                .is_none()
        );

        assert!(
            ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 1.0))
                .is_some()
        );
        // max_positions = 1
        assert!(
            ctx.submit_order(OrderRequest::market("MSFT", OrderSide::Buy, 1.0))
                .is_none()
        );
        // adding to an existing position is allowed
        assert!(
            ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 1.0))
                .is_some()
        );
        assert_eq!(ctx.positions().len(), 1);
    }

    #[test]
    fn snapshot_balances_cash_and_positions() {
        let mut ctx = context_with(config(), seeded_repo());
        at(&mut ctx, 0);
        ctx.submit_order(OrderRequest::market("AAPL", OrderSide::Buy, 10.0));

        at(&mut ctx, 4);
        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), 104.0);
        ctx.mark_to_market(day(4), &prices);

        let snap = ctx.performance_snapshot();
        assert_eq!(snap.tick, 5);
        assert_eq!(snap.bar_index, 4);
        assert!((snap.cash + snap.positions_value - snap.total_value).abs() < 1e-9);
        assert!((snap.total_value - 10_040.0).abs() < 1e-9);
        assert_eq!(snap.position_count, 1);
    }

    #[test]
    fn logging_has_no_side_effects() {
        let ctx = context_with(config(), seeded_repo());
        ctx.log_info("hello");
        ctx.log_warning("careful");
        ctx.log_error("oops");
        assert_eq!(ctx.portfolio().fill_count, 0);
    }
}
