//! SQLite repository.
//!
//! Timestamps are stored as fixed-width UTC text (`%Y-%m-%dT%H:%M:%S%.6fZ`)
//! so that range predicates compare correctly as strings.

use crate::domain::bar::MarketBar;
use crate::domain::error::SimError;
use crate::domain::options::{OptionContract, OptionType, OptionsChain};
use crate::domain::run::{PerformanceSnapshot, RunRecord, RunResults, RunStatus};
use crate::domain::signal::SignalRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::repository_port::Repository;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn conversion_error(text: &str, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(text.len(), rusqlite::types::Type::Text, Box::new(err))
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    NaiveDateTime::parse_from_str(text, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(text, e))
}

fn parse_date(text: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| conversion_error(text, e))
}

fn parse_json_map(text: &str) -> Result<BTreeMap<String, serde_json::Value>, rusqlite::Error> {
    serde_json::from_str(text).map_err(|e| conversion_error(text, e))
}

fn to_json(map: &BTreeMap<String, serde_json::Value>) -> Result<String, SimError> {
    serde_json::to_string(map).map_err(|e| SimError::DatabaseQuery {
        reason: e.to_string(),
    })
}

fn query_error(e: rusqlite::Error) -> SimError {
    SimError::DatabaseQuery {
        reason: e.to_string(),
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SimError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| SimError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| SimError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SimError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| SimError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SimError> {
        self.pool.get().map_err(|e: r2d2::Error| SimError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), SimError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                adj_close REAL NOT NULL,
                PRIMARY KEY (symbol, ts)
            );
            CREATE TABLE IF NOT EXISTS option_quotes (
                underlying TEXT NOT NULL,
                quoted_at TEXT NOT NULL,
                symbol TEXT NOT NULL,
                expiration TEXT NOT NULL,
                strike REAL NOT NULL,
                option_type TEXT NOT NULL,
                bid REAL NOT NULL,
                ask REAL NOT NULL,
                last REAL NOT NULL,
                volume INTEGER NOT NULL,
                open_interest INTEGER NOT NULL,
                implied_volatility REAL,
                delta REAL,
                PRIMARY KEY (underlying, quoted_at, symbol)
            );
            CREATE INDEX IF NOT EXISTS idx_option_quotes_time ON option_quotes(underlying, quoted_at);
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                strategy_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                initial_capital REAL NOT NULL,
                final_capital REAL,
                total_return REAL,
                max_drawdown REAL,
                sharpe_ratio REAL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL,
                parameters TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS performance_snapshots (
                run_id TEXT NOT NULL REFERENCES runs(run_id),
                strategy_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                bar_index INTEGER NOT NULL,
                ts TEXT NOT NULL,
                cash REAL NOT NULL,
                positions_value REAL NOT NULL,
                total_value REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                total_return REAL NOT NULL,
                max_drawdown REAL NOT NULL,
                sharpe_ratio REAL NOT NULL,
                position_count INTEGER NOT NULL,
                PRIMARY KEY (run_id, strategy_id, tick)
            );
            CREATE TABLE IF NOT EXISTS signal_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                signal_name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                ts TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                price REAL NOT NULL,
                parameters TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signal_records_run ON signal_records(run_id);",
        )
        .map_err(query_error)?;

        Ok(())
    }

    pub fn insert_bars(&self, bars: &[MarketBar]) -> Result<usize, SimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (symbol, ts, open, high, low, close, volume, adj_close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    bar.symbol,
                    fmt_ts(bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.adj_close
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(bars.len())
    }

    pub fn insert_option_quotes(
        &self,
        quoted_at: DateTime<Utc>,
        contracts: &[OptionContract],
    ) -> Result<usize, SimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for c in contracts {
            tx.execute(
                "INSERT OR REPLACE INTO option_quotes (underlying, quoted_at, symbol, expiration,
                    strike, option_type, bid, ask, last, volume, open_interest, implied_volatility, delta)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    c.underlying,
                    fmt_ts(quoted_at),
                    c.symbol,
                    c.expiration.format(DATE_FORMAT).to_string(),
                    c.strike,
                    c.option_type.to_string(),
                    c.bid,
                    c.ask,
                    c.last,
                    c.volume,
                    c.open_interest,
                    c.implied_volatility,
                    c.delta
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(contracts.len())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, SimError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT run_id, strategy_id, start_date, end_date, initial_capital, final_capital,
                    total_return, max_drawdown, sharpe_ratio, created_at, completed_at, status,
                    parameters, metadata
             FROM runs WHERE run_id = ?1",
            params![run_id],
            |row| {
                let start: String = row.get(2)?;
                let end: String = row.get(3)?;
                let created: String = row.get(9)?;
                let completed: Option<String> = row.get(10)?;
                let status: String = row.get(11)?;
                let parameters: String = row.get(12)?;
                let metadata: String = row.get(13)?;
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    strategy_id: row.get(1)?,
                    start_date: parse_date(&start)?,
                    end_date: parse_date(&end)?,
                    initial_capital: row.get(4)?,
                    final_capital: row.get(5)?,
                    total_return: row.get(6)?,
                    max_drawdown: row.get(7)?,
                    sharpe_ratio: row.get(8)?,
                    created_at: parse_ts(&created)?,
                    completed_at: completed.as_deref().map(parse_ts).transpose()?,
                    status: RunStatus::parse(&status).ok_or_else(|| {
                        conversion_error(
                            &status,
                            SimError::DatabaseQuery {
                                reason: format!("unknown run status {status}"),
                            },
                        )
                    })?,
                    parameters: parse_json_map(&parameters)?,
                    metadata: parse_json_map(&metadata)?,
                })
            },
        )
        .optional()
        .map_err(query_error)
    }

    pub fn count_snapshots(&self, run_id: &str) -> Result<usize, SimError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM performance_snapshots WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count as usize)
    }

    pub fn count_signal_records(&self, run_id: &str) -> Result<usize, SimError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM signal_records WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count as usize)
    }
}

impl Repository for SqliteAdapter {
    fn load_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketBar>, SimError> {
        let conn = self.conn()?;

        let query = "SELECT symbol, ts, open, high, low, close, volume, adj_close
                     FROM bars
                     WHERE symbol = ?1 AND ts >= ?2 AND ts <= ?3
                     ORDER BY ts ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;

        let rows = stmt
            .query_map(params![symbol, fmt_ts(start), fmt_ts(end)], |row| {
                let ts: String = row.get(1)?;
                Ok(MarketBar {
                    symbol: row.get(0)?,
                    timestamp: parse_ts(&ts)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                    adj_close: row.get(7)?,
                })
            })
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_error)?);
        }

        Ok(bars)
    }

    fn load_options_chain(
        &self,
        underlying: &str,
        timestamp: DateTime<Utc>,
        expiration: Option<NaiveDate>,
    ) -> Result<Option<OptionsChain>, SimError> {
        let conn = self.conn()?;

        let quoted_at: Option<String> = conn
            .query_row(
                "SELECT MAX(quoted_at) FROM option_quotes WHERE underlying = ?1 AND quoted_at <= ?2",
                params![underlying, fmt_ts(timestamp)],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        let Some(quoted_at) = quoted_at else {
            return Ok(None);
        };

        let expiration = expiration.map(|d| d.format(DATE_FORMAT).to_string());
        let mut stmt = conn
            .prepare(
                "SELECT symbol, expiration, strike, option_type, bid, ask, last, volume,
                        open_interest, implied_volatility, delta
                 FROM option_quotes
                 WHERE underlying = ?1 AND quoted_at = ?2 AND (?3 IS NULL OR expiration = ?3)
                 ORDER BY expiration, strike, option_type",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![underlying, quoted_at, expiration], |row| {
                let exp: String = row.get(1)?;
                let kind: String = row.get(3)?;
                Ok(OptionContract {
                    symbol: row.get(0)?,
                    underlying: underlying.to_string(),
                    expiration: parse_date(&exp)?,
                    strike: row.get(2)?,
                    option_type: OptionType::parse(&kind).ok_or_else(|| {
                        conversion_error(
                            &kind,
                            SimError::DatabaseQuery {
                                reason: format!("unknown option type {kind}"),
                            },
                        )
                    })?,
                    bid: row.get(4)?,
                    ask: row.get(5)?,
                    last: row.get(6)?,
                    volume: row.get(7)?,
                    open_interest: row.get(8)?,
                    implied_volatility: row.get(9)?,
                    delta: row.get(10)?,
                })
            })
            .map_err(query_error)?;

        let mut contracts = Vec::new();
        for row in rows {
            contracts.push(row.map_err(query_error)?);
        }
        if contracts.is_empty() {
            return Ok(None);
        }

        Ok(Some(OptionsChain {
            underlying: underlying.to_string(),
            timestamp: parse_ts(&quoted_at).map_err(query_error)?,
            contracts,
        }))
    }

    fn create_run(&self, record: &RunRecord) -> Result<(), SimError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (run_id, strategy_id, start_date, end_date, initial_capital,
                final_capital, total_return, max_drawdown, sharpe_ratio, created_at, completed_at,
                status, parameters, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.run_id,
                record.strategy_id,
                record.start_date.format(DATE_FORMAT).to_string(),
                record.end_date.format(DATE_FORMAT).to_string(),
                record.initial_capital,
                record.final_capital,
                record.total_return,
                record.max_drawdown,
                record.sharpe_ratio,
                fmt_ts(record.created_at),
                record.completed_at.map(fmt_ts),
                record.status.as_str(),
                to_json(&record.parameters)?,
                to_json(&record.metadata)?
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), SimError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE runs SET status = ?2, completed_at = ?3 WHERE run_id = ?1",
                params![run_id, status.as_str(), completed_at.map(fmt_ts)],
            )
            .map_err(query_error)?;
        if updated == 0 {
            return Err(SimError::DatabaseQuery {
                reason: format!("unknown run {run_id}"),
            });
        }
        Ok(())
    }

    fn update_run_results(&self, run_id: &str, results: &RunResults) -> Result<(), SimError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE runs SET final_capital = ?2, total_return = ?3, max_drawdown = ?4,
                    sharpe_ratio = ?5
                 WHERE run_id = ?1",
                params![
                    run_id,
                    results.final_capital,
                    results.total_return,
                    results.max_drawdown,
                    results.sharpe_ratio
                ],
            )
            .map_err(query_error)?;
        if updated == 0 {
            return Err(SimError::DatabaseQuery {
                reason: format!("unknown run {run_id}"),
            });
        }
        Ok(())
    }

    fn store_performance_snapshots(
        &self,
        run_id: &str,
        snapshots: &[PerformanceSnapshot],
    ) -> Result<usize, SimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for s in snapshots {
            tx.execute(
                "INSERT OR REPLACE INTO performance_snapshots (run_id, strategy_id, tick, bar_index,
                    ts, cash, positions_value, total_value, realized_pnl, unrealized_pnl,
                    total_return, max_drawdown, sharpe_ratio, position_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    run_id,
                    s.strategy_id,
                    s.tick as i64,
                    s.bar_index as i64,
                    fmt_ts(s.timestamp),
                    s.cash,
                    s.positions_value,
                    s.total_value,
                    s.realized_pnl,
                    s.unrealized_pnl,
                    s.total_return,
                    s.max_drawdown,
                    s.sharpe_ratio,
                    s.position_count as i64
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(snapshots.len())
    }

    fn store_signal_records(&self, records: &[SignalRecord]) -> Result<usize, SimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for r in records {
            tx.execute(
                "INSERT INTO signal_records (run_id, strategy_id, signal_name, symbol, ts,
                    signal_type, confidence, price, parameters, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    r.run_id,
                    r.strategy_id,
                    r.signal_name,
                    r.symbol,
                    fmt_ts(r.timestamp),
                    r.signal_type.as_str(),
                    r.confidence,
                    r.price,
                    to_json(&r.parameters)?,
                    to_json(&r.metadata)?
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::SignalType;
    use chrono::{Duration, TimeZone};

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
        fn sections(&self) -> Vec<String> {
            Vec::new()
        }
        fn keys(&self, _section: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn bar(symbol: &str, day: i64, close: f64) -> MarketBar {
        MarketBar {
            symbol: symbol.to_string(),
            timestamp: ts(day),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            adj_close: close,
        }
    }

    fn record(run_id: &str) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            strategy_id: "a,b".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            initial_capital: 100_000.0,
            final_capital: None,
            total_return: None,
            max_drawdown: None,
            sharpe_ratio: None,
            created_at: ts(0),
            completed_at: None,
            status: RunStatus::Running,
            parameters: BTreeMap::from([("name".to_string(), serde_json::json!("test"))]),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = EmptyConfig;
        let result = SqliteAdapter::from_config(&config);
        match result {
            Err(SimError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn in_memory_initialization_is_idempotent() {
        let adapter = adapter();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn load_bars_in_window_and_order() {
        let adapter = adapter();
        adapter
            .insert_bars(&[bar("SPY", 2, 102.0), bar("SPY", 0, 100.0), bar("SPY", 1, 101.0)])
            .unwrap();

        let all = adapter.load_bars("SPY", ts(0), ts(5)).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, ts(0));
        assert_eq!(all[2].close, 102.0);

        let part = adapter.load_bars("SPY", ts(1), ts(1)).unwrap();
        assert_eq!(part.len(), 1);
        assert!(adapter.load_bars("QQQ", ts(0), ts(5)).unwrap().is_empty());
    }

    #[test]
    fn options_chain_latest_at_or_before() {
        let adapter = adapter();
        let exp = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        let contract = OptionContract {
            symbol: "SPY240216P00450000".into(),
            underlying: "SPY".into(),
            expiration: exp,
            strike: 450.0,
            option_type: OptionType::Put,
            bid: 3.0,
            ask: 3.2,
            last: 3.1,
            volume: 100,
            open_interest: 1000,
            implied_volatility: Some(0.2),
            delta: None,
        };
        adapter.insert_option_quotes(ts(1), &[contract.clone()]).unwrap();

        assert!(adapter.load_options_chain("SPY", ts(0), None).unwrap().is_none());
        let chain = adapter.load_options_chain("SPY", ts(3), None).unwrap().unwrap();
        assert_eq!(chain.timestamp, ts(1));
        assert_eq!(chain.contracts, vec![contract]);

        let other = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert!(
            adapter
                .load_options_chain("SPY", ts(3), Some(other))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn run_lifecycle_round_trip() {
        let adapter = adapter();
        adapter.create_run(&record("r1")).unwrap();
        assert!(adapter.create_run(&record("r1")).is_err());

        adapter
            .update_run_results(
                "r1",
                &RunResults {
                    final_capital: 105_000.0,
                    total_return: 0.05,
                    max_drawdown: 0.01,
                    sharpe_ratio: 1.5,
                },
            )
            .unwrap();
        adapter
            .update_run_status("r1", RunStatus::Completed, Some(ts(9)))
            .unwrap();

        let stored = adapter.get_run("r1").unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.completed_at, Some(ts(9)));
        assert_eq!(stored.final_capital, Some(105_000.0));
        assert_eq!(stored.strategy_ids(), vec!["a", "b"]);
        assert_eq!(stored.parameters.get("name"), Some(&serde_json::json!("test")));

        assert!(adapter.get_run("missing").unwrap().is_none());
        assert!(
            adapter
                .update_run_status("missing", RunStatus::Failed, None)
                .is_err()
        );
    }

    #[test]
    fn snapshots_and_signals_are_counted() {
        let adapter = adapter();
        adapter.create_run(&record("r1")).unwrap();

        let snap = PerformanceSnapshot {
            run_id: "r1".into(),
            strategy_id: "a".into(),
            tick: 5,
            bar_index: 4,
            timestamp: ts(4),
            cash: 50_000.0,
            positions_value: 50_500.0,
            total_value: 100_500.0,
            realized_pnl: 0.0,
            unrealized_pnl: 500.0,
            total_return: 0.005,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            position_count: 1,
        };
        let later = PerformanceSnapshot {
            tick: 10,
            bar_index: 9,
            ..snap.clone()
        };
        assert_eq!(adapter.store_performance_snapshots("r1", &[snap, later]).unwrap(), 2);
        assert_eq!(adapter.count_snapshots("r1").unwrap(), 2);

        let signal = SignalRecord {
            run_id: "r1".into(),
            strategy_id: "a".into(),
            signal_name: "momentum".into(),
            symbol: "SPY".into(),
            timestamp: ts(4),
            signal_type: SignalType::Buy,
            confidence: 0.7,
            price: 101.0,
            parameters: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        assert_eq!(adapter.store_signal_records(&[signal]).unwrap(), 1);
        assert_eq!(adapter.count_signal_records("r1").unwrap(), 1);
    }
}
