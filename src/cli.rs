//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_repository::MemoryRepository;
use crate::domain::bar::MarketBar;
use crate::domain::config::RunConfiguration;
use crate::domain::config_validation::{build_run_config, validate_run_config};
use crate::domain::engine::{RunOutcome, RunSummary, SimulationEngine};
use crate::domain::error::SimError;
use crate::domain::signal::SignalRegistry;
use crate::ports::config_port::ConfigPort;
use crate::ports::repository_port::Repository;
use crate::signals;
use crate::strategies;

#[derive(Parser, Debug)]
#[command(name = "barreplay", about = "Bar-by-bar historical strategy replay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay the configured window through the configured strategies
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Read bars from `<SYMBOL>.csv` files instead of the database
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Run only these strategy ids (repeatable)
        #[arg(long = "only")]
        only: Vec<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a run configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Import bars for one symbol from a CSV file into the database
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// List the built-in signal functions
    Signals,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            data_dir,
            only,
            json,
        } => run_replay(&config, data_dir.as_deref(), &only, json),
        Command::Validate { config } => run_validate(&config),
        Command::Import {
            config,
            symbol,
            file,
        } => run_import(&config, &symbol, &file),
        Command::Signals => run_signals(),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: &SimError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn builtin_signals() -> Result<SignalRegistry, SimError> {
    signals::builtin_builder().build()
}

/// Bars from CSV files for every configured symbol, held in memory.
fn csv_repository(dir: &Path, symbols: &[String]) -> Result<MemoryRepository, SimError> {
    let csv = CsvAdapter::new(dir.to_path_buf());
    let repository = MemoryRepository::new();
    let mut loaded = 0;
    for symbol in symbols {
        match csv.load_symbol(symbol) {
            Ok(bars) => {
                eprintln!("Loaded {} bars for {}", bars.len(), symbol);
                loaded += repository.insert_bars(&bars);
            }
            Err(e) => eprintln!("warning: {symbol}: {e}"),
        }
    }
    if loaded == 0 {
        return Err(SimError::NoData {
            symbol: symbols.join(","),
        });
    }
    Ok(repository)
}

#[cfg(feature = "sqlite")]
fn database_repository(config: &dyn ConfigPort) -> Result<Arc<dyn Repository>, SimError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn database_repository(_config: &dyn ConfigPort) -> Result<Arc<dyn Repository>, SimError> {
    Err(SimError::Database {
        reason: "sqlite feature is required without --data-dir".to_string(),
    })
}

fn select_strategy_ids(config: &dyn ConfigPort, only: &[String]) -> Result<Vec<String>, SimError> {
    let configured = strategies::strategy_ids(config);
    if only.is_empty() {
        return Ok(configured);
    }
    only.iter()
        .map(|id| {
            let id = id.to_lowercase();
            if configured.contains(&id) {
                Ok(id)
            } else {
                Err(SimError::UnknownStrategy { id })
            }
        })
        .collect()
}

fn build_engine(
    adapter: &dyn ConfigPort,
    run_config: RunConfiguration,
    repository: Arc<dyn Repository>,
    strategy_ids: &[String],
) -> Result<SimulationEngine, SimError> {
    let registry = Arc::new(builtin_signals()?);
    let mut engine = SimulationEngine::builder(run_config)
        .repository(repository)
        .signals(Arc::clone(&registry))
        .build()?;

    for id in strategy_ids {
        let strategy = strategies::build_strategy(adapter, id, &registry)?;
        engine.add_strategy(id, strategy)?;
    }
    Ok(engine)
}

fn print_summary(summary: &RunSummary) {
    println!("run:      {}", summary.run_id);
    println!("status:   {}", summary.status);
    println!("ticks:    {}", summary.ticks_processed);
    println!("capital:  {:.2}", summary.results.final_capital);
    println!("return:   {:.2}%", summary.results.total_return * 100.0);
    println!("drawdown: {:.2}%", summary.results.max_drawdown * 100.0);
    println!("sharpe:   {:.3}", summary.results.sharpe_ratio);
    println!();
    println!(
        "{:<16} {:<8} {:>14} {:>9} {:>9} {:>7} {:>6}",
        "strategy", "state", "value", "return", "drawdown", "sharpe", "fails"
    );
    for s in &summary.strategies {
        println!(
            "{:<16} {:<8} {:>14.2} {:>8.2}% {:>8.2}% {:>7.3} {:>6}",
            s.id,
            s.state.to_string(),
            s.final_value,
            s.total_return * 100.0,
            s.max_drawdown * 100.0,
            s.sharpe_ratio,
            s.tick_failures
        );
    }
}

fn run_replay(config_path: &Path, data_dir: Option<&Path>, only: &[String], json: bool) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter) {
        return fail(&e);
    }
    let run_config = match build_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let strategy_ids = match select_strategy_ids(&adapter, only) {
        Ok(ids) => ids,
        Err(e) => return fail(&e),
    };

    let repository: Arc<dyn Repository> = match data_dir {
        Some(dir) => match csv_repository(dir, &run_config.symbols) {
            Ok(r) => Arc::new(r),
            Err(e) => return fail(&e),
        },
        None => match database_repository(&adapter) {
            Ok(r) => r,
            Err(e) => return fail(&e),
        },
    };

    eprintln!(
        "Replaying {} to {} for {} strateg{}...",
        run_config.start_date,
        run_config.end_date,
        strategy_ids.len(),
        if strategy_ids.len() == 1 { "y" } else { "ies" }
    );
    let mut engine = match build_engine(&adapter, run_config, repository, &strategy_ids) {
        Ok(e) => e,
        Err(e) => return fail(&e),
    };

    let summary = match engine.run() {
        Ok(RunOutcome::Finished(summary)) => summary,
        Ok(RunOutcome::Paused { ticks_processed }) => {
            eprintln!("Run paused after {ticks_processed} ticks");
            return ExitCode::SUCCESS;
        }
        Err(e) => return fail(&e),
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(1);
            }
        }
    } else {
        print_summary(&summary);
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter) {
        return fail(&e);
    }
    let run_config = match build_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let registry = match builtin_signals() {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let ids = strategies::strategy_ids(&adapter);
    for id in &ids {
        if let Err(e) = strategies::build_strategy(&adapter, id, &registry) {
            return fail(&e);
        }
    }

    println!("Config is valid");
    println!("  Window:     {} to {}", run_config.start_date, run_config.end_date);
    println!("  Symbols:    {}", run_config.symbols.join(", "));
    println!("  Capital:    {:.2}", run_config.initial_capital);
    println!("  Strategies: {}", ids.join(", "));
    ExitCode::SUCCESS
}

fn run_import(config_path: &Path, symbol: &str, file: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let symbol = symbol.trim().to_uppercase();

    let bars = match CsvAdapter::read_file(file, &symbol) {
        Ok(b) if b.is_empty() => return fail(&SimError::NoData { symbol: symbol.clone() }),
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    match store_bars(&adapter, &bars) {
        Ok(n) => {
            println!("Imported {n} bars for {symbol}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

#[cfg(feature = "sqlite")]
fn store_bars(config: &dyn ConfigPort, bars: &[MarketBar]) -> Result<usize, SimError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let db = SqliteAdapter::from_config(config)?;
    db.initialize_schema()?;
    db.insert_bars(bars)
}

#[cfg(not(feature = "sqlite"))]
fn store_bars(_config: &dyn ConfigPort, _bars: &[MarketBar]) -> Result<usize, SimError> {
    Err(SimError::Database {
        reason: "sqlite feature is required for import".to_string(),
    })
}

fn run_signals() -> ExitCode {
    let registry = match builtin_signals() {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    for name in registry.names() {
        if let Some(meta) = registry.metadata(name) {
            println!(
                "{:<16} {:<16} lookback>={:<3} {}",
                name, meta.category, meta.min_lookback, meta.description
            );
        }
    }
    ExitCode::SUCCESS
}
