//! CSV bar files.
//!
//! One file per symbol, `<SYMBOL>.csv`, with a header row and columns
//! `timestamp,open,high,low,close,volume[,adj_close]`. The timestamp is
//! either a date (`2024-01-02`, taken as midnight UTC) or RFC 3339.

use crate::domain::bar::MarketBar;
use crate::domain::error::SimError;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SimError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SimError::Database {
            reason: format!("invalid timestamp {value:?}: {e}"),
        })
}

fn field<T: FromStr>(record: &csv::StringRecord, index: usize, name: &str) -> Result<T, SimError>
where
    T::Err: std::fmt::Display,
{
    record
        .get(index)
        .ok_or_else(|| SimError::Database {
            reason: format!("missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| SimError::Database {
            reason: format!("invalid {name} value: {e}"),
        })
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Parse one file into time-ordered bars for `symbol`.
    pub fn read_file(path: &Path, symbol: &str) -> Result<Vec<MarketBar>, SimError> {
        let content = fs::read_to_string(path).map_err(|e| SimError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| SimError::Database {
                reason: format!("CSV parse error: {}", e),
            })?;

            let timestamp = parse_timestamp(record.get(0).ok_or_else(|| SimError::Database {
                reason: "missing timestamp column".into(),
            })?)?;
            let close: f64 = field(&record, 4, "close")?;
            let adj_close = match record.get(6).map(str::trim) {
                Some(v) if !v.is_empty() => field(&record, 6, "adj_close")?,
                _ => close,
            };

            bars.push(MarketBar {
                symbol: symbol.to_string(),
                timestamp,
                open: field(&record, 1, "open")?,
                high: field(&record, 2, "high")?,
                low: field(&record, 3, "low")?,
                close,
                volume: field(&record, 5, "volume")?,
                adj_close,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    pub fn load_symbol(&self, symbol: &str) -> Result<Vec<MarketBar>, SimError> {
        Self::read_file(&self.csv_path(symbol), symbol)
    }

    /// Symbols with a `.csv` file in the base directory, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, SimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| SimError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) {
        let mut file = fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn reads_and_sorts_bars() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "SPY.csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-03,101,102,100,101.5,2000\n\
             2024-01-02,100,101,99,100.5,1000\n",
        );
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let bars = adapter.load_symbol("SPY").unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(bars[0].symbol, "SPY");
        assert_eq!(bars[0].adj_close, 100.5);
        assert_eq!(bars[1].volume, 2000);
    }

    #[test]
    fn adj_close_and_rfc3339() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "QQQ.csv",
            "timestamp,open,high,low,close,volume,adj_close\n\
             2024-01-02T14:30:00Z,10,11,9,10.5,5,10.25\n",
        );
        let bars = CsvAdapter::read_file(&dir.path().join("QQQ.csv"), "QQQ").unwrap();
        assert_eq!(bars[0].adj_close, 10.25);
        assert_eq!(
            bars[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn bad_rows_are_errors() {
        let dir = TempDir::new().unwrap();
        write_csv(
            &dir,
            "BAD.csv",
            "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n",
        );
        write_csv(
            &dir,
            "NUM.csv",
            "timestamp,open,high,low,close,volume\n2024-01-02,1,1,1,abc,1\n",
        );
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(adapter.load_symbol("BAD").is_err());
        assert!(adapter.load_symbol("NUM").is_err());
        assert!(adapter.load_symbol("MISSING").is_err());
    }

    #[test]
    fn lists_csv_symbols() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "MSFT.csv", "timestamp,open,high,low,close,volume\n");
        write_csv(&dir, "AAPL.csv", "timestamp,open,high,low,close,volume\n");
        write_csv(&dir, "notes.txt", "ignore me");
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert_eq!(adapter.list_symbols().unwrap(), vec!["AAPL", "MSFT"]);
    }
}
