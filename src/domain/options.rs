//! Option chain snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "call" | "c" => Some(OptionType::Call),
            "put" | "p" => Some(OptionType::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub underlying: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: i64,
    pub open_interest: i64,
    pub implied_volatility: Option<f64>,
    pub delta: Option<f64>,
}

impl OptionContract {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsChain {
    pub underlying: String,
    pub timestamp: DateTime<Utc>,
    pub contracts: Vec<OptionContract>,
}

impl OptionsChain {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn calls(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.option_type == OptionType::Call)
    }

    pub fn puts(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.option_type == OptionType::Put)
    }

    /// Distinct expirations, ascending.
    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.contracts.iter().map(|c| c.expiration).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contract(option_type: OptionType, strike: f64, day: u32) -> OptionContract {
        OptionContract {
            symbol: format!("SPY{strike}{option_type}"),
            underlying: "SPY".into(),
            expiration: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            strike,
            option_type,
            bid: 1.0,
            ask: 1.2,
            last: 1.1,
            volume: 10,
            open_interest: 100,
            implied_volatility: Some(0.2),
            delta: None,
        }
    }

    #[test]
    fn parse_option_type() {
        assert_eq!(OptionType::parse("CALL"), Some(OptionType::Call));
        assert_eq!(OptionType::parse("p"), Some(OptionType::Put));
        assert_eq!(OptionType::parse("straddle"), None);
    }

    #[test]
    fn chain_filters_and_expirations() {
        let chain = OptionsChain {
            underlying: "SPY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            contracts: vec![
                contract(OptionType::Call, 470.0, 16),
                contract(OptionType::Put, 460.0, 16),
                contract(OptionType::Call, 480.0, 2),
            ],
        };

        assert_eq!(chain.calls().count(), 2);
        assert_eq!(chain.puts().count(), 1);
        assert_eq!(
            chain.expirations(),
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            ]
        );
        assert!((chain.contracts[0].mid() - 1.1).abs() < 1e-12);
    }
}
