//! Decision signals and the registry that executes them.
//!
//! Signal functions are registered explicitly at start-up through
//! [`SignalRegistryBuilder`]; the built registry is immutable and shared by
//! every strategy context of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::bar::MarketBar;
use super::error::{SignalError, SimError};
use super::options::OptionsChain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    Close,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "buy",
            SignalType::Sell => "sell",
            SignalType::Hold => "hold",
            SignalType::Close => "close",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a signal function may look at for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalInput {
    pub run_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    /// Bars up to and including the current one, oldest first.
    pub lookback: Vec<MarketBar>,
    pub options_chain: Option<OptionsChain>,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl SignalInput {
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(|v| v.as_f64())
    }

    pub fn param_usize(&self, key: &str) -> Option<usize> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.lookback.iter().map(|b| b.close).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    pub signal_type: SignalType,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SignalOutput {
    pub fn new(signal_type: SignalType, confidence: f64) -> Self {
        Self {
            signal_type,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Persisted form of one signal evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub run_id: String,
    pub strategy_id: String,
    pub signal_name: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub price: f64,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SignalRecord {
    pub fn from_evaluation(name: &str, input: &SignalInput, output: &SignalOutput) -> Self {
        Self {
            run_id: input.run_id.clone(),
            strategy_id: input.strategy_id.clone(),
            signal_name: name.to_string(),
            symbol: input.symbol.clone(),
            timestamp: input.timestamp,
            signal_type: output.signal_type,
            confidence: output.confidence,
            price: input.current_price,
            parameters: input.parameters.clone(),
            metadata: output.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub description: String,
    pub category: String,
    pub requires_options: bool,
    /// Minimum look-back bars needed for a non-empty answer.
    pub min_lookback: usize,
}

impl SignalMetadata {
    pub fn new(description: &str, category: &str) -> Self {
        Self {
            description: description.to_string(),
            category: category.to_string(),
            requires_options: false,
            min_lookback: 1,
        }
    }

    pub fn with_min_lookback(mut self, bars: usize) -> Self {
        self.min_lookback = bars;
        self
    }

    pub fn requiring_options(mut self) -> Self {
        self.requires_options = true;
        self
    }
}

pub type SignalFn =
    Arc<dyn Fn(&SignalInput) -> Result<Option<SignalOutput>, SignalError> + Send + Sync>;

struct RegisteredSignal {
    function: SignalFn,
    metadata: SignalMetadata,
}

pub struct SignalRegistry {
    signals: BTreeMap<String, RegisteredSignal>,
}

impl fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("signals", &self.signals.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SignalRegistry {
    pub fn builder() -> SignalRegistryBuilder {
        SignalRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self {
            signals: BTreeMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.signals.keys().map(String::as_str).collect()
    }

    pub fn metadata(&self, name: &str) -> Option<&SignalMetadata> {
        self.signals.get(name).map(|s| &s.metadata)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Run a named signal. `Ok(None)` means the signal had nothing to say
    /// (for example not enough look-back).
    pub fn execute(&self, name: &str, input: &SignalInput) -> Result<Option<SignalOutput>, SimError> {
        let signal = self
            .signals
            .get(name)
            .ok_or_else(|| SimError::UnknownSignal {
                name: name.to_string(),
            })?;

        if signal.metadata.requires_options && input.options_chain.is_none() {
            return Ok(None);
        }
        if input.lookback.len() < signal.metadata.min_lookback {
            return Ok(None);
        }

        (signal.function)(input).map_err(|e| SimError::Signal {
            name: name.to_string(),
            reason: e.reason,
        })
    }
}

#[derive(Default)]
pub struct SignalRegistryBuilder {
    signals: BTreeMap<String, RegisteredSignal>,
    duplicates: Vec<String>,
}

impl SignalRegistryBuilder {
    pub fn register<F>(mut self, name: &str, function: F, metadata: SignalMetadata) -> Self
    where
        F: Fn(&SignalInput) -> Result<Option<SignalOutput>, SignalError> + Send + Sync + 'static,
    {
        if self.signals.contains_key(name) {
            self.duplicates.push(name.to_string());
            return self;
        }
        self.signals.insert(
            name.to_string(),
            RegisteredSignal {
                function: Arc::new(function),
                metadata,
            },
        );
        self
    }

    /// Fails if any name was registered twice.
    pub fn build(self) -> Result<SignalRegistry, SimError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(SimError::DuplicateSignal { name });
        }
        Ok(SignalRegistry {
            signals: self.signals,
        })
    }
}
