//! Market configuration and validation
//!
//! A market is a ticker plus the ordered list of providers that quote it.
//! The whole map is validated atomically before any fetching begins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::{ValidationError, ValidationResult};
use crate::types::{CurrencyPair, Ticker};

/// One provider's view of a market.
///
/// `invert` and `normalize_by_pair` are validated and carried through the
/// config round trip but do not change pricing. Conversion routes come only
/// from the paths file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub off_chain_ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize_by_pair: Option<CurrencyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, off_chain_ticker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            off_chain_ticker: off_chain_ticker.into(),
            invert: None,
            normalize_by_pair: None,
            metadata: None,
        }
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    pub fn with_normalize_by_pair(mut self, pair: CurrencyPair) -> Self {
        self.normalize_by_pair = Some(pair);
        self
    }

    pub fn inverted(&self) -> bool {
        self.invert.unwrap_or(false)
    }

    fn validate(&self, ticker: &Ticker) -> ValidationResult<()> {
        let invalid = |reason: String| ValidationError::InvalidProvider {
            ticker: ticker.to_string(),
            provider: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("empty provider name".to_string()));
        }
        if self.off_chain_ticker.is_empty() {
            return Err(invalid("empty off_chain_ticker".to_string()));
        }
        if let Some(pair) = &self.normalize_by_pair {
            pair.validate()
                .map_err(|e| invalid(format!("normalize_by_pair: {e}")))?;
        }
        if let Some(metadata) = self.metadata.as_deref().filter(|m| !m.is_empty()) {
            serde_json::from_str::<serde_json::Value>(metadata)
                .map_err(|e| invalid(format!("metadata is not valid JSON: {e}")))?;
        }
        Ok(())
    }
}

/// A ticker and the providers quoting it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub ticker: Ticker,
    pub provider_configs: Vec<ProviderConfig>,
}

impl Market {
    pub fn new(ticker: Ticker, provider_configs: Vec<ProviderConfig>) -> Self {
        Self {
            ticker,
            provider_configs,
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.provider_configs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.provider_configs.iter().find(|p| p.name == name)
    }

    /// Checks that only need this market
    pub fn validate(&self) -> ValidationResult<()> {
        self.ticker.validate()?;

        let required = self.ticker.min_provider_count();
        if (self.provider_configs.len() as u64) < required {
            return Err(ValidationError::InsufficientProviders {
                ticker: self.ticker.to_string(),
                actual: self.provider_configs.len(),
                required,
            });
        }

        let mut seen = HashSet::new();
        for provider in &self.provider_configs {
            provider.validate(&self.ticker)?;

            if !seen.insert((provider.name.as_str(), provider.off_chain_ticker.as_str())) {
                return Err(ValidationError::DuplicateProvider {
                    ticker: self.ticker.to_string(),
                    provider: provider.name.clone(),
                    off_chain_ticker: provider.off_chain_ticker.clone(),
                });
            }
        }
        Ok(())
    }
}

/// All configured markets keyed by `"BASE/QUOTE"`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketMap {
    #[serde(default)]
    pub markets: BTreeMap<String, Market>,
}

impl MarketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a market under its canonical key
    pub fn insert(&mut self, market: Market) {
        self.markets.insert(market.ticker.to_string(), market);
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&Market> {
        self.markets.get(&pair.to_string())
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn tickers(&self) -> Vec<Ticker> {
        self.markets.values().map(|m| m.ticker.clone()).collect()
    }

    pub fn enabled_tickers(&self) -> Vec<Ticker> {
        self.markets
            .values()
            .filter(|m| m.ticker.enabled())
            .map(|m| m.ticker.clone())
            .collect()
    }

    /// Validate every market and the references between them.
    ///
    /// Returns the first violation in key order; nothing is partially accepted.
    pub fn validate(&self) -> ValidationResult<()> {
        for (key, market) in &self.markets {
            market.validate()?;

            let ticker = market.ticker.to_string();
            if *key != ticker {
                return Err(ValidationError::KeyMismatch {
                    key: key.clone(),
                    ticker,
                });
            }
        }

        for market in self.markets.values() {
            for provider in &market.provider_configs {
                let Some(pair) = &provider.normalize_by_pair else {
                    continue;
                };

                let target = self.get(pair).ok_or_else(|| {
                    ValidationError::UnresolvedNormalization {
                        ticker: market.ticker.to_string(),
                        pair: pair.to_string(),
                    }
                })?;

                if market.ticker.enabled() && !target.ticker.enabled() {
                    return Err(ValidationError::NormalizationDisabled {
                        ticker: market.ticker.to_string(),
                        pair: pair.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
