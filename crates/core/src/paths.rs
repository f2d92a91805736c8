//! Conversion paths
//!
//! A path synthesizes the price of one pair by chaining others, e.g.
//! `BTC/USDT -> USDT/USD` for BTC/USD. Paths are validated as connected,
//! acyclic chains at configuration time; an invalid path is never evaluated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::errors::{ValidationError, ValidationResult};
use crate::markets::MarketMap;
use crate::types::{CurrencyPair, Ticker};

/// Wire name of [`PriceSource::IndexDerived`]
pub const INDEX_PRICE: &str = "index_price";

/// Where a hop reads its price from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PriceSource {
    /// A single provider's raw observation
    Named(String),
    /// The aggregated price: this cycle's raw median, else last cycle's index price
    IndexDerived,
}

impl PriceSource {
    pub fn named(name: impl Into<String>) -> Self {
        PriceSource::Named(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            PriceSource::Named(name) => name,
            PriceSource::IndexDerived => INDEX_PRICE,
        }
    }
}

impl From<String> for PriceSource {
    fn from(name: String) -> Self {
        if name == INDEX_PRICE {
            PriceSource::IndexDerived
        } else {
            PriceSource::Named(name)
        }
    }
}

impl From<PriceSource> for String {
    fn from(source: PriceSource) -> Self {
        source.name().to_string()
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One hop of a conversion path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub currency_pair: CurrencyPair,
    #[serde(default)]
    pub invert: bool,
    pub provider: PriceSource,
}

impl Operation {
    pub fn new(currency_pair: CurrencyPair, invert: bool, provider: PriceSource) -> Self {
        Self {
            currency_pair,
            invert,
            provider,
        }
    }

    /// The pair this hop contributes once its inversion is applied
    pub fn effective_pair(&self) -> CurrencyPair {
        if self.invert {
            self.currency_pair.invert()
        } else {
            self.currency_pair.clone()
        }
    }
}

/// Ordered hops resolving to one target pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub operations: Vec<Operation>,
}

impl Path {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Pairs read by this path, in hop order
    pub fn pairs(&self) -> Vec<&CurrencyPair> {
        self.operations.iter().map(|op| &op.currency_pair).collect()
    }

    /// (first hop's effective base, last hop's effective quote)
    pub fn effective_pair(&self) -> Option<CurrencyPair> {
        let first = self.operations.first()?.effective_pair();
        let last = self.operations.last()?.effective_pair();
        Some(CurrencyPair::new(first.base, last.quote))
    }

    pub fn matches(&self, target: &CurrencyPair) -> bool {
        self.effective_pair().as_ref() == Some(target)
    }

    /// Diagnostic trace such as `"BTC/USDT -> USDT/USD"`
    pub fn show_route(&self) -> String {
        self.operations
            .iter()
            .map(|op| op.effective_pair().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check that the hops form a connected, acyclic chain ending at `target`
    pub fn validate(&self, target: &CurrencyPair) -> ValidationResult<()> {
        if self.operations.is_empty() {
            return Err(ValidationError::EmptyPath {
                target: target.to_string(),
            });
        }

        // Pairs are compared in both orientations: X/Y and Y/X are the same market.
        let mut seen: HashSet<CurrencyPair> = HashSet::new();
        let mut current_quote: Option<String> = None;

        for op in &self.operations {
            op.currency_pair.validate()?;

            if seen.contains(&op.currency_pair) || seen.contains(&op.currency_pair.invert()) {
                return Err(ValidationError::CyclicPath {
                    target: target.to_string(),
                    pair: op.currency_pair.to_string(),
                });
            }
            seen.insert(op.currency_pair.clone());

            let effective = op.effective_pair();
            if let Some(expected) = current_quote {
                if effective.base != expected {
                    return Err(ValidationError::DisconnectedPath {
                        target: target.to_string(),
                        pair: effective.to_string(),
                        expected,
                    });
                }
            }
            current_quote = Some(effective.quote);
        }

        if !self.matches(target) {
            return Err(ValidationError::PathMismatch {
                target: target.to_string(),
                actual: self
                    .effective_pair()
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                route: self.show_route(),
            });
        }
        Ok(())
    }
}

/// A target ticker and every path that can price it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsForTicker {
    pub ticker: Ticker,
    pub paths: Vec<Path>,
}

impl PathsForTicker {
    pub fn new(ticker: Ticker, paths: Vec<Path>) -> Self {
        Self { ticker, paths }
    }

    /// Every hop pair used by any path
    pub fn unique_pairs(&self) -> BTreeSet<CurrencyPair> {
        self.paths
            .iter()
            .flat_map(|path| path.operations.iter().map(|op| op.currency_pair.clone()))
            .collect()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        self.ticker.validate()?;

        let target = self.ticker.currency_pair();
        if self.paths.is_empty() {
            return Err(ValidationError::NoPaths {
                target: target.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for path in &self.paths {
            path.validate(target)?;

            if !seen.insert(&path.operations) {
                return Err(ValidationError::DuplicatePath {
                    target: target.to_string(),
                    route: path.show_route(),
                });
            }
        }
        Ok(())
    }
}

/// Conversion paths keyed by target `"BASE/QUOTE"`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub paths: BTreeMap<String, PathsForTicker>,
}

impl PathsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the target's canonical key
    pub fn insert(&mut self, entry: PathsForTicker) {
        self.paths.insert(entry.ticker.to_string(), entry);
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&PathsForTicker> {
        self.paths.get(&pair.to_string())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathsForTicker> {
        self.paths.values()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        for (key, entry) in &self.paths {
            entry.validate()?;

            let ticker = entry.ticker.to_string();
            if *key != ticker {
                return Err(ValidationError::KeyMismatch {
                    key: key.clone(),
                    ticker,
                });
            }
        }
        Ok(())
    }

    /// Check that every target and hop refers to a configured market, that each
    /// target ticker agrees with its market on decimals and enabled, and that
    /// named providers are actually configured for the hop they read.
    pub fn validate_against(&self, markets: &MarketMap) -> ValidationResult<()> {
        self.validate()?;

        for entry in self.paths.values() {
            let target = entry.ticker.currency_pair();
            let market = markets
                .get(target)
                .ok_or_else(|| ValidationError::UnknownMarket(target.to_string()))?;

            let mismatch = if entry.ticker.decimals() != market.ticker.decimals() {
                Some("decimals")
            } else if entry.ticker.enabled() != market.ticker.enabled() {
                Some("enabled")
            } else {
                None
            };
            if let Some(field) = mismatch {
                return Err(ValidationError::TargetMismatch {
                    target: target.to_string(),
                    field: field.to_string(),
                });
            }

            for op in entry.paths.iter().flat_map(|p| &p.operations) {
                let market = markets
                    .get(&op.currency_pair)
                    .ok_or_else(|| ValidationError::UnknownMarket(op.currency_pair.to_string()))?;

                if let PriceSource::Named(name) = &op.provider {
                    if market.provider(name).is_none() {
                        return Err(ValidationError::UnknownProvider {
                            target: target.to_string(),
                            pair: op.currency_pair.to_string(),
                            provider: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
