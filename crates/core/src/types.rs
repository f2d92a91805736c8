//! Core type definitions

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::errors::{ValidationError, ValidationResult};
use crate::math::SCALED_DECIMALS;

/// Unsigned integer price carrying an implied number of decimals
pub type Price = U256;

/// Prices keyed by ticker, ordered by pair string
pub type TickerPrices = BTreeMap<Ticker, Price>;

/// Separator of the canonical pair string
pub const PAIR_SEPARATOR: char = '/';

/// A tradable asset pair, identified by `"BASE/QUOTE"`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    #[serde(rename = "Base")]
    pub base: String,
    #[serde(rename = "Quote")]
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// QUOTE/BASE
    pub fn invert(&self) -> Self {
        Self::new(self.quote.clone(), self.base.clone())
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_asset(self, &self.base, "base")?;
        validate_asset(self, &self.quote, "quote")
    }
}

fn validate_asset(pair: &CurrencyPair, asset: &str, side: &str) -> ValidationResult<()> {
    let invalid = |reason: String| ValidationError::InvalidPair {
        pair: pair.to_string(),
        reason,
    };

    if asset.is_empty() {
        return Err(invalid(format!("empty {side}")));
    }
    if asset.contains(PAIR_SEPARATOR) || asset.chars().any(char::is_whitespace) {
        return Err(invalid(format!("{side} contains a separator or whitespace")));
    }
    if asset.to_uppercase() != asset {
        return Err(invalid(format!("{side} must be upper-case")));
    }
    Ok(())
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once(PAIR_SEPARATOR)
            .ok_or_else(|| ValidationError::InvalidPair {
                pair: s.to_string(),
                reason: "expected BASE/QUOTE".to_string(),
            })?;
        let pair = Self::new(base, quote);
        pair.validate()?;
        Ok(pair)
    }
}

/// A currency pair plus its display precision and observation policy.
///
/// Identity (equality, ordering, hashing) is the pair string alone, so two
/// tickers for the same pair always land on the same price-map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    currency_pair: CurrencyPair,
    decimals: u64,
    min_provider_count: u64,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<String>,
}

impl Ticker {
    pub fn new(
        currency_pair: CurrencyPair,
        decimals: u64,
        min_provider_count: u64,
        enabled: bool,
    ) -> ValidationResult<Self> {
        let ticker = Self {
            currency_pair,
            decimals,
            min_provider_count,
            enabled,
            metadata: None,
        };
        ticker.validate()?;
        Ok(ticker)
    }

    /// Attach an opaque JSON metadata blob
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> ValidationResult<Self> {
        self.metadata = Some(metadata.into());
        self.validate()?;
        Ok(self)
    }

    pub fn currency_pair(&self) -> &CurrencyPair {
        &self.currency_pair
    }

    pub fn decimals(&self) -> u64 {
        self.decimals
    }

    pub fn min_provider_count(&self) -> u64 {
        self.min_provider_count
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        self.currency_pair.validate()?;

        let invalid = |reason: String| ValidationError::InvalidTicker {
            ticker: self.to_string(),
            reason,
        };

        if self.decimals == 0 || self.decimals > SCALED_DECIMALS {
            return Err(invalid(format!(
                "decimals {} outside [1, {}]",
                self.decimals, SCALED_DECIMALS
            )));
        }
        if self.min_provider_count == 0 {
            return Err(invalid("min_provider_count must be at least 1".to_string()));
        }
        if let Some(metadata) = self.metadata.as_deref().filter(|m| !m.is_empty()) {
            serde_json::from_str::<serde_json::Value>(metadata)
                .map_err(|e| invalid(format!("metadata is not valid JSON: {e}")))?;
        }
        Ok(())
    }
}

impl PartialEq for Ticker {
    fn eq(&self, other: &Self) -> bool {
        self.currency_pair == other.currency_pair
    }
}

impl Eq for Ticker {}

impl PartialOrd for Ticker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ticker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.currency_pair.cmp(&other.currency_pair)
    }
}

impl Hash for Ticker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.currency_pair.hash(state);
    }
}

// Consistent with Eq/Ord/Hash above, so price maps can be probed by pair.
impl Borrow<CurrencyPair> for Ticker {
    fn borrow(&self) -> &CurrencyPair {
        &self.currency_pair
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.currency_pair, f)
    }
}
