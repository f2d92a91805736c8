//! Configuration files
//!
//! Markets and conversion paths are operator-authored JSON. Loading always
//! validates, so a returned value is safe to hand to the aggregator.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path as FsPath;

use tracing::debug;

use crate::errors::{ConfigFileError, ConfigResult};
use crate::markets::MarketMap;
use crate::math::parse_decimal;
use crate::paths::PathsConfig;
use crate::types::{CurrencyPair, TickerPrices};

/// Per-source price observations, as a fetcher would deliver them
pub type ProviderPrices = BTreeMap<String, TickerPrices>;

fn read_json<T: DeserializeOwned>(path: &FsPath) -> ConfigResult<T> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigFileError::Json {
        path: display,
        source,
    })
}

impl MarketMap {
    /// Parse and validate a market map document
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let map: MarketMap =
            serde_json::from_str(text).map_err(|source| ConfigFileError::Json {
                path: "<inline>".to_string(),
                source,
            })?;
        map.validate()?;
        Ok(map)
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|source| ConfigFileError::Json {
            path: "<inline>".to_string(),
            source,
        })
    }
}

/// Load and validate the market configuration file
pub fn load_market_map(path: impl AsRef<FsPath>) -> ConfigResult<MarketMap> {
    let path = path.as_ref();
    let map: MarketMap = read_json(path)?;
    map.validate()?;
    debug!("Loaded {} markets from {}", map.len(), path.display());
    Ok(map)
}

/// Load the conversion paths file and check it against the market map
pub fn load_paths_config(
    path: impl AsRef<FsPath>,
    markets: &MarketMap,
) -> ConfigResult<PathsConfig> {
    let path = path.as_ref();
    let config: PathsConfig = read_json(path)?;
    config.validate_against(markets)?;
    debug!(
        "Loaded conversion paths for {} tickers from {}",
        config.len(),
        path.display()
    );
    Ok(config)
}

/// Load a price fixture: `{"source": {"BASE/QUOTE": "70000.5"}}`.
///
/// Each value is parsed at the decimals of its configured market.
pub fn load_price_fixture(
    path: impl AsRef<FsPath>,
    markets: &MarketMap,
) -> ConfigResult<ProviderPrices> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw: BTreeMap<String, BTreeMap<String, String>> = read_json(path)?;

    let mut prices = ProviderPrices::new();
    for (source, quotes) in raw {
        let mut parsed = TickerPrices::new();
        for (key, text) in quotes {
            let fixture_error = |reason: String| ConfigFileError::Fixture {
                path: display.clone(),
                reason,
            };

            let pair: CurrencyPair = key.parse()?;
            let market = markets
                .get(&pair)
                .ok_or_else(|| fixture_error(format!("{source}: {key} is not a configured market")))?;
            let price = parse_decimal(&text, market.ticker.decimals())
                .map_err(|e| fixture_error(format!("{source}: {key}: {e}")))?;
            parsed.insert(market.ticker.clone(), price);
        }
        prices.insert(source, parsed);
    }
    Ok(prices)
}
