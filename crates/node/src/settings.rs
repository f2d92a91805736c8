//! Node settings, read from `ORACLE_*` environment variables

use anyhow::Context;
use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use oracle_price_feed::{AggregatorConfig, FallbackPolicy, FeedConfig, StoreConfig};

/// Node configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Market configuration file
    pub markets_path: PathBuf,
    /// Conversion paths file; no composition without it
    #[serde(default)]
    pub paths_path: Option<PathBuf>,
    /// Price fixture served by static providers
    #[serde(default)]
    pub prices_path: Option<PathBuf>,
    /// Cycles to run; 0 runs until shutdown
    #[serde(default = "default_cycles")]
    pub cycles: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Index snapshots retained by the store
    #[serde(default = "default_index_history")]
    pub index_history: usize,
    /// Drop tickers whose paths all failed instead of publishing their raw median
    #[serde(default)]
    pub drop_unpriced_paths: bool,
}

fn default_cycles() -> u64 {
    1
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_index_history() -> usize {
    4
}

impl NodeSettings {
    /// Load from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(Environment::with_prefix("ORACLE"))
    }

    pub fn from_source(env: Environment) -> anyhow::Result<Self> {
        Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read node settings")?
            .try_deserialize()
            .context("Invalid node settings (is ORACLE_MARKETS_PATH set?)")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            index_history: self.index_history,
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            fallback: if self.drop_unpriced_paths {
                FallbackPolicy::Drop
            } else {
                FallbackPolicy::RawMedian
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("ORACLE").source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = NodeSettings::from_source(env(&[("ORACLE_MARKETS_PATH", "markets.json")])).unwrap();
        assert_eq!(settings.markets_path, PathBuf::from("markets.json"));
        assert!(settings.paths_path.is_none());
        assert_eq!(settings.cycles, 1);
        assert_eq!(settings.interval(), Duration::from_secs(1));
        assert_eq!(settings.store_config().index_history, 4);
        assert_eq!(settings.aggregator_config().fallback, FallbackPolicy::RawMedian);
    }

    #[test]
    fn test_overrides() {
        let settings = NodeSettings::from_source(env(&[
            ("ORACLE_MARKETS_PATH", "markets.json"),
            ("ORACLE_PATHS_PATH", "paths.json"),
            ("ORACLE_CYCLES", "3"),
            ("ORACLE_INTERVAL_MS", "250"),
            ("ORACLE_DROP_UNPRICED_PATHS", "true"),
        ]))
        .unwrap();
        assert_eq!(settings.paths_path, Some(PathBuf::from("paths.json")));
        assert_eq!(settings.cycles, 3);
        assert_eq!(settings.interval(), Duration::from_millis(250));
        assert_eq!(settings.aggregator_config().fallback, FallbackPolicy::Drop);
    }

    #[test]
    fn test_markets_path_required() {
        assert!(NodeSettings::from_source(env(&[])).is_err());
    }
}
