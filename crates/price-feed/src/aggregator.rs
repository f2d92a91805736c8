//! Median aggregation engine
//!
//! One pass per cycle, over one consistent snapshot:
//! 1. raw-feed median per ticker across every source that reported it
//! 2. conversion-path composition per configured ticker, median over the
//!    paths that could be evaluated
//! 3. merge, with composed prices overriding raw medians
//!
//! All cross-pair math runs at `SCALED_DECIMALS` on integers.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use oracle_core::math::{self, SCALED_DECIMALS};
use oracle_core::{
    AggregationError, AggregationResult, Operation, Path, PathsConfig, Price, PriceSource,
    ProviderPrices, Ticker, TickerPrices, ValidationResult,
};

use crate::state::{PriceSnapshot, PriceStore};

/// What to publish for a ticker whose paths all failed this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Publish the ticker's raw-feed median, if it has one
    #[default]
    RawMedian,
    /// Publish nothing for the ticker this cycle
    Drop,
}

/// Aggregator configuration
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    pub fallback: FallbackPolicy,
}

/// Summary of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    /// Tickers priced directly from raw feeds
    pub raw_tickers: usize,
    /// Tickers priced from at least one conversion path
    pub composed_tickers: usize,
    /// Tickers with paths configured that fell back to their raw median
    pub fallbacks: Vec<String>,
    /// Paths that could not be evaluated
    pub dropped_paths: usize,
    /// Index snapshot the pass read from
    pub index_version: u64,
}

/// Two-pass median aggregator
pub struct MedianAggregator {
    config: AggregatorConfig,
    paths: RwLock<Arc<PathsConfig>>,
}

impl MedianAggregator {
    /// Build an aggregator over a validated set of conversion paths
    pub fn new(paths: PathsConfig) -> ValidationResult<Self> {
        Self::with_config(AggregatorConfig::default(), paths)
    }

    pub fn with_config(config: AggregatorConfig, paths: PathsConfig) -> ValidationResult<Self> {
        paths.validate()?;
        Ok(Self {
            config,
            paths: RwLock::new(Arc::new(paths)),
        })
    }

    /// Swap in a new path set; the old one stays in force if validation fails
    pub fn update_paths(&self, paths: PathsConfig) -> ValidationResult<()> {
        paths.validate()?;
        info!("Updating conversion paths: {} tickers", paths.len());
        *self.paths.write() = Arc::new(paths);
        Ok(())
    }

    pub fn paths(&self) -> Arc<PathsConfig> {
        Arc::clone(&self.paths.read())
    }

    /// Snapshot the store and aggregate
    pub fn aggregate_store(&self, store: &PriceStore) -> TickerPrices {
        self.aggregate(&store.snapshot())
    }

    /// Final Ticker -> price map at each ticker's native decimals
    pub fn aggregate(&self, snapshot: &PriceSnapshot) -> TickerPrices {
        self.aggregate_with_report(snapshot).0
    }

    pub fn aggregate_with_report(&self, snapshot: &PriceSnapshot) -> (TickerPrices, AggregationReport) {
        let paths = self.paths();
        let mut report = AggregationReport {
            index_version: snapshot.index_version,
            ..Default::default()
        };

        let raw = raw_medians(&snapshot.providers);
        let composed = self.compose_all(&paths, snapshot, &raw, &mut report);

        let mut output = TickerPrices::new();
        for (ticker, working) in &raw {
            if composed.contains_key(ticker) {
                continue;
            }
            if paths.get(ticker.currency_pair()).is_some() {
                report.fallbacks.push(ticker.to_string());
                if self.config.fallback == FallbackPolicy::Drop {
                    debug!("No path candidates for {}, dropping raw median", ticker);
                    continue;
                }
                debug!("No path candidates for {}, using raw median", ticker);
            }

            match math::scale_down(ticker.decimals(), *working) {
                Ok(price) => {
                    output.insert(ticker.clone(), price);
                    report.raw_tickers += 1;
                }
                Err(e) => warn!("Failed to rescale raw median for {}: {}", ticker, e),
            }
        }

        report.composed_tickers = composed.len();
        output.extend(composed);

        info!(
            "Aggregated {} prices ({} raw, {} composed, {} fallbacks, {} dropped paths, index v{})",
            output.len(),
            report.raw_tickers,
            report.composed_tickers,
            report.fallbacks.len(),
            report.dropped_paths,
            report.index_version
        );

        (output, report)
    }

    fn compose_all(
        &self,
        paths: &PathsConfig,
        snapshot: &PriceSnapshot,
        raw: &TickerPrices,
        report: &mut AggregationReport,
    ) -> TickerPrices {
        let mut composed = TickerPrices::new();

        for entry in paths.iter() {
            let candidates: Vec<Price> = entry
                .paths
                .iter()
                .filter_map(|path| match compose_path(path, snapshot, raw) {
                    Ok(price) => Some(price),
                    Err(e) => {
                        debug!(
                            "Dropping path {} for {}: {}",
                            path.show_route(),
                            entry.ticker,
                            e
                        );
                        report.dropped_paths += 1;
                        None
                    }
                })
                .collect();

            let Some(median) = math::median(&candidates) else {
                continue;
            };

            match math::scale_down(entry.ticker.decimals(), median) {
                Ok(price) => {
                    composed.insert(entry.ticker.clone(), price);
                }
                Err(e) => warn!("Failed to rescale composed price for {}: {}", entry.ticker, e),
            }
        }

        composed
    }
}

/// Pass 1: per-ticker median over every source, at working precision.
///
/// Each observation is scaled with its own ticker's decimals before the
/// median, so sources reporting one pair at different precisions still
/// agree. The published key is the first ticker seen for the pair.
fn raw_medians(providers: &ProviderPrices) -> TickerPrices {
    let mut observations: BTreeMap<Ticker, Vec<Price>> = BTreeMap::new();
    for (source, prices) in providers {
        for (ticker, price) in prices {
            match math::scale_up(ticker.decimals(), *price) {
                Ok(scaled) => observations.entry(ticker.clone()).or_default().push(scaled),
                Err(e) => warn!("Failed to scale {} from {}: {}", ticker, source, e),
            }
        }
    }

    observations
        .into_iter()
        .filter_map(|(ticker, values)| math::median(&values).map(|median| (ticker, median)))
        .collect()
}

fn missing(op: &Operation) -> AggregationError {
    AggregationError::MissingPrice {
        pair: op.currency_pair.to_string(),
        provider: op.provider.to_string(),
    }
}

/// Working-precision price of one hop, before its inversion
fn hop_price(op: &Operation, snapshot: &PriceSnapshot, raw: &TickerPrices) -> AggregationResult<Price> {
    let (ticker, price) = match &op.provider {
        PriceSource::Named(name) => snapshot
            .providers
            .get(name)
            .and_then(|prices| prices.get_key_value(&op.currency_pair))
            .ok_or_else(|| missing(op))?,
        PriceSource::IndexDerived => {
            if let Some(working) = raw.get(&op.currency_pair) {
                return Ok(*working);
            }
            snapshot
                .index
                .get_key_value(&op.currency_pair)
                .ok_or_else(|| missing(op))?
        }
    };
    Ok(math::scale_up(ticker.decimals(), *price)?)
}

/// Pass 2 for a single path.
///
/// A zero hop makes the whole candidate zero; it is never inverted.
fn compose_path(path: &Path, snapshot: &PriceSnapshot, raw: &TickerPrices) -> AggregationResult<Price> {
    let (first, rest) = path
        .operations
        .split_first()
        .ok_or(AggregationError::EmptyPath)?;

    let mut price = hop_price(first, snapshot, raw)?;
    if price.is_zero() {
        return Ok(Price::ZERO);
    }
    if first.invert {
        price = math::invert(price, SCALED_DECIMALS)?;
    }

    for op in rest {
        let mut hop = hop_price(op, snapshot, raw)?;
        if hop.is_zero() {
            return Ok(Price::ZERO);
        }
        if op.invert {
            hop = math::invert(hop, SCALED_DECIMALS)?;
        }
        price = math::mul_scaled(price, hop)?;
    }

    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::{CurrencyPair, PathsForTicker};

    fn pair(s: &str) -> CurrencyPair {
        s.parse().unwrap()
    }

    fn ticker(s: &str, decimals: u64) -> Ticker {
        Ticker::new(pair(s), decimals, 1, true).unwrap()
    }

    fn named(pair_str: &str, source: &str) -> Operation {
        Operation::new(pair(pair_str), false, PriceSource::named(source))
    }

    fn index(pair_str: &str) -> Operation {
        Operation::new(pair(pair_str), false, PriceSource::IndexDerived)
    }

    fn p(value: u64) -> Price {
        Price::from(value)
    }

    /// 8-decimal price from a whole number
    fn usd8(value: u64) -> Price {
        p(value) * p(100_000_000)
    }

    fn snapshot(providers: &[(&str, Vec<(Ticker, Price)>)], index: Vec<(Ticker, Price)>) -> PriceSnapshot {
        PriceSnapshot {
            providers: providers
                .iter()
                .map(|(name, prices)| (name.to_string(), prices.iter().cloned().collect()))
                .collect(),
            index: index.into_iter().collect(),
            index_version: 1,
        }
    }

    fn aggregator(entries: Vec<PathsForTicker>) -> MedianAggregator {
        let mut config = PathsConfig::new();
        for entry in entries {
            config.insert(entry);
        }
        MedianAggregator::new(config).unwrap()
    }

    fn btc_usd_paths() -> PathsForTicker {
        PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![
                Path::new(vec![named("BTC/USD", "coinbase")]),
                Path::new(vec![named("BTC/USDT", "binance"), index("USDT/USD")]),
                Path::new(vec![named("BTC/USDC", "okx"), index("USDC/USD")]),
            ],
        )
    }

    #[test]
    fn test_raw_median_odd_and_even() {
        let agg = aggregator(vec![]);
        let eth = ticker("ETH/USD", 8);
        let sol = ticker("SOL/USD", 6);
        let snap = snapshot(
            &[
                ("a", vec![(eth.clone(), usd8(3000)), (sol.clone(), p(150_000_000))]),
                ("b", vec![(eth.clone(), usd8(3100)), (sol.clone(), p(160_000_000))]),
                ("c", vec![(eth.clone(), usd8(2900))]),
            ],
            vec![],
        );

        let out = agg.aggregate(&snap);
        assert_eq!(out[&eth], usd8(3000));
        assert_eq!(out[&sol], p(155_000_000));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_raw_median_mixed_source_decimals() {
        let agg = aggregator(vec![]);
        let snap = snapshot(
            &[
                ("a", vec![(ticker("ETH/USD", 8), usd8(3000))]),
                ("b", vec![(ticker("ETH/USD", 2), p(310_000))]),
                ("c", vec![(ticker("ETH/USD", 8), usd8(2900))]),
            ],
            vec![],
        );

        let out = agg.aggregate(&snap);
        let (key, price) = out.get_key_value(&pair("ETH/USD")).unwrap();
        assert_eq!(key.decimals(), 8);
        assert_eq!(*price, usd8(3000));
    }

    #[test]
    fn test_composition_with_index_price() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USDT", "a"), index("USDT/USD")])],
        )]);
        let snap = snapshot(
            &[("a", vec![(ticker("BTC/USDT", 8), usd8(70_000))])],
            vec![(ticker("USDT/USD", 6), p(1_100_000))],
        );

        let out = agg.aggregate(&snap);
        assert_eq!(out[&pair("BTC/USD")], usd8(77_000));
        // the raw hop is still published under its own ticker
        assert_eq!(out[&pair("BTC/USDT")], usd8(70_000));
    }

    #[test]
    fn test_median_over_candidates() {
        let agg = aggregator(vec![btc_usd_paths()]);
        let snap = snapshot(
            &[
                ("coinbase", vec![(ticker("BTC/USD", 8), usd8(70_000))]),
                ("binance", vec![(ticker("BTC/USDT", 8), usd8(70_000))]),
                ("okx", vec![(ticker("BTC/USDC", 8), usd8(69_000))]),
            ],
            vec![
                (ticker("USDT/USD", 6), p(1_100_000)),
                (ticker("USDC/USD", 6), p(1_100_000)),
            ],
        );

        let (out, report) = agg.aggregate_with_report(&snap);
        assert_eq!(out[&pair("BTC/USD")], usd8(75_900));
        assert_eq!(report.composed_tickers, 1);
        assert_eq!(report.dropped_paths, 0);
    }

    #[test]
    fn test_missing_hop_excludes_only_that_path() {
        let agg = aggregator(vec![btc_usd_paths()]);
        let snap = snapshot(
            &[
                ("coinbase", vec![(ticker("BTC/USD", 8), usd8(70_000))]),
                ("binance", vec![(ticker("BTC/USDT", 8), usd8(70_000))]),
                ("okx", vec![(ticker("BTC/USDC", 8), usd8(69_000))]),
            ],
            vec![(ticker("USDC/USD", 6), p(1_100_000))],
        );

        let (out, report) = agg.aggregate_with_report(&snap);
        // candidates {70000, 75900}
        assert_eq!(out[&pair("BTC/USD")], usd8(72_950));
        assert_eq!(report.dropped_paths, 1);
    }

    #[test]
    fn test_named_hop_reads_only_its_source() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USD", "coinbase")])],
        )]);
        let snap = snapshot(&[("kraken", vec![(ticker("BTC/USD", 8), usd8(70_000))])], vec![]);

        let (out, report) = agg.aggregate_with_report(&snap);
        assert_eq!(report.dropped_paths, 1);
        assert_eq!(report.fallbacks, vec!["BTC/USD".to_string()]);
        // falls back to the raw median
        assert_eq!(out[&pair("BTC/USD")], usd8(70_000));
    }

    #[test]
    fn test_fallback_policy_drop() {
        let mut config = PathsConfig::new();
        config.insert(PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USD", "coinbase")])],
        ));
        let agg = MedianAggregator::with_config(
            AggregatorConfig {
                fallback: FallbackPolicy::Drop,
            },
            config,
        )
        .unwrap();
        let snap = snapshot(&[("kraken", vec![(ticker("BTC/USD", 8), usd8(70_000))])], vec![]);

        assert!(agg.aggregate(&snap).is_empty());
    }

    #[test]
    fn test_composed_overrides_raw() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USDT", "binance"), index("USDT/USD")])],
        )]);
        let snap = snapshot(
            &[
                ("kraken", vec![(ticker("BTC/USD", 8), usd8(1))]),
                ("binance", vec![(ticker("BTC/USDT", 8), usd8(70_000))]),
            ],
            vec![(ticker("USDT/USD", 6), p(1_000_000))],
        );

        assert_eq!(agg.aggregate(&snap)[&pair("BTC/USD")], usd8(70_000));
    }

    #[test]
    fn test_index_derived_prefers_current_raw_median() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USDT", "binance"), index("USDT/USD")])],
        )]);
        let snap = snapshot(
            &[
                ("binance", vec![(ticker("BTC/USDT", 8), usd8(70_000))]),
                ("kraken", vec![(ticker("USDT/USD", 6), p(2_000_000))]),
            ],
            vec![(ticker("USDT/USD", 6), p(1_100_000))],
        );

        assert_eq!(agg.aggregate(&snap)[&pair("BTC/USD")], usd8(140_000));
    }

    #[test]
    fn test_inverted_hops() {
        // BTC/USD = BTC/ETH * 1 / (USD/ETH)
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![
                named("BTC/ETH", "kraken"),
                Operation::new(pair("USD/ETH"), true, PriceSource::IndexDerived),
            ])],
        )]);
        let snap = snapshot(
            &[("kraken", vec![(ticker("BTC/ETH", 8), usd8(20))])],
            // 1 USD = 0.0005 ETH
            vec![(ticker("USD/ETH", 18), p(500_000_000_000_000))],
        );

        assert_eq!(agg.aggregate(&snap)[&pair("BTC/USD")], usd8(40_000));
    }

    #[test]
    fn test_inverted_first_hop() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![Operation::new(pair("USD/BTC"), true, PriceSource::named("a"))])],
        )]);
        // 1 USD = 0.00002 BTC
        let snap = snapshot(&[("a", vec![(ticker("USD/BTC", 8), p(2_000))])], vec![]);

        assert_eq!(agg.aggregate(&snap)[&pair("BTC/USD")], usd8(50_000));
    }

    #[test]
    fn test_zero_hop_short_circuits() {
        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![
                named("BTC/USDT", "binance"),
                Operation::new(pair("USD/USDT"), true, PriceSource::named("binance")),
            ])],
        )]);
        let snap = snapshot(
            &[(
                "binance",
                vec![(ticker("BTC/USDT", 8), usd8(70_000)), (ticker("USD/USDT", 6), p(0))],
            )],
            vec![],
        );

        let out = agg.aggregate(&snap);
        assert_eq!(out[&pair("BTC/USD")], Price::ZERO);
    }

    #[test]
    fn test_unpriced_ticker_is_absent() {
        let agg = aggregator(vec![btc_usd_paths()]);
        let out = agg.aggregate(&snapshot(&[], vec![]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_operation_list_is_an_error() {
        let snap = PriceSnapshot::default();
        assert_eq!(
            compose_path(&Path::new(vec![]), &snap, &TickerPrices::new()),
            Err(AggregationError::EmptyPath)
        );
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let mut config = PathsConfig::new();
        config.insert(PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USDT", "binance")])],
        ));
        assert!(MedianAggregator::new(config.clone()).is_err());

        let agg = aggregator(vec![btc_usd_paths()]);
        assert!(agg.update_paths(config).is_err());
        assert_eq!(agg.paths().len(), 1);
        assert!(agg.update_paths(PathsConfig::new()).is_ok());
        assert!(agg.paths().is_empty());
    }

    #[test]
    fn test_aggregate_store() {
        let store = PriceStore::new();
        store.set_provider_data("a", [(ticker("BTC/USDT", 8), usd8(70_000))].into_iter().collect());
        store.set_aggregated_data([(ticker("USDT/USD", 6), p(1_100_000))].into_iter().collect());

        let agg = aggregator(vec![PathsForTicker::new(
            ticker("BTC/USD", 8),
            vec![Path::new(vec![named("BTC/USDT", "a"), index("USDT/USD")])],
        )]);
        let out = agg.aggregate_store(&store);
        assert_eq!(out[&pair("BTC/USD")], usd8(77_000));
    }
}
