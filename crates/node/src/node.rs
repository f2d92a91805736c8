//! Oracle node: one fetch round plus one aggregation pass per cycle

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};

use oracle_core::math::format_decimal;
use oracle_core::{
    load_market_map, load_paths_config, load_price_fixture, MarketMap, PathsConfig, TickerPrices,
};
use oracle_price_feed::{
    AggregatorConfig, FeedRunner, MedianAggregator, PriceProvider, PriceStore, StaticProvider,
};

use crate::settings::NodeSettings;

/// Output of one cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    /// Everything priced this cycle, kept as next cycle's index prices
    pub prices: TickerPrices,
    /// Prices for enabled markets only, as handed to consumers
    pub published: TickerPrices,
    pub index_version: u64,
}

/// Wires the store, the fetch runner and the aggregator together
pub struct OracleNode {
    markets: RwLock<Arc<MarketMap>>,
    store: Arc<PriceStore>,
    runner: FeedRunner,
    aggregator: MedianAggregator,
    cycles_run: AtomicU64,
}

impl OracleNode {
    pub fn new(
        markets: MarketMap,
        paths: PathsConfig,
        store: Arc<PriceStore>,
        runner: FeedRunner,
        aggregator_config: AggregatorConfig,
    ) -> anyhow::Result<Self> {
        markets.validate().context("Invalid market configuration")?;
        paths
            .validate_against(&markets)
            .context("Invalid conversion paths")?;
        let aggregator = MedianAggregator::with_config(aggregator_config, paths)?;

        Ok(Self {
            markets: RwLock::new(Arc::new(markets)),
            store,
            runner,
            aggregator,
            cycles_run: AtomicU64::new(0),
        })
    }

    /// Build a node from settings, serving fixture prices through static providers
    pub fn from_settings(settings: &NodeSettings) -> anyhow::Result<Self> {
        let markets = load_market_map(&settings.markets_path)
            .with_context(|| format!("Loading {}", settings.markets_path.display()))?;

        let paths = match &settings.paths_path {
            Some(path) => load_paths_config(path, &markets)
                .with_context(|| format!("Loading {}", path.display()))?,
            None => PathsConfig::new(),
        };

        let store = Arc::new(PriceStore::with_config(settings.store_config()));
        let mut runner = FeedRunner::new(settings.feed_config(), Arc::clone(&store));

        if let Some(path) = &settings.prices_path {
            let fixture = load_price_fixture(path, &markets)
                .with_context(|| format!("Loading {}", path.display()))?;
            for (source, prices) in fixture {
                let provider: Arc<dyn PriceProvider> = Arc::new(StaticProvider::new(source, prices));
                runner.add_provider(provider);
            }
        }

        info!(
            "Node configured: {} markets, {} path targets, {} providers",
            markets.len(),
            paths.len(),
            runner.provider_count()
        );

        Self::new(markets, paths, store, runner, settings.aggregator_config())
    }

    pub fn store(&self) -> Arc<PriceStore> {
        Arc::clone(&self.store)
    }

    pub fn markets(&self) -> Arc<MarketMap> {
        Arc::clone(&self.markets.read())
    }

    /// Replace markets and paths together; nothing changes unless both validate
    pub fn reload(&self, markets: MarketMap, paths: PathsConfig) -> anyhow::Result<()> {
        markets.validate().context("Invalid market configuration")?;
        paths
            .validate_against(&markets)
            .context("Invalid conversion paths")?;

        self.aggregator.update_paths(paths)?;
        *self.markets.write() = Arc::new(markets);
        info!("Reloaded configuration");
        Ok(())
    }

    /// Reset, fetch, aggregate, record
    pub async fn run_cycle(&self) -> CycleOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let markets = self.markets();

        self.store.reset_provider_data();
        self.runner.run_cycle(&markets.tickers()).await;

        let prices = self.aggregator.aggregate(&self.store.snapshot());
        let index_version = self.store.set_aggregated_data(prices.clone());

        let published: TickerPrices = prices
            .iter()
            .filter(|(ticker, _)| {
                markets
                    .get(ticker.currency_pair())
                    .map(|m| m.ticker.enabled())
                    .unwrap_or(false)
            })
            .map(|(t, p)| (t.clone(), *p))
            .collect();

        let cycle = self.cycles_run.fetch_add(1, Ordering::Relaxed) + 1;

        for (ticker, price) in &published {
            debug!("{} = {}", ticker, format_decimal(*price, ticker.decimals()));
        }
        info!(
            "Cycle {} published {} prices in {:?}",
            cycle,
            published.len(),
            start.elapsed()
        );

        CycleOutcome {
            cycle,
            started_at,
            prices,
            published,
            index_version,
        }
    }

    /// Run `cycles` cycles (0 = unbounded) until done or shut down
    pub async fn run(
        &self,
        cycles: u64,
        interval: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Vec<CycleOutcome> {
        let mut ticker = tokio::time::interval(interval);
        let mut outcomes = vec![];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    outcomes.push(self.run_cycle().await);
                    if cycles != 0 && outcomes.len() as u64 >= cycles {
                        break;
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        outcomes
    }
}
