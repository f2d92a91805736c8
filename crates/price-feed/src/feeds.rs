//! Provider contract and the per-cycle fetch runner

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use oracle_core::{Ticker, TickerPrices};

use crate::state::PriceStore;

/// Upstream fetcher contract.
///
/// A provider returns its observations for one cycle at each ticker's native
/// decimals. A ticker missing from the map means "no observation", never zero.
#[async_trait::async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, tickers: &[Ticker]) -> anyhow::Result<TickerPrices>;
}

/// Provider serving a fixed set of prices
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    prices: TickerPrices,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, prices: TickerPrices) -> Self {
        Self {
            name: name.into(),
            prices,
        }
    }
}

#[async_trait::async_trait]
impl PriceProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, tickers: &[Ticker]) -> anyhow::Result<TickerPrices> {
        Ok(tickers
            .iter()
            .filter_map(|t| self.prices.get_key_value(t))
            .map(|(t, p)| (t.clone(), *p))
            .collect())
    }
}

/// Feed runner configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Per-provider deadline for one fetch
    pub fetch_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of one fetch round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Runs every provider concurrently and writes each result into the store
pub struct FeedRunner {
    config: FeedConfig,
    store: Arc<PriceStore>,
    providers: Vec<Arc<dyn PriceProvider>>,
}

impl FeedRunner {
    pub fn new(config: FeedConfig, store: Arc<PriceStore>) -> Self {
        Self {
            config,
            store,
            providers: vec![],
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PriceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn PriceProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Fetch from every provider at once.
    ///
    /// Each provider replaces only its own source. A failing or slow provider
    /// leaves its source untouched. Does not reset the store: callers do that
    /// between cycles.
    pub async fn run_cycle(&self, tickers: &[Ticker]) -> CycleStats {
        let tickers: Arc<[Ticker]> = tickers.into();

        let handles = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let store = Arc::clone(&self.store);
            let tickers = Arc::clone(&tickers);
            let timeout = self.config.fetch_timeout;

            tokio::spawn(async move {
                let name = provider.name().to_string();
                match tokio::time::timeout(timeout, provider.fetch(&tickers)).await {
                    Ok(Ok(prices)) => {
                        debug!("Provider {} returned {} prices", name, prices.len());
                        store.set_provider_data(&name, prices);
                        Ok(name)
                    }
                    Ok(Err(e)) => {
                        warn!("Provider {} failed: {}", name, e);
                        Err(name)
                    }
                    Err(_) => {
                        warn!("Provider {} timed out after {:?}", name, timeout);
                        Err(name)
                    }
                }
            })
        });

        let mut stats = CycleStats::default();
        for result in join_all(handles).await {
            match result {
                Ok(Ok(name)) => stats.succeeded.push(name),
                Ok(Err(name)) => stats.failed.push(name),
                Err(e) => warn!("Provider task panicked: {}", e),
            }
        }

        info!(
            "Fetch round complete: {} succeeded, {} failed",
            stats.succeeded.len(),
            stats.failed.len()
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_core::Price;

    fn ticker(s: &str) -> Ticker {
        Ticker::new(s.parse().unwrap(), 8, 1, true).unwrap()
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl PriceProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _tickers: &[Ticker]) -> anyhow::Result<TickerPrices> {
            anyhow::bail!("venue unavailable")
        }
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl PriceProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, _tickers: &[Ticker]) -> anyhow::Result<TickerPrices> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TickerPrices::new())
        }
    }

    fn static_provider(name: &str, entries: &[(&str, u64)]) -> Arc<dyn PriceProvider> {
        let prices = entries
            .iter()
            .map(|(s, v)| (ticker(s), Price::from(*v)))
            .collect();
        Arc::new(StaticProvider::new(name, prices))
    }

    #[tokio::test]
    async fn test_static_provider_filters_requested() {
        let provider = static_provider("a", &[("BTC/USD", 1), ("ETH/USD", 2)]);
        let prices = provider.fetch(&[ticker("BTC/USD"), ticker("SOL/USD")]).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert!(prices.contains_key(&ticker("BTC/USD")));
    }

    #[tokio::test]
    async fn test_run_cycle_stores_each_source() {
        let store = Arc::new(PriceStore::new());
        let runner = FeedRunner::new(FeedConfig::default(), Arc::clone(&store))
            .with_provider(static_provider("a", &[("BTC/USD", 1)]))
            .with_provider(static_provider("b", &[("BTC/USD", 2)]))
            .with_provider(Arc::new(FailingProvider));

        let mut stats = runner.run_cycle(&[ticker("BTC/USD")]).await;
        stats.succeeded.sort();
        assert_eq!(stats.succeeded, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(stats.failed, vec!["failing".to_string()]);

        let data = store.provider_data();
        assert_eq!(data.len(), 2);
        assert!(!data.contains_key("failing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let store = Arc::new(PriceStore::new());
        let config = FeedConfig {
            fetch_timeout: Duration::from_millis(100),
        };
        let runner = FeedRunner::new(config, Arc::clone(&store))
            .with_provider(Arc::new(SlowProvider))
            .with_provider(static_provider("a", &[("BTC/USD", 1)]));

        let stats = runner.run_cycle(&[ticker("BTC/USD")]).await;
        assert_eq!(stats.failed, vec!["slow".to_string()]);
        assert_eq!(store.stats().source_count, 1);
    }
}
