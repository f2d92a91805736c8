//! Per-cycle price state
//!
//! One lock guards both the raw per-source table and the ring of aggregated
//! (index) snapshots, so a reader always sees a single consistent state.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use oracle_core::{ProviderPrices, TickerPrices};

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How many aggregated snapshots to retain
    pub index_history: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { index_history: 4 }
    }
}

/// One cycle's aggregated output
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub version: u64,
    pub prices: TickerPrices,
    pub recorded_at: Instant,
}

impl IndexSnapshot {
    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }
}

/// Everything one aggregation pass reads, copied under a single lock
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    pub providers: ProviderPrices,
    pub index: TickerPrices,
    pub index_version: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    providers: ProviderPrices,
    index: VecDeque<IndexSnapshot>,
    last_version: u64,
}

/// Shared price store.
///
/// Constructed once and handed to every fetcher and to the aggregator by `Arc`.
#[derive(Debug)]
pub struct PriceStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
    update_count: AtomicU64,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config: StoreConfig {
                index_history: config.index_history.max(1),
            },
            inner: RwLock::new(StoreInner::default()),
            update_count: AtomicU64::new(0),
        }
    }

    /// Replace everything `source` reported; tickers it omits are dropped
    pub fn set_provider_data(&self, source: &str, prices: TickerPrices) {
        self.inner.write().providers.insert(source.to_string(), prices);
        self.update_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_data(&self) -> ProviderPrices {
        self.inner.read().providers.clone()
    }

    pub fn data_by_provider(&self, source: &str) -> Option<TickerPrices> {
        self.inner.read().providers.get(source).cloned()
    }

    /// Clear all sources; call at the start of every cycle
    pub fn reset_provider_data(&self) {
        self.inner.write().providers.clear();
    }

    /// Record a cycle's output as the newest index snapshot
    pub fn set_aggregated_data(&self, prices: TickerPrices) -> u64 {
        let mut inner = self.inner.write();
        inner.last_version += 1;
        let version = inner.last_version;

        inner.index.push_back(IndexSnapshot {
            version,
            prices,
            recorded_at: Instant::now(),
        });
        while inner.index.len() > self.config.index_history {
            inner.index.pop_front();
        }
        version
    }

    /// Latest index prices, empty before the first cycle completes
    pub fn aggregated_data(&self) -> TickerPrices {
        self.inner
            .read()
            .index
            .back()
            .map(|s| s.prices.clone())
            .unwrap_or_default()
    }

    /// A retained snapshot by version
    pub fn aggregated_snapshot(&self, version: u64) -> Option<IndexSnapshot> {
        self.inner
            .read()
            .index
            .iter()
            .find(|s| s.version == version)
            .cloned()
    }

    /// Version of the latest index snapshot; 0 before the first
    pub fn aggregated_version(&self) -> u64 {
        self.inner.read().index.back().map(|s| s.version).unwrap_or(0)
    }

    /// Raw and index tables copied under one read lock
    pub fn snapshot(&self) -> PriceSnapshot {
        let inner = self.inner.read();
        let (index, index_version) = inner
            .index
            .back()
            .map(|s| (s.prices.clone(), s.version))
            .unwrap_or_default();

        PriceSnapshot {
            providers: inner.providers.clone(),
            index,
            index_version,
        }
    }

    /// Stats
    pub fn stats(&self) -> PriceStoreStats {
        let inner = self.inner.read();
        PriceStoreStats {
            source_count: inner.providers.len(),
            observation_count: inner.providers.values().map(|p| p.len()).sum(),
            index_version: inner.index.back().map(|s| s.version).unwrap_or(0),
            retained_snapshots: inner.index.len(),
            update_count: self.update_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the store
#[derive(Debug, Clone)]
pub struct PriceStoreStats {
    pub source_count: usize,
    pub observation_count: usize,
    pub index_version: u64,
    pub retained_snapshots: usize,
    pub update_count: u64,
}
