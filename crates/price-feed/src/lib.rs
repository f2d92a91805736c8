//! Price ingestion and aggregation
//!
//! Features:
//! - Shared per-cycle price store with versioned index snapshots
//! - Concurrent provider fetch rounds
//! - Two-pass median aggregation over raw feeds and conversion paths

pub mod aggregator;
pub mod feeds;
pub mod state;

pub use aggregator::{AggregationReport, AggregatorConfig, FallbackPolicy, MedianAggregator};
pub use feeds::{CycleStats, FeedConfig, FeedRunner, PriceProvider, StaticProvider};
pub use state::{PriceSnapshot, PriceStore, StoreConfig};
