//! Oracle node
//!
//! Drives fetch and aggregation cycles over the configured markets

pub mod node;
pub mod settings;

pub use node::{CycleOutcome, OracleNode};
pub use settings::NodeSettings;
