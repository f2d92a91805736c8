//! Core types and utilities for the price oracle
//!
//! This crate provides the data model shared by every component:
//! - Currency pairs and tickers
//! - Exact integer price arithmetic and medians
//! - Market configuration and validation
//! - Conversion paths and their validation
//! - Configuration files and error types

pub mod types;
pub mod math;
pub mod markets;
pub mod paths;
pub mod config;
pub mod errors;

pub use types::*;
pub use markets::*;
pub use paths::*;
pub use config::*;
pub use errors::*;
