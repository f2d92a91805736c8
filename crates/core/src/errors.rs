//! Error types

use thiserror::Error;

/// Configuration errors, raised once at load/update time.
///
/// Any of these rejects the whole configuration it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid currency pair {pair}: {reason}")]
    InvalidPair { pair: String, reason: String },

    #[error("Invalid ticker {ticker}: {reason}")]
    InvalidTicker { ticker: String, reason: String },

    #[error("Market key {key} does not match ticker {ticker}")]
    KeyMismatch { key: String, ticker: String },

    #[error("Market {ticker} has {actual} providers, needs at least {required}")]
    InsufficientProviders {
        ticker: String,
        actual: usize,
        required: u64,
    },

    #[error("Market {ticker}: invalid provider config {provider}: {reason}")]
    InvalidProvider {
        ticker: String,
        provider: String,
        reason: String,
    },

    #[error("Market {ticker}: duplicate provider entry ({provider}, {off_chain_ticker})")]
    DuplicateProvider {
        ticker: String,
        provider: String,
        off_chain_ticker: String,
    },

    #[error("Market {ticker}: normalize_by_pair {pair} is not a configured market")]
    UnresolvedNormalization { ticker: String, pair: String },

    #[error("Market {ticker} is enabled but normalizes by disabled market {pair}")]
    NormalizationDisabled { ticker: String, pair: String },

    #[error("Paths target {target} disagrees with its market on {field}")]
    TargetMismatch { target: String, field: String },

    #[error("Path for {target} has no operations")]
    EmptyPath { target: String },

    #[error("Path for {target} is disconnected at {pair}: expected base {expected}")]
    DisconnectedPath {
        target: String,
        pair: String,
        expected: String,
    },

    #[error("Path for {target} revisits {pair}")]
    CyclicPath { target: String, pair: String },

    #[error("Path {route} resolves to {actual}, expected {target}")]
    PathMismatch {
        target: String,
        actual: String,
        route: String,
    },

    #[error("Ticker {target} declares no conversion paths")]
    NoPaths { target: String },

    #[error("Ticker {target} declares path {route} more than once")]
    DuplicatePath { target: String, route: String },

    #[error("Path for {target} reads {pair} from {provider}, which is not configured for it")]
    UnknownProvider {
        target: String,
        pair: String,
        provider: String,
    },

    #[error("Ticker {0} is not a configured market")]
    UnknownMarket(String),
}

/// Integer scaling and fixed-point errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("Decimals {decimals} exceed working precision {max}")]
    DecimalsOutOfRange { decimals: u64, max: u64 },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Malformed decimal {input:?}: {reason}")]
    MalformedDecimal { input: String, reason: String },
}

/// Per-cycle aggregation errors.
///
/// These only shrink the candidate set for one ticker; they never abort a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("No price for {pair} from {provider}")]
    MissingPrice { pair: String, provider: String },

    #[error("Cannot compose an empty operation list")]
    EmptyPath,

    #[error(transparent)]
    Math(#[from] MathError),
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Price fixture {path}: {reason}")]
    Fixture { path: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type MathResult<T> = Result<T, MathError>;
pub type AggregationResult<T> = Result<T, AggregationError>;
pub type ConfigResult<T> = Result<T, ConfigFileError>;
