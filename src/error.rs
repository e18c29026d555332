//! Error types for rirstats.

use thiserror::Error;

/// Main error type for a processing run.
#[derive(Error, Debug)]
pub enum Error {
    /// Delegation feed could not be loaded
    #[error("delegation error at line {line}: {source}")]
    Delegation {
        line: usize,
        #[source]
        source: DelegationError,
    },

    /// Path observation could not be used
    #[error("observation error: {0}")]
    Observation(#[from] ObservationError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while parsing a single delegation record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("expected at least {expected} fields, got {actual}")]
    MissingFields { expected: usize, actual: usize },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid country code: {0:?}")]
    InvalidCountry(String),

    #[error("ipv4 block size {0} does not map to a prefix length")]
    InvalidBlockSize(u64),

    #[error("ipv6 prefix length {0} is longer than 128")]
    InvalidPrefixLength(u32),

    #[error("asn range {start}+{count} overflows")]
    AsnRangeOverflow { start: u32, count: u64 },
}

/// Errors related to path observations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("invalid prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("empty AS path for {0}")]
    EmptyPath(String),

    #[error("AS path has {hops} hops but country path has {countries}")]
    CountryPathMismatch { hops: usize, countries: usize },

    #[error("malformed observation line: {0:?}")]
    MalformedLine(String),
}

/// Errors related to configuration and region tables.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
