//! Error types for Spark's ingestion and entry management.

use thiserror::Error;

/// Domain errors raised by connectors, the entry model and the storage layer.
///
/// Application code wraps these in [`anyhow::Error`]; callers that need to
/// branch on a specific failure (for example the importance validation in
/// `entries add`) downcast back to `SparkError`.
#[derive(Error, Debug)]
pub enum SparkError {
    #[error("invalid importance: {0}")]
    InvalidImportance(String),

    #[error("no events in feed: {0}")]
    EmptyFeed(String),

    #[error("missing date: {0}")]
    MissingDate(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("no location found for {0:?}")]
    NoLocation(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("entry not found: {0}")]
    EntryNotFound(i64),

    #[error("HTTP request for {uri} failed with status {status}")]
    Http { status: u16, uri: String },

    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}
