//! Crate-wide error type.
//!
//! Mirrors the taxonomy in the error-handling design: a small set of
//! semantically named variants rather than one opaque "something went
//! wrong" bucket, so callers can match on what happened instead of
//! grepping a message string.

use std::fmt;

use crate::copy_paste::strategy::WriteStats;

/// A boxed driver error, kept opaque so the pipeline never has to know
/// the concrete error type a `DriverAdapter` implementation throws.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a driver-thrown error, produced by
/// `DriverAdapter::classify_error`. Determines retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Throttle,
    Network,
    Conflict,
    Validator,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Throttle => "throttle",
            ErrorKind::Network => "network",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validator => "validator",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("operation error: {0}")]
    OperationError(String),

    #[error("keep-alive timed out after {elapsed_ms}ms (timeout {timeout_ms}ms)")]
    KeepAliveTimeout { elapsed_ms: u64, timeout_ms: u64 },

    #[error("retry exhausted after {attempts} attempts with no progress")]
    MaxAttempts { attempts: u32 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("scrape verification failed: {0}")]
    ScrapeVerification(String),

    #[error("unmapped category {category:?} for operator {operator:?}")]
    UnknownCategory { category: String, operator: String },

    #[error("driver error: {0}")]
    Driver(#[source] DriverError),
}

impl Error {
    pub fn classify_default(&self) -> ErrorKind {
        match self {
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::ArgumentError(_) | Error::OperationError(_) => ErrorKind::Validator,
            _ => ErrorKind::Other,
        }
    }
}

/// Fatal error raised by the streaming writer. Always carries the partial
/// `WriteStats` accumulated before the failure, per the error-handling
/// design: partial progress is never discarded just because the
/// operation ultimately failed.
#[derive(Debug, thiserror::Error)]
#[error("write operation failed after processing {} documents: {source}", stats.total_processed)]
pub struct WriterError {
    pub stats: WriteStats,
    #[source]
    pub source: Error,
}

impl WriterError {
    pub fn new(stats: WriteStats, source: Error) -> Self {
        WriterError { stats, source }
    }
}
