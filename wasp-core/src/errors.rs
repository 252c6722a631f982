// src/errors.rs
//! Error taxonomy for the enforcement core.
//!
//! Storage problems (I/O, SQL, schema) collapse into the single `Storage`
//! category: callers cannot meaningfully distinguish a failed disk write
//! from a corrupt schema, and the process must not continue on a half-open
//! handle either way.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Validation of platform names, trust labels, identifiers or payload shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The data directory has no store yet; `init` must run first.
    #[error("store not initialized; run `wasp init` first")]
    NotInitialized,

    /// Any I/O, SQL or schema failure from the embedded store.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Admin surface called without valid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Sliding-window budget exhausted for the caller's key.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Invalid configuration. Raised at startup, never at first use.
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// The named row does not exist. Non-fatal; reported, not panicked.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
