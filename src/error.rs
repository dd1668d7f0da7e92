// src/error.rs

//! Crate-wide error type.
//!
//! Adapter failures carry the command context; ledger I/O wraps rusqlite
//! directly. Resolution misses are not errors, they are per-process outcomes
//! handled in the scanner.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A package-manager or process-snapshot adapter failed or timed out.
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Usage ledger storage failure.
    #[error("Ledger error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An unknown package filter was requested.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
