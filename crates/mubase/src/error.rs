//! Error types for mubase operations.
//!
//! The kernel follows a "best effort" philosophy for graph construction:
//! unresolved calls, imports, and type references are normal values, not
//! errors, and the builder silently skips them. Typed errors are reserved
//! for the situations a caller can act on:
//!
//! - **`Locked`** — another writer holds the store; reroute or retry
//! - **`NodeNotFound`** / **`AmbiguousNode`** — resolver outcomes surfaced
//!   for display or interactive choice
//! - **`Syntax`** — MUQL parse failure with position; fails fast
//! - **`Database`** / **`Io`** — infrastructure failures
//!
//! MUQL *execution* failures are deliberately not represented here: they
//! are returned as a [`QueryOutput::Failed`](crate::muql::QueryOutput)
//! value so batch and interactive callers keep uniform control flow.

use std::path::PathBuf;
use thiserror::Error;

use crate::resolver::Candidate;

/// Result type for mubase operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for mubase operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The store already has an exclusive writer.
    ///
    /// Returned immediately rather than blocking, so the caller can retry,
    /// fail, or delegate to whichever process holds the lock.
    #[error("store is locked by another writer: {path}")]
    Locked {
        /// Path to the lock file that is already held.
        path: PathBuf,
    },

    /// No node matched the reference string.
    #[error("no node matches reference '{reference}'")]
    NodeNotFound {
        /// The reference that failed to resolve.
        reference: String,
    },

    /// More than one node matched under the `Strict` strategy.
    ///
    /// Carries the full ranked candidate list for display.
    #[error("reference '{reference}' is ambiguous ({} candidates)", .candidates.len())]
    AmbiguousNode {
        /// The reference that resolved to multiple nodes.
        reference: String,
        /// All candidates, ranked by score descending then id ascending.
        candidates: Vec<Candidate>,
    },

    /// MUQL query failed to parse.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// What was wrong with the input.
        message: String,
        /// Byte offset into the query text.
        position: usize,
    },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid input (a caller contract violation).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
