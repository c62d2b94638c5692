//! Error types for vigil-core

use thiserror::Error;

/// Error type for session cache operations
///
/// Cloneable so that a single upstream failure can be handed to every
/// caller coalesced onto the same snapshot fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A required argument was missing or blank
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A set-once field was assigned a second, different value
    #[error("{field} already set to '{existing}', rejected '{attempted}'")]
    DuplicateSetOnce {
        field: &'static str,
        existing: String,
        attempted: String,
    },

    /// The session owner failed to produce a snapshot
    #[error("Snapshot request for {key} failed: {reason}")]
    Upstream { key: String, reason: String },

    /// The fetch task went away without resolving its waiters
    #[error("Snapshot fetch was abandoned before completing")]
    FetchAbandoned,

    /// The process-wide registry was used before `registry::init`
    #[error("Session cache registry has not been initialized")]
    NotInitialized,

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for session cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
