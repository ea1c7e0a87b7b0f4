//! Error taxonomy (spec §7).
//!
//! `HxhimError` is the single error type returned by fallible public APIs across every
//! HXHIM crate. Per-entry failures inside a bulk operation are represented as *data*
//! (a zero-length value plus an [`ErrorKind`] tag on that entry) rather than as a `Result`
//! failure, so this type is reserved for session- and call-level failures.

use thiserror::Error;

/// Result alias used throughout HXHIM.
pub type HxhimResult<T> = std::result::Result<T, HxhimError>;

/// The kind of failure, independent of any attached context.
///
/// Mirrors spec §7 exactly: these are the only error kinds the core recognizes.
/// `NotFound` is included for completeness but is normally represented as a
/// zero-length value rather than surfaced through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Null/empty component where required; bad op code; out-of-range count.
    InputInvalid,
    /// A bulk submission exceeded the compile-time batch bound.
    QueueFull,
    /// The embedded ordered store returned failure.
    StoreError,
    /// Send or receive could not complete and shutdown was not set.
    TransportError,
    /// Operation aborted because the session is closing.
    Shutdown,
    /// An internal routing attempt found a key outside any known slice.
    StatsInvariantViolated,
    /// Lookup succeeded but the key did not exist.
    NotFound,
}

/// The error type returned by HXHIM's fallible public APIs.
#[derive(Debug, Error)]
pub enum HxhimError {
    /// A null/empty component, bad op code, or out-of-range count.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A bulk submission exceeded `Limits::MAX_BULK_OPS` or a queue's batch capacity.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// The embedded ordered store rejected an operation.
    #[error("store error: {0}")]
    Store(String),

    /// The transport could not complete a send/receive and the session is not shutting down.
    #[error("transport error: {0}")]
    Transport(String),

    /// The operation was abandoned because the session's shutdown flag was observed.
    #[error("session is shutting down")]
    Shutdown,

    /// A routing lookup found a key outside every known slice; treated as a query miss.
    #[error("key not covered by any known slice for index {index}")]
    StatsInvariantViolated {
        /// Index name the lookup was routed against.
        index: String,
    },

    /// Wraps an `std::io::Error` from the reference ordered-store backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a manifest cross-check failure at session open (spec §6).
    #[error("manifest mismatch: {0}")]
    ManifestMismatch(String),
}

impl HxhimError {
    /// The [`ErrorKind`] this error belongs to, used by bulk handlers to decide
    /// whether a whole response message's error code should be set (§7 propagation policy).
    pub fn kind(&self) -> ErrorKind {
        match self {
            HxhimError::InputInvalid(_) => ErrorKind::InputInvalid,
            HxhimError::QueueFull(_) => ErrorKind::QueueFull,
            HxhimError::Store(_) => ErrorKind::StoreError,
            HxhimError::Transport(_) => ErrorKind::TransportError,
            HxhimError::Shutdown => ErrorKind::Shutdown,
            HxhimError::StatsInvariantViolated { .. } => ErrorKind::StatsInvariantViolated,
            HxhimError::Io(_) => ErrorKind::StoreError,
            HxhimError::ManifestMismatch(_) => ErrorKind::InputInvalid,
        }
    }
}
