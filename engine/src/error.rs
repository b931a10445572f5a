//! Error types for the Jot engine.
//!
//! Failures are split by domain so call sites can decide, explicitly, what
//! to absorb and what to surface: local store failures are fatal and always
//! propagate, remote failures are absorbed on the write paths and terminate
//! the realtime stream on the subscription path.

use thiserror::Error;

/// Failures of the durable local store. Always surfaced to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row for note {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Failures of the remote store adapter.
///
/// `Unavailable` covers every transient transport problem; the next sync
/// trigger retries implicitly. `PermissionDenied` means the namespace is not
/// accessible to the caller and is terminal for an open subscription.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied for namespace '{0}'")]
    PermissionDenied(String),
}

/// Failures observable on the realtime sync stream.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No principal present; realtime sync requires a signed-in identity.
    #[error("not signed in")]
    Unauthenticated,

    /// The remote subscription failed or was revoked.
    #[error("subscription failed: {0}")]
    Subscription(#[from] RemoteError),

    /// Merging a snapshot into the local store failed. Fatal.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for local store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for remote adapter operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
