//! Error taxonomy for the transfer layer.

use thiserror::Error;

/// Boxed cause attached to the typed variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by session acquisition and transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The logical path has no resolvable bucket segment. Never retried.
    #[error("invalid object path {0:?}: expected <bucket>[/<key segment>...]")]
    InvalidPath(String),

    /// Session construction or the health probe failed on every attempt.
    #[error("could not establish object store session after {attempts} attempts")]
    Connection {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// A list/get/put round-trip against the store failed on every attempt.
    #[error("{op} failed for s3://{bucket}/{key}")]
    Storage {
        op: &'static str,
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    /// The local upload source could not be read.
    #[error("failed to read upload source")]
    Read(#[source] std::io::Error),
}
