//! Resilient streaming transfers between a process and an S3-compatible
//! object store: session acquisition, recursive listing, single-object
//! download and multipart upload, all under bounded retry with backoff.

pub mod config;
pub mod error;
pub mod path;
pub mod retry;
pub mod session;
pub mod sniff;
pub mod transfer;

pub use config::S3Config;
pub use error::TransferError;
pub use path::ObjectPath;
pub use retry::RetryPolicy;
pub use session::Session;
pub use transfer::{part_size_for, SequentialWriter, UploadOptions, MAX_PARTS, MIN_PART_SIZE};
