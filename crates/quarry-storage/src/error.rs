//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### File Service Errors
//! - `ObjectStore`: a low-level object store operation failed. The
//!   already-exists condition stays distinguishable through this variant so
//!   the idempotent write path can special-case it.
//!
//! ### Object Errors
//! - `InvalidObject`: a file violates the object layout (bad magic, extent
//!   out of bounds, truncated metadata)
//!
//! ### Task Errors
//! - `Cancelled`: the operation's cancellation handle fired; surfaced
//!   unchanged to the caller
//! - `EmptyMerge`: a merge task was handed no live input rows
//!
//! All storage operations return `Result<T>` aliased to `Result<T, Error>`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] quarry_core::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Merge produced no rows: {0}")]
    EmptyMerge(String),

    #[error("Block not found: {0}")]
    BlockNotFound(u64),
}
