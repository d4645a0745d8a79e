//! Planner Error Types
//!
//! The planner mostly degrades instead of failing: missing statistics fall
//! back to default estimates. Hard errors only come up from the storage
//! layer while deriving statistics.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] quarry_storage::Error),
}
