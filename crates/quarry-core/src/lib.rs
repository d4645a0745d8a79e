pub mod bitmap;
pub mod column;
pub mod error;
pub mod types;

pub use bitmap::Bitmap;
pub use column::{Batch, Column};
pub use error::{Error, Result};
pub use types::{DataType, Datum};
