//! Quarry Storage Layer
//!
//! This crate implements the columnar object storage core: the component
//! that turns batches of typed columns into immutable, self-describing
//! object files and back, and that compacts block sets into new sorted
//! objects.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │   Batches    │
//! └──────┬───────┘
//!        │ write_batch
//!        ▼
//! ┌──────────────────┐
//! │  ObjectWriter    │  blocks, zone maps, bloom filters, object meta
//! └────────┬─────────┘
//!          │ object bytes
//!          ▼
//! ┌──────────────────┐
//! │  File service    │  (object_store: S3 / local / in-memory)
//! └────────┬─────────┘
//!          │ ranged reads
//!          ▼
//! ┌──────────────────┐
//! │  ObjectReader    │  footer → metadata → columns
//! └────────┬─────────┘
//!          │ columns + per-column statistics
//!          ▼
//!   stats derivation, scans, MergeBlocksTask
//! ```
//!
//! ## Main Components
//!
//! - [`object::ObjectWriter`] / [`object::ObjectReader`]: the on-disk
//!   object contract (versioned header, extents, compressed areas, footer)
//! - [`zonemap::ZoneMap`]: fixed-width min/max summaries driving scan
//!   pruning and NDV estimation
//! - [`bloom::BlockBloomFilter`]: per-block key-presence filters
//! - [`catalog::Relation`]: the arena-backed catalog slice compaction
//!   operates on
//! - [`merge::MergeBlocksTask`]: merge-sort compaction of N blocks into a
//!   new sorted segment

pub mod bloom;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod merge;
pub mod name;
pub mod object;
pub mod zonemap;

pub use catalog::{Relation, TableSchema};
pub use codec::{BlockIndex, Compression, Extent};
pub use config::StorageConfig;
pub use error::{Error, Result};
pub use merge::{MergeBlocksTask, MergeOutcome};
pub use name::{Location, ObjectName, ObjectRole};
pub use object::{load_object_meta, BlockMeta, ColumnMeta, ObjectMeta, ObjectReader, ObjectWriter};
pub use zonemap::ZoneMap;
