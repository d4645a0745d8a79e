//! Object Storage Format
//!
//! This module implements the binary file format for immutable columnar
//! objects.
//!
//! ## Object File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes, at offset 0)                              │
//! │ - Schema version (4 bytes)                                  │
//! │ - Object-meta extent (13 bytes, patched at finish)          │
//! │ - Reserved                                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Column payloads, column-major:                              │
//! │   col 0 of block 0, col 0 of block 1, …, col 1 of block 0…  │
//! │   each = lz4(io-entry header ∥ column bytes)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Bloom-filter area                                           │
//! │   lz4(io-entry header ∥ block index ∥ per-block bf bytes)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Zone-map area                                               │
//! │   lz4(io-entry header ∥ block index ∥ per-block zm bytes)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Object meta                                                 │
//! │   lz4(io-entry header ∥ object meta body ∥ block index      │
//! │       ∥ per-block metas)                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (23 bytes, at end of file)                           │
//! │ - Object-meta extent (13 bytes)                             │
//! │ - Format version (2 bytes)                                  │
//! │ - Magic (8 bytes)                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The extents of all column payloads, then the bloom-filter area, then
//! the zone-map area, then the object-meta area are strictly increasing
//! and contiguous, starting at `HEADER_SIZE`. Readers depend on the
//! column-major payload order within an object; no ordering is guaranteed
//! across objects.

pub mod meta;
pub mod reader;
pub mod writer;

pub use meta::{BlockMeta, ColumnMeta, Footer, ObjectMeta, Seqnums};
pub use reader::{load_object_meta, ObjectReader};
pub use writer::ObjectWriter;

/// Magic tag closing every object file.
pub const MAGIC: u64 = 0x0051_5552_4f424a31; // "1JBO RUQ\0" little-endian

/// Object format version.
pub const VERSION: u16 = 1;

/// Object header size (64 bytes).
pub const HEADER_SIZE: usize = 64;

/// Object footer size: meta extent ∥ version ∥ magic.
pub const FOOTER_SIZE: usize = crate::codec::EXTENT_SIZE + 2 + 8;
