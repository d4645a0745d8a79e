//! Error Types for Quarry Core
//!
//! This module defines the error types shared by the column containers and
//! the on-disk primitives built on top of them.
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: an object file doesn't end with the expected magic tag
//! - `InvalidData`: malformed column or metadata bytes
//!
//! ### Version/Compatibility Errors
//! - `UnsupportedVersion`: data written by a newer format version
//! - `InvalidCompression`: unknown compression algorithm tag
//! - `InvalidTypeTag`: unknown data-type tag
//!
//! ### Compression Errors
//! - `Compression` / `Decompression`: codec failure (likely corruption)
//!
//! ## Usage
//! All fallible functions return `Result<T>` which is aliased to
//! `Result<T, Error>`, so `?` propagates cleanly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u8),

    #[error("Invalid data type tag: {0}")]
    InvalidTypeTag(u8),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
