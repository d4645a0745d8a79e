//! Compression Framing, Extents and Entry Headers
//!
//! Every intra-object reference is an `Extent`: which compression algorithm
//! the bytes use, where they start, how long they are on disk and how long
//! they decompress to. Every serialized area opens with a two-byte
//! `IoEntryHeader` naming its kind and format version, and block-granular
//! areas carry a `BlockIndex` table locating each block's slice.
//!
//! ## Encodings (all little-endian)
//!
//! ```text
//! Extent:        alg (1) ∥ offset (4) ∥ length (4) ∥ origin (4)   = 13 bytes
//! IoEntryHeader: kind (1) ∥ version (1)                           = 2 bytes
//! BlockIndex:    count (4) ∥ count × (offset (4) ∥ length (4))
//! ```

use bytes::{Buf, BufMut};
use quarry_core::error::{Error as CoreError, Result as CoreResult};

use crate::error::{Error, Result};

/// Compression algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    Lz4 = 1,
}

impl Compression {
    pub fn try_from_u8(tag: u8) -> CoreResult<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            other => Err(CoreError::InvalidCompression(other)),
        }
    }
}

/// The location of a compressed byte run inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub alg: Compression,
    pub offset: u32,
    pub length: u32,
    pub origin: u32,
}

/// Encoded size of an `Extent`.
pub const EXTENT_SIZE: usize = 13;

impl Extent {
    pub fn new(alg: Compression, offset: u32, length: u32, origin: u32) -> Self {
        Self {
            alg,
            offset,
            length,
            origin,
        }
    }

    pub fn end(&self) -> u32 {
        self.offset + self.length
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.alg as u8);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(self.length);
        buf.put_u32_le(self.origin);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < EXTENT_SIZE {
            return Err(Error::InvalidObject("truncated extent".to_string()));
        }
        let alg = Compression::try_from_u8(buf.get_u8())?;
        Ok(Self {
            alg,
            offset: buf.get_u32_le(),
            length: buf.get_u32_le(),
            origin: buf.get_u32_le(),
        })
    }
}

/// What a serialized area contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    ColData = 1,
    ObjMeta = 2,
    Bf = 3,
    Zm = 4,
}

impl EntryKind {
    pub fn try_from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(EntryKind::ColData),
            2 => Ok(EntryKind::ObjMeta),
            3 => Ok(EntryKind::Bf),
            4 => Ok(EntryKind::Zm),
            other => Err(Error::InvalidObject(format!(
                "unknown io entry kind: {other}"
            ))),
        }
    }
}

/// Current format version for every entry kind.
pub const IO_ENTRY_VERSION: u8 = 1;

/// Two-byte header opening every serialized area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEntryHeader {
    pub kind: EntryKind,
    pub version: u8,
}

/// Encoded size of an `IoEntryHeader`.
pub const IO_ENTRY_HEADER_SIZE: usize = 2;

impl IoEntryHeader {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            version: IO_ENTRY_VERSION,
        }
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.version);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < IO_ENTRY_HEADER_SIZE {
            return Err(Error::InvalidObject("truncated io entry header".to_string()));
        }
        let kind = EntryKind::try_from_u8(buf.get_u8())?;
        let version = buf.get_u8();
        Ok(Self { kind, version })
    }

    /// Read and validate the header of an area expected to hold `kind`.
    pub fn expect(buf: &mut &[u8], kind: EntryKind) -> Result<Self> {
        let header = Self::unmarshal(buf)?;
        if header.kind != kind {
            return Err(Error::InvalidObject(format!(
                "io entry kind mismatch: expected {kind:?}, got {:?}",
                header.kind
            )));
        }
        if header.version > IO_ENTRY_VERSION {
            return Err(Error::Core(quarry_core::Error::UnsupportedVersion(
                header.version as u16,
            )));
        }
        Ok(header)
    }
}

/// Length-prefixed table of per-block `(offset, length)` positions within
/// an area. `BlockIndex::new(n)` builds a table of exactly `n` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    entries: Vec<(u32, u32)>,
}

impl BlockIndex {
    pub fn new(block_count: u32) -> Self {
        Self {
            entries: vec![(0, 0); block_count as usize],
        }
    }

    pub fn block_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn set_entry(&mut self, i: usize, offset: u32, length: u32) {
        self.entries[i] = (offset, length);
    }

    pub fn entry(&self, i: usize) -> (u32, u32) {
        self.entries[i]
    }

    /// Encoded size of the table itself.
    pub fn size_bytes(&self) -> u32 {
        4 + 8 * self.entries.len() as u32
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u32_le(self.entries.len() as u32);
        for (offset, length) in &self.entries {
            buf.put_u32_le(*offset);
            buf.put_u32_le(*length);
        }
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::InvalidObject("truncated block index".to_string()));
        }
        let n = buf.get_u32_le() as usize;
        if buf.remaining() < n * 8 {
            return Err(Error::InvalidObject("truncated block index run".to_string()));
        }
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push((buf.get_u32_le(), buf.get_u32_le()));
        }
        Ok(Self { entries })
    }
}

/// Compress `input` into `scratch` (grown to the compress bound as needed)
/// and return the number of compressed bytes written.
pub fn compress_into(scratch: &mut Vec<u8>, input: &[u8]) -> Result<usize> {
    let bound = lz4_flex::block::get_maximum_output_size(input.len());
    if scratch.len() < bound {
        scratch.resize(bound, 0);
    }
    lz4_flex::block::compress_into(input, scratch)
        .map_err(|e| Error::Core(quarry_core::Error::Compression(e.to_string())))
}

/// Decompress the byte run addressed by `extent`.
pub fn decompress(data: &[u8], extent: &Extent) -> Result<Vec<u8>> {
    match extent.alg {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => lz4_flex::block::decompress(data, extent.origin as usize)
            .map_err(|e| Error::Core(quarry_core::Error::Decompression(e.to_string()))),
    }
}
