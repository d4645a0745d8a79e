//! Object, Block and Column Metadata
//!
//! Owned metadata records with exact little-endian encodings. One
//! `ColumnMeta` shape serves both levels: per-block records carry the
//! block-local location and zone map, the object-level records carry the
//! per-column aggregate location, zone map and NDV.

use bytes::{Buf, BufMut};
use quarry_core::types::DataType;

use crate::codec::{BlockIndex, EntryKind, Extent, IoEntryHeader, EXTENT_SIZE};
use crate::error::{Error, Result};
use crate::object::{FOOTER_SIZE, MAGIC, VERSION};
use crate::zonemap::{ZoneMap, ZM_WIDTH};

/// Mapping from logical column index to stable column identifier.
///
/// When a block is written without an explicit list, a dense `0..n-1`
/// mapping is assigned; readers reproduce the same mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seqnums {
    pub seqs: Vec<u16>,
    pub max_seq: u16,
}

impl Seqnums {
    pub fn new(seqs: Option<Vec<u16>>) -> Self {
        match seqs {
            Some(seqs) if !seqs.is_empty() => {
                let max_seq = seqs.iter().copied().max().unwrap_or(0);
                Self { seqs, max_seq }
            }
            _ => Self::default(),
        }
    }

    pub fn init_with_col_cnt(&mut self, col_cnt: usize) {
        self.seqs = (0..col_cnt as u16).collect();
        self.max_seq = col_cnt.saturating_sub(1) as u16;
    }

    pub fn dense(col_cnt: usize) -> Self {
        let mut s = Self::default();
        s.init_with_col_cnt(col_cnt);
        s
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }
}

/// Per-column metadata record, fixed width.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub seqnum: u16,
    pub data_type: DataType,
    pub ndv: u32,
    pub null_cnt: u32,
    pub location: Extent,
    pub zone_map: ZoneMap,
}

/// Encoded size of a `ColumnMeta`.
pub const COLUMN_META_SIZE: usize = 2 + 1 + 4 + 4 + EXTENT_SIZE + ZM_WIDTH;

impl ColumnMeta {
    pub fn new(seqnum: u16) -> Self {
        Self {
            seqnum,
            data_type: DataType::Any,
            ndv: 0,
            null_cnt: 0,
            location: Extent::default(),
            zone_map: ZoneMap::new(DataType::Any),
        }
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.seqnum);
        buf.put_u8(self.data_type.to_u8());
        buf.put_u32_le(self.ndv);
        buf.put_u32_le(self.null_cnt);
        self.location.marshal(buf);
        self.zone_map.marshal(buf);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < COLUMN_META_SIZE {
            return Err(Error::InvalidObject("truncated column meta".to_string()));
        }
        let seqnum = buf.get_u16_le();
        let data_type = DataType::try_from_u8(buf.get_u8())?;
        let ndv = buf.get_u32_le();
        let null_cnt = buf.get_u32_le();
        let location = Extent::unmarshal(buf)?;
        let zone_map = ZoneMap::unmarshal(data_type, buf)?;
        Ok(Self {
            seqnum,
            data_type,
            ndv,
            null_cnt,
            location,
            zone_map,
        })
    }
}

/// Per-block metadata: a header plus one `ColumnMeta` slot per seqnum in
/// `0..meta_column_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMeta {
    /// Index of this block within its object, assigned by the writer.
    pub sequence: u16,
    pub rows: u32,
    /// Number of columns actually present in the block.
    pub column_count: u16,
    /// Number of column-meta slots (`max_seqnum + 1`).
    pub meta_column_count: u16,
    pub max_seqnum: u16,
    /// The owning object's metadata extent, stamped at finish.
    pub meta_location: Extent,
    pub columns: Vec<ColumnMeta>,
}

/// Encoded size of a block-meta header, before its column metas.
pub const BLOCK_META_HEADER_SIZE: usize = 2 + 4 + 2 + 2 + 2 + EXTENT_SIZE;

impl BlockMeta {
    pub fn new(seqnums: &Seqnums) -> Self {
        let meta_column_count = if seqnums.is_empty() {
            0
        } else {
            seqnums.max_seq + 1
        };
        Self {
            sequence: 0,
            rows: 0,
            column_count: 0,
            meta_column_count,
            max_seqnum: seqnums.max_seq,
            meta_location: Extent::default(),
            columns: (0..meta_column_count).map(ColumnMeta::new).collect(),
        }
    }

    pub fn column_meta(&self, seqnum: u16) -> &ColumnMeta {
        &self.columns[seqnum as usize]
    }

    pub fn column_meta_mut(&mut self, seqnum: u16) -> &mut ColumnMeta {
        &mut self.columns[seqnum as usize]
    }

    pub fn size_bytes(&self) -> u32 {
        (BLOCK_META_HEADER_SIZE + self.columns.len() * COLUMN_META_SIZE) as u32
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.sequence);
        buf.put_u32_le(self.rows);
        buf.put_u16_le(self.column_count);
        buf.put_u16_le(self.meta_column_count);
        buf.put_u16_le(self.max_seqnum);
        self.meta_location.marshal(buf);
        for col in &self.columns {
            col.marshal(buf);
        }
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < BLOCK_META_HEADER_SIZE {
            return Err(Error::InvalidObject("truncated block meta".to_string()));
        }
        let sequence = buf.get_u16_le();
        let rows = buf.get_u32_le();
        let column_count = buf.get_u16_le();
        let meta_column_count = buf.get_u16_le();
        let max_seqnum = buf.get_u16_le();
        let meta_location = Extent::unmarshal(buf)?;
        let mut columns = Vec::with_capacity(meta_column_count as usize);
        for _ in 0..meta_column_count {
            columns.push(ColumnMeta::unmarshal(buf)?);
        }
        Ok(Self {
            sequence,
            rows,
            column_count,
            meta_column_count,
            max_seqnum,
            meta_location,
            columns,
        })
    }
}

/// Object-level header inside the metadata area.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetaHeader {
    pub column_count: u16,
    pub meta_column_count: u16,
    pub max_seqnum: u16,
    /// Total rows across all blocks.
    pub rows: u32,
    pub block_count: u32,
    /// Uncompressed layout extent of the metadata area itself.
    pub meta_location: Extent,
    pub bf_extent: Extent,
    pub zonemap_extent: Extent,
}

/// Encoded size of an `ObjectMetaHeader`.
pub const OBJECT_META_HEADER_SIZE: usize = 2 + 2 + 2 + 4 + 4 + 3 * EXTENT_SIZE;

impl ObjectMetaHeader {
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.column_count);
        buf.put_u16_le(self.meta_column_count);
        buf.put_u16_le(self.max_seqnum);
        buf.put_u32_le(self.rows);
        buf.put_u32_le(self.block_count);
        self.meta_location.marshal(buf);
        self.bf_extent.marshal(buf);
        self.zonemap_extent.marshal(buf);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < OBJECT_META_HEADER_SIZE {
            return Err(Error::InvalidObject("truncated object meta header".to_string()));
        }
        Ok(Self {
            column_count: buf.get_u16_le(),
            meta_column_count: buf.get_u16_le(),
            max_seqnum: buf.get_u16_le(),
            rows: buf.get_u32_le(),
            block_count: buf.get_u32_le(),
            meta_location: Extent::unmarshal(buf)?,
            bf_extent: Extent::unmarshal(buf)?,
            zonemap_extent: Extent::unmarshal(buf)?,
        })
    }
}

/// The decoded metadata area of one object: object-level aggregates plus
/// every block's metadata. Loading this once yields all block-level zone
/// maps for free.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub header: ObjectMetaHeader,
    /// Object-level per-column aggregates, one slot per seqnum.
    pub col_metas: Vec<ColumnMeta>,
    pub block_metas: Vec<BlockMeta>,
}

impl ObjectMeta {
    pub fn column_meta(&self, seqnum: u16) -> Option<&ColumnMeta> {
        self.col_metas.get(seqnum as usize)
    }

    pub fn block_meta(&self, id: u32) -> Option<&BlockMeta> {
        self.block_metas.get(id as usize)
    }

    /// Decode a decompressed metadata area.
    pub fn unmarshal(area: &[u8]) -> Result<Self> {
        let mut buf = area;
        IoEntryHeader::expect(&mut buf, EntryKind::ObjMeta)?;
        let header = ObjectMetaHeader::unmarshal(&mut buf)?;
        let mut col_metas = Vec::with_capacity(header.meta_column_count as usize);
        for _ in 0..header.meta_column_count {
            col_metas.push(ColumnMeta::unmarshal(&mut buf)?);
        }
        let index = BlockIndex::unmarshal(&mut buf)?;
        if index.block_count() != header.block_count {
            return Err(Error::InvalidObject(format!(
                "block index count {} does not match header {}",
                index.block_count(),
                header.block_count
            )));
        }
        let mut block_metas = Vec::with_capacity(header.block_count as usize);
        for _ in 0..header.block_count {
            block_metas.push(BlockMeta::unmarshal(&mut buf)?);
        }
        Ok(Self {
            header,
            col_metas,
            block_metas,
        })
    }
}

/// Trailer of every object file. The marshal order is exact: extent bytes,
/// version, magic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footer {
    pub meta_extent: Extent,
    pub version: u16,
    pub magic: u64,
}

impl Footer {
    pub fn new(meta_extent: Extent) -> Self {
        Self {
            meta_extent,
            version: VERSION,
            magic: MAGIC,
        }
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.meta_extent.marshal(buf);
        buf.put_u16_le(self.version);
        buf.put_u64_le(self.magic);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < FOOTER_SIZE {
            return Err(Error::InvalidObject("truncated footer".to_string()));
        }
        let meta_extent = Extent::unmarshal(buf)?;
        let version = buf.get_u16_le();
        let magic = buf.get_u64_le();
        if magic != MAGIC {
            return Err(Error::Core(quarry_core::Error::InvalidMagic));
        }
        if version > VERSION {
            return Err(Error::Core(quarry_core::Error::UnsupportedVersion(version)));
        }
        Ok(Self {
            meta_extent,
            version,
            magic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use quarry_core::column::Column;

    #[test]
    fn test_seqnums_dense() {
        let s = Seqnums::dense(4);
        assert_eq!(s.seqs, vec![0, 1, 2, 3]);
        assert_eq!(s.max_seq, 3);
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_seqnums_explicit() {
        let s = Seqnums::new(Some(vec![2, 5, 7]));
        assert_eq!(s.max_seq, 7);
        assert_eq!(s.len(), 3);
        let empty = Seqnums::new(None);
        assert!(empty.is_empty());
        assert_eq!(empty.max_seq, 0);
    }

    #[test]
    fn test_column_meta_roundtrip() {
        let mut cm = ColumnMeta::new(3);
        cm.data_type = DataType::Int64;
        cm.ndv = 100;
        cm.null_cnt = 7;
        cm.location = Extent::new(Compression::Lz4, 64, 32, 80);
        cm.zone_map = ZoneMap::from_column(&Column::int64(vec![1, 9]));
        let mut buf = Vec::new();
        cm.marshal(&mut buf);
        assert_eq!(buf.len(), COLUMN_META_SIZE);
        let restored = ColumnMeta::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(cm, restored);
        assert_eq!(restored.zone_map.min_f64(), Some(1.0));
    }

    #[test]
    fn test_block_meta_slots_cover_max_seqnum() {
        let bm = BlockMeta::new(&Seqnums::new(Some(vec![0, 4])));
        assert_eq!(bm.meta_column_count, 5);
        assert_eq!(bm.max_seqnum, 4);
        assert_eq!(bm.columns.len(), 5);
    }

    #[test]
    fn test_block_meta_roundtrip() {
        let mut bm = BlockMeta::new(&Seqnums::dense(2));
        bm.sequence = 1;
        bm.rows = 8192;
        bm.column_count = 2;
        bm.column_meta_mut(0).data_type = DataType::Int32;
        bm.column_meta_mut(1).data_type = DataType::Varchar;
        let mut buf = Vec::new();
        bm.marshal(&mut buf);
        assert_eq!(buf.len() as u32, bm.size_bytes());
        let restored = BlockMeta::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(bm, restored);
    }

    #[test]
    fn test_footer_marshal_order() {
        let footer = Footer::new(Extent::new(Compression::Lz4, 500, 40, 90));
        let mut buf = Vec::new();
        footer.marshal(&mut buf);
        assert_eq!(buf.len(), FOOTER_SIZE);
        // extent first, version next, magic last
        assert_eq!(buf[0], Compression::Lz4 as u8);
        assert_eq!(
            u16::from_le_bytes(buf[EXTENT_SIZE..EXTENT_SIZE + 2].try_into().unwrap()),
            VERSION
        );
        assert_eq!(
            u64::from_le_bytes(buf[EXTENT_SIZE + 2..].try_into().unwrap()),
            MAGIC
        );
        let restored = Footer::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(footer, restored);
    }

    #[test]
    fn test_footer_bad_magic() {
        let footer = Footer::new(Extent::default());
        let mut buf = Vec::new();
        footer.marshal(&mut buf);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(Footer::unmarshal(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_footer_future_version_rejected() {
        let mut footer = Footer::new(Extent::default());
        footer.version = VERSION + 1;
        let mut buf = Vec::new();
        footer.marshal(&mut buf);
        assert!(Footer::unmarshal(&mut buf.as_slice()).is_err());
    }
}
