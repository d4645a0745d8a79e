//! Object Writer - Building Immutable Columnar Objects
//!
//! `ObjectWriter` accumulates blocks (one per appended batch), then lays
//! the whole object out in a single `finish` call and hands the bytes to
//! the file service.
//!
//! ## What Does ObjectWriter Do?
//!
//! 1. **Accumulates blocks**: each `write_batch` compresses every column
//!    payload immediately and records its column metadata (type tag, null
//!    count, NDV, zone map)
//! 2. **Lays out payloads column-major**: all blocks' column 0, then all
//!    blocks' column 1, and so on; readers depend on this order
//! 3. **Builds the statistics areas**: bloom filters and zone maps, each a
//!    block-indexed, LZ4-compressed unit
//! 4. **Builds the object meta**: object-level aggregates plus every
//!    block's metadata, one compressed unit
//! 5. **Closes with a footer**: meta extent, format version, magic
//! 6. **Uploads idempotently**: an already-existing object is deleted and
//!    rewritten once; any other error propagates
//!
//! ## Lifecycle
//!
//! A writer accepts `write_batch` calls and dies in `finish`, which
//! consumes it: reuse after finish is a compile error. Producers that
//! share one writer wrap it in a mutex and hand it off for the final call.
//!
//! ## Example
//!
//! ```ignore
//! let mut writer = ObjectWriter::new(fs, name, schema_version, None);
//! for batch in batches {
//!     writer.write_batch(&batch)?;
//! }
//! let blocks = writer.finish(&ctx).await?;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use object_store::{ObjectStore, PutMode, PutOptions};
use tokio_util::sync::CancellationToken;

use quarry_core::column::Batch;
use quarry_core::types::DataType;

use crate::bloom::BlockBloomFilter;
use crate::codec::{
    compress_into, BlockIndex, Compression, EntryKind, Extent, IoEntryHeader,
};
use crate::error::{Error, Result};
use crate::name::{ObjectName, ObjectRole};
use crate::object::meta::{
    BlockMeta, ColumnMeta, Footer, ObjectMetaHeader, Seqnums, COLUMN_META_SIZE,
    OBJECT_META_HEADER_SIZE,
};
use crate::object::HEADER_SIZE;
use crate::zonemap::{ZoneMap, ZM_WIDTH};

struct BlockData {
    meta: BlockMeta,
    seqnums: Seqnums,
    /// Compressed column payloads, one per logical column index.
    data: Vec<Vec<u8>>,
    bloom_filter: Vec<u8>,
}

pub struct ObjectWriter {
    fs: Arc<dyn ObjectStore>,
    name: ObjectName,
    schema_version: u32,
    seqnums: Seqnums,
    blocks: Vec<BlockData>,
    total_rows: u32,
    /// Object-level per-column aggregates, logical column order.
    col_metas: Vec<ColumnMeta>,
    explicit_meta: bool,
    primary_key: Option<u16>,
    last_id: u16,
    compress_buf: Vec<u8>,
}

impl ObjectWriter {
    pub fn new(
        fs: Arc<dyn ObjectStore>,
        name: ObjectName,
        schema_version: u32,
        seqnums: Option<Vec<u16>>,
    ) -> Self {
        Self {
            fs,
            name,
            schema_version,
            seqnums: Seqnums::new(seqnums),
            blocks: Vec::new(),
            total_rows: 0,
            col_metas: Vec::new(),
            explicit_meta: false,
            primary_key: None,
            last_id: 0,
            compress_buf: Vec::new(),
        }
    }

    /// A writer with a fresh name for a special-role object (checkpoint,
    /// query result, GC, ETL).
    pub fn new_with_role(fs: Arc<dyn ObjectStore>, role: ObjectRole, schema_version: u32) -> Self {
        Self::new(fs, ObjectName::with_role(role), schema_version, None)
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    pub fn seqnums(&self) -> &[u16] {
        &self.seqnums.seqs
    }

    pub fn max_seqnum(&self) -> u16 {
        self.seqnums.max_seq
    }

    /// Configure the primary-key seqnum; blocks written afterwards carry a
    /// bloom filter over that column.
    pub fn set_primary_key(&mut self, seqnum: u16) {
        self.primary_key = Some(seqnum);
    }

    /// Append a block computed from a rectangular batch.
    ///
    /// The first write establishes the writer's column count; a subsequent
    /// batch with a different column count is a programmer error and
    /// panics. Within a batch the first column's length is the block's row
    /// count; other lengths are logged and tolerated.
    pub fn write_batch(&mut self, batch: &Batch) -> Result<u16> {
        if self.seqnums.is_empty() {
            self.seqnums.init_with_col_cnt(batch.column_count());
        } else if self.seqnums.len() != batch.column_count() {
            panic!(
                "unmatched write batch, expect {} columns, got {} ({:?})",
                self.seqnums.len(),
                batch.column_count(),
                batch.attrs
            );
        }
        let seqnums = self.seqnums.clone();
        self.add_block(batch, seqnums)
    }

    /// Append a block under a dense `0..n-1` seqnum mapping regardless of
    /// the writer's configured mapping.
    pub fn write_batch_without_seqnums(&mut self, batch: &Batch) -> Result<u16> {
        let seqnums = Seqnums::dense(batch.column_count());
        self.add_block(batch, seqnums)
    }

    fn add_block(&mut self, batch: &Batch, seqnums: Seqnums) -> Result<u16> {
        let mut meta = BlockMeta::new(&seqnums);
        meta.sequence = self.last_id;
        meta.column_count = batch.column_count() as u16;

        let mut data = Vec::with_capacity(batch.column_count());
        let mut rows = 0usize;
        for (i, col) in batch.columns.iter().enumerate() {
            if i == 0 {
                rows = col.len();
            } else if rows != col.len() {
                tracing::warn!(
                    column = batch.attrs.get(i).map(String::as_str).unwrap_or(""),
                    expect = rows,
                    got = col.len(),
                    "unmatched column length"
                );
            }
            if col.data_type() == DataType::Any {
                panic!("column {i} of write batch has no type information");
            }

            let mut buf = Vec::new();
            IoEntryHeader::new(EntryKind::ColData).marshal(&mut buf);
            col.marshal(&mut buf);
            let (payload, extent) = self.write_with_compress(0, &buf)?;
            data.push(payload);

            let cm = meta.column_meta_mut(seqnums.seqs[i]);
            cm.data_type = col.data_type();
            cm.null_cnt = col.null_count() as u32;
            cm.ndv = col.distinct_count() as u32;
            cm.location = extent;
            cm.zone_map = ZoneMap::from_column(col);
        }
        meta.rows = rows as u32;

        let bloom_filter = match self.primary_key {
            Some(pk) => match seqnums.seqs.iter().position(|s| *s == pk) {
                Some(i) => {
                    let col = &batch.columns[i];
                    let mut bf = BlockBloomFilter::new(col.len());
                    let mut scratch = Vec::new();
                    for row in 0..col.len() {
                        if let Some(d) = col.datum(row) {
                            scratch.clear();
                            d.encode_into(&mut scratch);
                            bf.add(&scratch);
                        }
                    }
                    bf.to_bytes()
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        self.total_rows += rows as u32;
        self.blocks.push(BlockData {
            meta,
            seqnums,
            data,
            bloom_filter,
        });
        self.last_id += 1;
        Ok(self.last_id - 1)
    }

    /// Install a zone map on an already-added block.
    pub fn update_block_zm(&mut self, blk_idx: usize, seqnum: u16, zm: ZoneMap) {
        self.blocks[blk_idx].meta.column_meta_mut(seqnum).zone_map = zm;
    }

    /// Attach opaque bloom-filter bytes to a block.
    pub fn write_bf(&mut self, blk_idx: usize, buf: Vec<u8>) -> Result<()> {
        self.blocks[blk_idx].bloom_filter = buf;
        Ok(())
    }

    /// Set object-level aggregates explicitly instead of letting `finish`
    /// derive them from the written blocks.
    pub fn write_object_meta(&mut self, total_rows: u32, metas: Vec<ColumnMeta>) {
        self.total_rows = total_rows;
        self.col_metas = metas;
        self.explicit_meta = true;
    }

    /// Compress `buf` into the writer-local scratch, then copy the result
    /// into a freshly-owned slice. Empty input yields a zero-length extent.
    pub fn write_with_compress(&mut self, offset: u32, buf: &[u8]) -> Result<(Vec<u8>, Extent)> {
        if buf.is_empty() {
            return Ok((Vec::new(), Extent::new(Compression::Lz4, offset, 0, 0)));
        }
        let n = compress_into(&mut self.compress_buf, buf)?;
        let data = self.compress_buf[..n].to_vec();
        Ok((
            data,
            Extent::new(Compression::Lz4, offset, n as u32, buf.len() as u32),
        ))
    }

    fn max_index(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).max().unwrap_or(0)
    }

    /// Assign final payload offsets, column-major across blocks, and
    /// record each column's aggregate location.
    fn prepare_block_meta(&mut self, mut offset: u32) -> u32 {
        let max_index = self.max_index();
        for idx in 0..max_index {
            let area_start = offset;
            let mut size = 0u32;
            let mut origin = 0u32;
            let mut alg = Compression::None;
            for block in &mut self.blocks {
                if (block.meta.column_count as usize) <= idx {
                    continue;
                }
                let seq = block.seqnums.seqs[idx];
                let cm = block.meta.column_meta_mut(seq);
                cm.location.offset = offset;
                offset += cm.location.length;
                size += cm.location.length;
                origin += cm.location.origin;
                alg = cm.location.alg;
            }
            if let Some(cm) = self.col_metas.get_mut(idx) {
                cm.location.alg = alg;
                cm.location.offset = area_start;
                cm.location.length = size;
                cm.location.origin = origin;
            }
        }
        offset
    }

    /// Derive object-level column aggregates from the written blocks when
    /// the caller did not provide them.
    fn derive_col_metas(&mut self) {
        let Some(first) = self.blocks.first() else {
            return;
        };
        let column_count = first.meta.column_count as usize;
        let mut metas = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let seq = first.seqnums.seqs[idx];
            let mut agg = ColumnMeta::new(seq);
            let mut ndv = 0u64;
            for block in &self.blocks {
                if (block.meta.column_count as usize) <= idx {
                    continue;
                }
                let cm = block.meta.column_meta(block.seqnums.seqs[idx]);
                if agg.data_type == DataType::Any {
                    agg.data_type = cm.data_type;
                    agg.zone_map = ZoneMap::new(cm.data_type);
                }
                agg.zone_map.merge(&cm.zone_map);
                agg.null_cnt += cm.null_cnt;
                ndv += cm.ndv as u64;
            }
            agg.ndv = ndv.min(self.total_rows as u64) as u32;
            metas.push(agg);
        }
        self.col_metas = metas;
    }

    fn build_bloom_area(&self, block_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        IoEntryHeader::new(EntryKind::Bf).marshal(&mut buf);
        let mut index = BlockIndex::new(block_count);
        let mut pos = index.size_bytes();
        for (i, block) in self.blocks.iter().enumerate() {
            let n = block.bloom_filter.len() as u32;
            index.set_entry(i, pos, n);
            pos += n;
        }
        index.marshal(&mut buf);
        for block in &self.blocks {
            buf.extend_from_slice(&block.bloom_filter);
        }
        buf
    }

    fn build_zonemap_area(&self, block_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        IoEntryHeader::new(EntryKind::Zm).marshal(&mut buf);
        let mut index = BlockIndex::new(block_count);
        let mut pos = index.size_bytes();
        for (i, block) in self.blocks.iter().enumerate() {
            let n = block.meta.meta_column_count as u32 * ZM_WIDTH as u32;
            index.set_entry(i, pos, n);
            pos += n;
        }
        index.marshal(&mut buf);
        for block in &self.blocks {
            for seqnum in 0..block.meta.meta_column_count {
                block.meta.column_meta(seqnum).zone_map.marshal(&mut buf);
            }
        }
        buf
    }

    fn build_meta_area(&self, mut header: ObjectMetaHeader, offset: u32) -> Vec<u8> {
        let block_count = self.blocks.len() as u32;
        let meta_col_cnt = header.meta_column_count;

        let mut index = BlockIndex::new(block_count);
        let body_len =
            (OBJECT_META_HEADER_SIZE + meta_col_cnt as usize * COLUMN_META_SIZE) as u32;
        let mut pos = body_len + index.size_bytes();
        for (i, block) in self.blocks.iter().enumerate() {
            let n = block.meta.size_bytes();
            index.set_entry(i, pos, n);
            pos += n;
        }
        header.meta_location = Extent::new(Compression::None, offset, 0, pos);

        // object-level column slots, placed by seqnum
        let seqnums = self
            .blocks
            .first()
            .map(|b| b.seqnums.clone())
            .unwrap_or_default();
        let mut slots: Vec<ColumnMeta> = (0..meta_col_cnt).map(ColumnMeta::new).collect();
        for (i, cm) in self.col_metas.iter().enumerate() {
            if let Some(seq) = seqnums.seqs.get(i) {
                let mut slot = cm.clone();
                slot.seqnum = *seq;
                slots[*seq as usize] = slot;
            }
        }

        let mut buf = Vec::new();
        IoEntryHeader::new(EntryKind::ObjMeta).marshal(&mut buf);
        header.marshal(&mut buf);
        for slot in &slots {
            slot.marshal(&mut buf);
        }
        index.marshal(&mut buf);
        for block in &self.blocks {
            block.meta.marshal(&mut buf);
        }
        buf
    }

    /// Finalize the object: serialize every area in layout order, flush to
    /// the file service, and return the block metas with their final meta
    /// location set. Consumes the writer.
    pub async fn finish(mut self, ctx: &CancellationToken) -> Result<Vec<BlockMeta>> {
        let (column_count, meta_col_cnt, max_seqnum) = match self.blocks.first() {
            Some(first) => (
                first.meta.column_count,
                first.meta.meta_column_count,
                first.meta.max_seqnum,
            ),
            None => {
                tracing::warn!(object = %self.name, "no block needs to be written");
                (0, 0, 0)
            }
        };
        if !self.explicit_meta {
            self.derive_col_metas();
        }

        let block_count = self.blocks.len() as u32;
        let mut meta_header = ObjectMetaHeader {
            column_count,
            meta_column_count: meta_col_cnt,
            max_seqnum,
            rows: self.total_rows,
            block_count,
            ..Default::default()
        };

        let mut offset = self.prepare_block_meta(HEADER_SIZE as u32);

        let bf_raw = self.build_bloom_area(block_count);
        let (bf_data, bf_extent) = self.write_with_compress(offset, &bf_raw)?;
        meta_header.bf_extent = bf_extent;
        offset += bf_extent.length;

        let zm_raw = self.build_zonemap_area(block_count);
        let (zm_data, zm_extent) = self.write_with_compress(offset, &zm_raw)?;
        meta_header.zonemap_extent = zm_extent;
        offset += zm_extent.length;

        let meta_raw = self.build_meta_area(meta_header, offset);
        let (meta_data, meta_extent) = self.write_with_compress(offset, &meta_raw)?;

        let mut buffer = Vec::with_capacity(
            HEADER_SIZE + bf_data.len() + zm_data.len() + meta_data.len(),
        );
        // object header: schema version ∥ meta extent ∥ reserved
        buffer.extend_from_slice(&self.schema_version.to_le_bytes());
        meta_extent.marshal(&mut buffer);
        buffer.resize(HEADER_SIZE, 0);

        // payloads, column-major then block order
        let max_index = self.max_index();
        for idx in 0..max_index {
            for block in &self.blocks {
                if (block.meta.column_count as usize) <= idx {
                    continue;
                }
                buffer.extend_from_slice(&block.data[idx]);
            }
        }

        buffer.extend_from_slice(&bf_data);
        buffer.extend_from_slice(&zm_data);
        buffer.extend_from_slice(&meta_data);
        Footer::new(meta_extent).marshal(&mut buffer);

        let total_bytes = buffer.len();
        self.sync(ctx, Bytes::from(buffer)).await?;
        tracing::info!(
            object = %self.name,
            blocks = block_count,
            rows = self.total_rows,
            bytes = total_bytes,
            "object written"
        );

        let mut block_metas = Vec::with_capacity(self.blocks.len());
        for block in &mut self.blocks {
            block.meta.meta_location = meta_extent;
            block_metas.push(block.meta.clone());
        }
        // block payloads die with the writer here
        Ok(block_metas)
    }

    /// Flush to the file service. A leftover file from a rolled-back task
    /// is deleted and written again; any other error propagates.
    async fn sync(&self, ctx: &CancellationToken, data: Bytes) -> Result<()> {
        let path = self.name.to_path();
        let first = self.put(ctx, &path, data.clone()).await;
        match first {
            Err(Error::ObjectStore(object_store::Error::AlreadyExists { .. })) => {
                tracing::warn!(object = %self.name, "object already exists, deleting and rewriting");
                self.fs.delete(&path).await?;
                self.put(ctx, &path, data).await
            }
            other => other,
        }
    }

    async fn put(
        &self,
        ctx: &CancellationToken,
        path: &object_store::path::Path,
        data: Bytes,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            _ = ctx.cancelled() => Err(Error::Cancelled),
            res = self.fs.put_opts(path, data, PutOptions::from(PutMode::Create)) => {
                res?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::reader::ObjectReader;
    use crate::object::FOOTER_SIZE;
    use object_store::memory::InMemory;
    use quarry_core::column::Column;
    use uuid::Uuid;

    fn memory_fs() -> Arc<dyn ObjectStore> {
        Arc::new(InMemory::new())
    }

    fn sample_batch() -> Batch {
        Batch::from_columns(vec![
            Column::int64((1..=10).collect()),
            Column::int64((1..=10).rev().collect()),
            Column::utf8(["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]),
        ])
    }

    // ---------------------------------------------------------------
    // Round-trip: write then read back
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_roundtrip_single_block() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();

        let mut writer = ObjectWriter::new(fs.clone(), name, 1, None);
        let batch = sample_batch();
        writer.write_batch(&batch).unwrap();
        let blocks = writer.finish(&ctx).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].rows, 10);
        assert_eq!(blocks[0].column_count, 3);

        let reader = ObjectReader::new(fs, name);
        let meta = reader.load_meta(&ctx).await.unwrap();
        assert_eq!(meta.header.block_count, 1);
        assert_eq!(meta.header.rows, 10);

        let block = meta.block_meta(0).unwrap();
        for (seq, want) in batch.columns.iter().enumerate() {
            let got = reader.read_column(block, seq as u16, &ctx).await.unwrap();
            assert_eq!(&got, want, "column {seq} mismatch");
        }

        // column-0 zone map equals the input min/max
        let zm = &block.column_meta(0).zone_map;
        assert_eq!(zm.min_f64(), Some(1.0));
        assert_eq!(zm.max_f64(), Some(10.0));
    }

    #[tokio::test]
    async fn test_roundtrip_multiple_blocks() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 1);
        let ctx = CancellationToken::new();

        let mut writer = ObjectWriter::new(fs.clone(), name, 3, None);
        for base in [0i64, 100, 200] {
            let batch = Batch::from_columns(vec![
                Column::int64((base..base + 50).collect()),
                Column::float64((0..50).map(|i| i as f64 / 2.0).collect()),
            ]);
            writer.write_batch(&batch).unwrap();
        }
        let blocks = writer.finish(&ctx).await.unwrap();
        assert_eq!(blocks.len(), 3);
        for (i, blk) in blocks.iter().enumerate() {
            assert_eq!(blk.sequence as usize, i);
            assert_eq!(blk.rows, 50);
        }

        let reader = ObjectReader::new(fs, name);
        let meta = reader.load_meta(&ctx).await.unwrap();
        assert_eq!(meta.header.block_count, 3);
        assert_eq!(meta.header.rows, 150);

        let col = reader
            .read_column(meta.block_meta(2).unwrap(), 0, &ctx)
            .await
            .unwrap();
        assert_eq!(col.datum(0), Some(quarry_core::Datum::I64(200)));
        assert_eq!(col.datum(49), Some(quarry_core::Datum::I64(249)));

        // object-level aggregate widened across blocks
        let agg = meta.column_meta(0).unwrap();
        assert_eq!(agg.zone_map.min_f64(), Some(0.0));
        assert_eq!(agg.zone_map.max_f64(), Some(249.0));
    }

    // ---------------------------------------------------------------
    // Layout invariants
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_layout_invariants() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();

        let mut writer = ObjectWriter::new(fs.clone(), name, 1, None);
        writer.write_batch(&sample_batch()).unwrap();
        writer.write_batch(&sample_batch()).unwrap();
        writer.finish(&ctx).await.unwrap();

        let data = fs.get(&name.to_path()).await.unwrap().bytes().await.unwrap();
        let footer_offset = data.len() - FOOTER_SIZE;
        let footer = Footer::unmarshal(&mut &data[footer_offset..]).unwrap();
        assert_eq!(footer.magic, crate::object::MAGIC);
        assert!(footer.meta_extent.end() as usize <= footer_offset);

        let reader = ObjectReader::new(fs, name);
        let meta = reader.load_meta(&ctx).await.unwrap();

        // payload extents strictly increasing and contiguous from HEADER_SIZE,
        // column-major (column outer, block inner)
        let mut expected = HEADER_SIZE as u32;
        for seq in 0..meta.header.meta_column_count {
            for block in &meta.block_metas {
                let loc = &block.column_meta(seq).location;
                assert_eq!(loc.offset, expected, "extent chain broken at column {seq}");
                expected += loc.length;
            }
        }
        assert_eq!(meta.header.bf_extent.offset, expected);
        assert_eq!(
            meta.header.zonemap_extent.offset,
            meta.header.bf_extent.end()
        );
        assert_eq!(
            footer.meta_extent.offset,
            meta.header.zonemap_extent.end()
        );
    }

    // ---------------------------------------------------------------
    // Idempotent write
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_rewrite_same_name_is_byte_identical() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 7);
        let ctx = CancellationToken::new();

        let mut first = ObjectWriter::new(fs.clone(), name, 1, None);
        first.write_batch(&sample_batch()).unwrap();
        first.finish(&ctx).await.unwrap();
        let bytes_a = fs.get(&name.to_path()).await.unwrap().bytes().await.unwrap();

        // same content, same name: hits AlreadyExists, deletes, rewrites
        let mut second = ObjectWriter::new(fs.clone(), name, 1, None);
        second.write_batch(&sample_batch()).unwrap();
        second.finish(&ctx).await.unwrap();
        let bytes_b = fs.get(&name.to_path()).await.unwrap().bytes().await.unwrap();

        assert_eq!(bytes_a, bytes_b);
    }

    // ---------------------------------------------------------------
    // Invariant violations and edge cases
    // ---------------------------------------------------------------

    #[test]
    #[should_panic(expected = "unmatched write batch")]
    fn test_column_count_mismatch_panics() {
        let mut writer =
            ObjectWriter::new(memory_fs(), ObjectName::new(Uuid::new_v4(), 0), 1, None);
        writer
            .write_batch(&Batch::from_columns(vec![Column::int64(vec![1])]))
            .unwrap();
        let _ = writer.write_batch(&Batch::from_columns(vec![
            Column::int64(vec![1]),
            Column::int64(vec![2]),
        ]));
    }

    #[test]
    #[should_panic(expected = "no type information")]
    fn test_untyped_column_panics() {
        let mut writer =
            ObjectWriter::new(memory_fs(), ObjectName::new(Uuid::new_v4(), 0), 1, None);
        let _ = writer.write_batch(&Batch::from_columns(vec![Column::new(DataType::Any)]));
    }

    #[tokio::test]
    async fn test_empty_writer_produces_valid_object() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();
        let writer = ObjectWriter::new(fs.clone(), name, 1, None);
        let blocks = writer.finish(&ctx).await.unwrap();
        assert!(blocks.is_empty());

        let meta = ObjectReader::new(fs, name).load_meta(&ctx).await.unwrap();
        assert_eq!(meta.header.block_count, 0);
        assert_eq!(meta.header.rows, 0);
    }

    #[tokio::test]
    async fn test_finish_cancelled() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();
        ctx.cancel();
        let mut writer = ObjectWriter::new(fs, name, 1, None);
        writer.write_batch(&sample_batch()).unwrap();
        match writer.finish(&ctx).await {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_write_with_compress_empty_input() {
        let mut writer =
            ObjectWriter::new(memory_fs(), ObjectName::new(Uuid::new_v4(), 0), 1, None);
        let (data, ext) = writer.write_with_compress(99, &[]).unwrap();
        assert!(data.is_empty());
        assert_eq!(ext.offset, 99);
        assert_eq!(ext.length, 0);
        assert_eq!(ext.origin, 0);
    }

    #[test]
    fn test_write_with_compress_caller_owns_result() {
        let mut writer =
            ObjectWriter::new(memory_fs(), ObjectName::new(Uuid::new_v4(), 0), 1, None);
        let (a, ext_a) = writer.write_with_compress(0, b"first payload first payload").unwrap();
        let (b, _) = writer.write_with_compress(0, b"second payload entirely").unwrap();
        // the scratch was reused, but `a` must be untouched
        let restored = crate::codec::decompress(&a, &ext_a).unwrap();
        assert_eq!(restored, b"first payload first payload");
        assert_ne!(a, b);
    }

    // ---------------------------------------------------------------
    // Per-column statistics
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_null_counts_and_ndv_recorded() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();

        let mut col = Column::new(DataType::Int64);
        for v in [1i64, 1, 2] {
            col.append(Some(quarry_core::Datum::I64(v)));
        }
        col.append(None);

        let mut writer = ObjectWriter::new(fs.clone(), name, 1, None);
        writer
            .write_batch(&Batch::from_columns(vec![col]))
            .unwrap();
        writer.finish(&ctx).await.unwrap();

        let meta = ObjectReader::new(fs, name).load_meta(&ctx).await.unwrap();
        let cm = meta.block_meta(0).unwrap().column_meta(0);
        assert_eq!(cm.null_cnt, 1);
        assert_eq!(cm.ndv, 2);
        assert_eq!(meta.column_meta(0).unwrap().ndv, 2);
    }

    #[tokio::test]
    async fn test_primary_key_bloom_filter_written() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();

        let mut writer = ObjectWriter::new(fs.clone(), name, 1, None);
        writer.set_primary_key(0);
        writer.write_batch(&sample_batch()).unwrap();
        writer.finish(&ctx).await.unwrap();

        let reader = ObjectReader::new(fs, name);
        let bf_bytes = reader.read_bloom_filter(0, &ctx).await.unwrap();
        let bf = crate::bloom::BlockBloomFilter::from_bytes(&bf_bytes).unwrap();
        assert!(bf.might_contain(&5i64.to_le_bytes()));
    }

    #[tokio::test]
    async fn test_update_block_zm_overrides() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let ctx = CancellationToken::new();

        let mut writer = ObjectWriter::new(fs.clone(), name, 1, None);
        writer.write_batch(&sample_batch()).unwrap();
        let zm = ZoneMap::from_column(&Column::int64(vec![-100, 100]));
        writer.update_block_zm(0, 0, zm);
        let blocks = writer.finish(&ctx).await.unwrap();
        assert_eq!(blocks[0].column_meta(0).zone_map.min_f64(), Some(-100.0));
    }
}
