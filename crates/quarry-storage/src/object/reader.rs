//! Object Reader - Loading Metadata and Columns
//!
//! Readers open an object from its footer: the last bytes of the file name
//! the metadata extent, and one read of that extent decodes the object
//! meta together with every block's metadata and zone maps. That single
//! load is what the statistics derivation depends on, so it is also
//! exposed as the free function `load_object_meta` for callers that
//! already hold a block `Location` and can skip the footer read entirely.

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;

use quarry_core::column::Column;

use crate::codec::{decompress, BlockIndex, EntryKind, IoEntryHeader};
use crate::error::{Error, Result};
use crate::name::{Location, ObjectName};
use crate::object::meta::{BlockMeta, Footer, ObjectMeta};
use crate::object::{FOOTER_SIZE, HEADER_SIZE};

async fn read_range(
    fs: &Arc<dyn ObjectStore>,
    path: &object_store::path::Path,
    range: Range<usize>,
    ctx: &CancellationToken,
) -> Result<Bytes> {
    if ctx.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        _ = ctx.cancelled() => Err(Error::Cancelled),
        res = fs.get_range(path, range) => Ok(res?),
    }
}

/// Load an object's metadata straight from a block location, without
/// touching the footer. Identical object names share their metadata, so
/// callers working over many blocks group them by object first and call
/// this once per distinct object.
pub async fn load_object_meta(
    fs: &Arc<dyn ObjectStore>,
    location: &Location,
    ctx: &CancellationToken,
) -> Result<ObjectMeta> {
    let path = location.name.to_path();
    let extent = &location.extent;
    let raw = read_range(
        fs,
        &path,
        extent.offset as usize..extent.end() as usize,
        ctx,
    )
    .await?;
    let area = decompress(&raw, extent)?;
    ObjectMeta::unmarshal(&area)
}

pub struct ObjectReader {
    fs: Arc<dyn ObjectStore>,
    name: ObjectName,
}

impl ObjectReader {
    pub fn new(fs: Arc<dyn ObjectStore>, name: ObjectName) -> Self {
        Self { fs, name }
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Read and validate the footer.
    pub async fn read_footer(&self, ctx: &CancellationToken) -> Result<Footer> {
        let path = self.name.to_path();
        let head = self.fs.head(&path).await?;
        let size = head.size;
        if size < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::InvalidObject(format!(
                "object too small: {size} bytes"
            )));
        }
        let raw = read_range(&self.fs, &path, size - FOOTER_SIZE..size, ctx).await?;
        let footer = Footer::unmarshal(&mut &raw[..])?;
        let footer_offset = (size - FOOTER_SIZE) as u32;
        if footer.meta_extent.end() > footer_offset {
            return Err(Error::InvalidObject(format!(
                "meta extent {}..{} runs past footer at {footer_offset}",
                footer.meta_extent.offset,
                footer.meta_extent.end()
            )));
        }
        Ok(footer)
    }

    /// Load the full object metadata through the footer.
    pub async fn load_meta(&self, ctx: &CancellationToken) -> Result<ObjectMeta> {
        let footer = self.read_footer(ctx).await?;
        let path = self.name.to_path();
        let extent = footer.meta_extent;
        let raw = read_range(
            &self.fs,
            &path,
            extent.offset as usize..extent.end() as usize,
            ctx,
        )
        .await?;
        let area = decompress(&raw, &extent)?;
        ObjectMeta::unmarshal(&area)
    }

    /// Read one column of one block, decompressing and validating its
    /// payload framing.
    pub async fn read_column(
        &self,
        block: &BlockMeta,
        seqnum: u16,
        ctx: &CancellationToken,
    ) -> Result<Column> {
        let cm = block.column_meta(seqnum);
        let extent = cm.location;
        let raw = read_range(
            &self.fs,
            &self.name.to_path(),
            extent.offset as usize..extent.end() as usize,
            ctx,
        )
        .await?;
        let payload = decompress(&raw, &extent)?;
        let mut buf = payload.as_slice();
        IoEntryHeader::expect(&mut buf, EntryKind::ColData)?;
        Ok(Column::unmarshal(&mut buf)?)
    }

    /// Read every written column of a block, in seqnum order.
    pub async fn read_all_columns(
        &self,
        block: &BlockMeta,
        ctx: &CancellationToken,
    ) -> Result<Vec<Column>> {
        let mut columns = Vec::with_capacity(block.column_count as usize);
        for seqnum in 0..block.meta_column_count {
            if block.column_meta(seqnum).data_type == quarry_core::DataType::Any {
                continue;
            }
            columns.push(self.read_column(block, seqnum, ctx).await?);
        }
        Ok(columns)
    }

    /// Read one block's bloom-filter bytes out of the bloom-filter area.
    pub async fn read_bloom_filter(
        &self,
        block_id: u32,
        ctx: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let meta = self.load_meta(ctx).await?;
        let extent = meta.header.bf_extent;
        let raw = read_range(
            &self.fs,
            &self.name.to_path(),
            extent.offset as usize..extent.end() as usize,
            ctx,
        )
        .await?;
        let area = decompress(&raw, &extent)?;
        let mut buf = area.as_slice();
        IoEntryHeader::expect(&mut buf, EntryKind::Bf)?;
        let index = BlockIndex::unmarshal(&mut buf)?;
        if block_id >= index.block_count() {
            return Err(Error::InvalidObject(format!(
                "block {block_id} out of range ({} blocks)",
                index.block_count()
            )));
        }
        let (pos, len) = index.entry(block_id as usize);
        let start = crate::codec::IO_ENTRY_HEADER_SIZE + pos as usize;
        let end = start + len as usize;
        if end > area.len() {
            return Err(Error::InvalidObject(
                "bloom filter entry out of bounds".to_string(),
            ));
        }
        Ok(area[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ObjectRole;
    use crate::object::writer::ObjectWriter;
    use object_store::memory::InMemory;
    use quarry_core::column::Batch;
    use uuid::Uuid;

    fn memory_fs() -> Arc<dyn ObjectStore> {
        Arc::new(InMemory::new())
    }

    async fn write_sample(fs: &Arc<dyn ObjectStore>, name: ObjectName) -> Vec<BlockMeta> {
        let ctx = CancellationToken::new();
        let mut writer = ObjectWriter::new(fs.clone(), name, 2, None);
        writer
            .write_batch(&Batch::from_columns(vec![
                Column::int64(vec![10, 20, 30]),
                Column::utf8(["x", "y", "z"]),
            ]))
            .unwrap();
        writer.finish(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_footer_validation_missing_object() {
        let fs = memory_fs();
        let reader = ObjectReader::new(fs, ObjectName::new(Uuid::new_v4(), 0));
        assert!(reader.read_footer(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_footer_rejects_truncated_file() {
        let fs = memory_fs();
        let name = ObjectName::with_role(ObjectRole::Etl);
        fs.put(&name.to_path(), Bytes::from(vec![0u8; 10]))
            .await
            .unwrap();
        let reader = ObjectReader::new(fs, name);
        assert!(reader.read_footer(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_load_meta_through_footer_and_location_agree() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let blocks = write_sample(&fs, name).await;
        let ctx = CancellationToken::new();

        let reader = ObjectReader::new(fs.clone(), name);
        let via_footer = reader.load_meta(&ctx).await.unwrap();

        let location = Location::new(name, blocks[0].meta_location, blocks[0].rows, 0);
        let via_location = load_object_meta(&fs, &location, &ctx).await.unwrap();
        assert_eq!(via_footer, via_location);
    }

    #[tokio::test]
    async fn test_read_all_columns() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        write_sample(&fs, name).await;
        let ctx = CancellationToken::new();

        let reader = ObjectReader::new(fs, name);
        let meta = reader.load_meta(&ctx).await.unwrap();
        let cols = reader
            .read_all_columns(meta.block_meta(0).unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0], Column::int64(vec![10, 20, 30]));
        assert_eq!(cols[1], Column::utf8(["x", "y", "z"]));
    }

    #[tokio::test]
    async fn test_read_cancelled() {
        let fs = memory_fs();
        let name = ObjectName::new(Uuid::new_v4(), 0);
        write_sample(&fs, name).await;
        let ctx = CancellationToken::new();
        ctx.cancel();
        let reader = ObjectReader::new(fs, name);
        match reader.load_meta(&ctx).await {
            Err(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
