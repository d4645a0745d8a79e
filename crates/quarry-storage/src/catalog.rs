//! Catalog Arena
//!
//! The slice of catalog state the storage layer needs: table schemas, and
//! segment/block entries held in arenas indexed by dense stable ids. There
//! are no parent/child pointers between entries; a block names its segment
//! by id, and every lookup goes through the owning `Relation`.
//!
//! Entries are soft-deleted, never removed: readers holding an older view
//! keep resolving the ids they saw, and the merge-commit log references
//! dropped entries for replay.

use quarry_core::bitmap::Bitmap;
use quarry_core::types::DataType;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::name::Location;

pub type SegmentId = u64;
pub type BlockId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub seqnum: u16,
    /// The physical-address column, always last and excluded from stats.
    pub phy_addr: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub cols: Vec<ColumnDef>,
    /// Index into `cols` of the declared sort key, if any.
    pub sort_key_idx: Option<usize>,
    /// Index into `cols` of the primary key, if any.
    pub primary_key_idx: Option<usize>,
    pub block_max_rows: u32,
    /// Monotonic schema version tag.
    pub version: u32,
}

impl TableSchema {
    /// Build a schema from `(name, type)` pairs, appending the
    /// physical-address column last.
    pub fn new(name: impl Into<String>, user_cols: &[(&str, DataType)]) -> Self {
        let mut cols: Vec<ColumnDef> = user_cols
            .iter()
            .enumerate()
            .map(|(i, (col_name, dt))| ColumnDef {
                name: (*col_name).to_string(),
                data_type: *dt,
                seqnum: i as u16,
                phy_addr: false,
            })
            .collect();
        cols.push(ColumnDef {
            name: "__rowid".to_string(),
            data_type: DataType::RowId,
            seqnum: cols.len() as u16,
            phy_addr: true,
        });
        Self {
            name: name.into(),
            cols,
            sort_key_idx: None,
            primary_key_idx: None,
            block_max_rows: StorageConfig::default().block_max_rows,
            version: 0,
        }
    }

    pub fn with_sort_key(mut self, idx: usize) -> Self {
        self.sort_key_idx = Some(idx);
        self
    }

    pub fn with_primary_key(mut self, idx: usize) -> Self {
        self.primary_key_idx = Some(idx);
        self
    }

    pub fn with_block_max_rows(mut self, rows: u32) -> Self {
        self.block_max_rows = rows;
        self
    }

    pub fn has_sort_key(&self) -> bool {
        self.sort_key_idx.is_some()
    }

    /// The column compaction sorts by: the declared sort key, else the
    /// physical-address column (which is already in ascending order).
    pub fn sort_col_idx(&self) -> usize {
        self.sort_key_idx.unwrap_or(self.cols.len() - 1)
    }

    pub fn sort_key_name(&self) -> &str {
        &self.cols[self.sort_col_idx()].name
    }

    /// Columns excluding the physical-address column, in schema order.
    pub fn user_cols(&self) -> impl Iterator<Item = &ColumnDef> {
        self.cols.iter().filter(|c| !c.phy_addr)
    }

    pub fn user_seqnums(&self) -> Vec<u16> {
        self.user_cols().map(|c| c.seqnum).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SegmentEntry {
    pub id: SegmentId,
    pub uuid: Uuid,
    pub sorted: bool,
    pub dropped: bool,
}

#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub id: BlockId,
    pub segment: SegmentId,
    pub meta_location: Option<Location>,
    /// Uncommitted deletes against this block.
    pub deletes: Option<Bitmap>,
    pub dropped: bool,
}

/// Transactional record of one merge, appended at commit for replay and
/// rollback.
#[derive(Debug, Clone)]
pub struct MergeCommitEntry {
    pub merged_segs: Vec<SegmentId>,
    pub created_segs: Vec<SegmentId>,
    pub merged_blks: Vec<BlockId>,
    pub created_blks: Vec<BlockId>,
    /// Source row (post-delete global position) → output row.
    pub mapping: Vec<u32>,
    /// Per surviving input block, its prefix-sum start in the merged run.
    pub from_addr: Vec<u32>,
    /// Per output block, its prefix-sum start in the merged run.
    pub to_addr: Vec<u32>,
    /// The delete bitmap each input block carried into the merge.
    pub deletes: Vec<Option<Bitmap>>,
    /// Input blocks dropped because deletes emptied them.
    pub skip_blks: Vec<usize>,
}

/// One table's catalog state: schema plus segment/block arenas.
#[derive(Debug)]
pub struct Relation {
    pub schema: TableSchema,
    segments: Vec<SegmentEntry>,
    blocks: Vec<BlockEntry>,
    merge_log: Vec<MergeCommitEntry>,
}

impl Relation {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            segments: Vec::new(),
            blocks: Vec::new(),
            merge_log: Vec::new(),
        }
    }

    pub fn create_segment(&mut self, sorted: bool) -> SegmentId {
        self.create_segment_with_uuid(Uuid::new_v4(), sorted)
    }

    /// Register a segment whose object name was fixed before the catalog
    /// mutation (the merge task writes its output object first).
    pub fn create_segment_with_uuid(&mut self, uuid: Uuid, sorted: bool) -> SegmentId {
        let id = self.segments.len() as SegmentId;
        self.segments.push(SegmentEntry {
            id,
            uuid,
            sorted,
            dropped: false,
        });
        id
    }

    pub fn create_block(&mut self, segment: SegmentId) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(BlockEntry {
            id,
            segment,
            meta_location: None,
            deletes: None,
            dropped: false,
        });
        id
    }

    pub fn segment(&self, id: SegmentId) -> Option<&SegmentEntry> {
        self.segments.get(id as usize)
    }

    pub fn block(&self, id: BlockId) -> Result<&BlockEntry> {
        self.blocks.get(id as usize).ok_or(Error::BlockNotFound(id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut BlockEntry> {
        self.blocks
            .get_mut(id as usize)
            .ok_or(Error::BlockNotFound(id))
    }

    pub fn update_block_meta_loc(&mut self, id: BlockId, location: Location) -> Result<()> {
        self.block_mut(id)?.meta_location = Some(location);
        Ok(())
    }

    pub fn delete_rows(&mut self, id: BlockId, rows: &[u32]) -> Result<()> {
        let entry = self.block_mut(id)?;
        let deletes = entry.deletes.get_or_insert_with(Bitmap::new);
        for row in rows {
            deletes.set(*row);
        }
        Ok(())
    }

    pub fn soft_delete_block(&mut self, id: BlockId) -> Result<()> {
        self.block_mut(id)?.dropped = true;
        Ok(())
    }

    pub fn soft_delete_segment(&mut self, id: SegmentId) -> Result<()> {
        let seg = self
            .segments
            .get_mut(id as usize)
            .ok_or(Error::BlockNotFound(id))?;
        seg.dropped = true;
        Ok(())
    }

    pub fn live_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| !b.dropped)
            .map(|b| b.id)
            .collect()
    }

    pub fn live_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.dropped).count()
    }

    /// Locations of all live blocks, the planner's scan candidate set.
    pub fn live_block_locations(&self) -> Vec<Location> {
        self.blocks
            .iter()
            .filter(|b| !b.dropped)
            .filter_map(|b| b.meta_location.clone())
            .collect()
    }

    /// Whether every live block of `segment` is in `consumed`.
    pub fn segment_fully_consumed(&self, segment: SegmentId, consumed: &[BlockId]) -> bool {
        self.blocks
            .iter()
            .filter(|b| b.segment == segment && !b.dropped)
            .all(|b| consumed.contains(&b.id))
    }

    pub fn log_merge(&mut self, entry: MergeCommitEntry) {
        self.merge_log.push(entry);
    }

    pub fn merge_log(&self) -> &[MergeCommitEntry] {
        &self.merge_log
    }
}
