//! Merge-Blocks Compaction Task
//!
//! Rewrites N input blocks (possibly spanning multiple segments) into one
//! new sorted, non-appendable segment:
//!
//! 1. Pick the sort column: the table's declared sort key, else the
//!    physical-address order (inputs are then concatenated, not re-sorted)
//! 2. Load each input block's sort column once per distinct parent object,
//!    apply that block's delete bitmap, and drop blocks the deletes
//!    emptied
//! 3. Partition the surviving total into `block_max_rows`-sized output
//!    blocks and order the sort column across all inputs
//! 4. Shuffle every other column into the same output layout
//! 5. Write all output blocks into one new object, stamp the resulting
//!    meta locations onto fresh catalog entries, soft-delete the inputs,
//!    and log a merge-commit entry for replay
//!
//! Any failure before the catalog mutations releases the buffers and
//! returns the error unchanged; a repeated merge of the same input is safe
//! because the output name derives from the new segment id and the writer
//! already handles name collisions.

pub mod mergesort;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quarry_core::column::{Batch, Column};

use crate::catalog::{BlockId, MergeCommitEntry, Relation, SegmentId};
use crate::error::{Error, Result};
use crate::name::{Location, ObjectName};
use crate::object::meta::ObjectMeta;
use crate::object::reader::{load_object_meta, ObjectReader};
use crate::object::writer::ObjectWriter;

/// What a committed merge produced.
#[derive(Debug)]
pub struct MergeOutcome {
    pub created_segment: SegmentId,
    pub created_blocks: Vec<BlockId>,
    /// Post-delete global source row → output row.
    pub mapping: Vec<u32>,
    pub from_addr: Vec<u32>,
    pub to_addr: Vec<u32>,
    pub skip_blks: Vec<usize>,
}

pub struct MergeBlocksTask {
    fs: Arc<dyn ObjectStore>,
    merged_blks: Vec<BlockId>,
}

struct ObjectMetaCache {
    fs: Arc<dyn ObjectStore>,
    cache: HashMap<String, ObjectMeta>,
}

impl ObjectMetaCache {
    fn new(fs: Arc<dyn ObjectStore>) -> Self {
        Self {
            fs,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, location: &Location, ctx: &CancellationToken) -> Result<ObjectMeta> {
        let key = location.name.to_string();
        if let Some(meta) = self.cache.get(&key) {
            return Ok(meta.clone());
        }
        let meta = load_object_meta(&self.fs, location, ctx).await?;
        self.cache.insert(key, meta.clone());
        Ok(meta)
    }
}

impl MergeBlocksTask {
    pub fn new(fs: Arc<dyn ObjectStore>, merged_blks: Vec<BlockId>) -> Self {
        Self { fs, merged_blks }
    }

    async fn load_block_column(
        &self,
        metas: &mut ObjectMetaCache,
        location: &Location,
        seqnum: u16,
        ctx: &CancellationToken,
    ) -> Result<Column> {
        let meta = metas.get(location, ctx).await?;
        let block = meta.block_meta(location.id as u32).ok_or_else(|| {
            Error::InvalidObject(format!(
                "block {} not present in object {}",
                location.id, location.name
            ))
        })?;
        let reader = ObjectReader::new(self.fs.clone(), location.name);
        reader.read_column(block, seqnum, ctx).await
    }

    /// Run the merge against `rel`. Input blocks are read through their
    /// recorded meta locations; catalog mutations happen only after the
    /// output object is durably written.
    pub async fn execute(
        self,
        rel: &mut Relation,
        ctx: &CancellationToken,
    ) -> Result<MergeOutcome> {
        let start = Instant::now();
        tracing::info!(
            table = %rel.schema.name,
            blocks = self.merged_blks.len(),
            "[Start] merge blocks"
        );

        let schema = rel.schema.clone();
        let sort_idx = schema.sort_col_idx();
        let has_sort_key = schema.has_sort_key();
        let sort_seqnum = if has_sort_key {
            schema.cols[sort_idx].seqnum
        } else {
            // no declared sort key: inputs keep physical order, and any
            // stored column serves for row counting and delete application
            schema.user_seqnums()[0]
        };
        tracing::debug!(column = %schema.cols[sort_idx].name, "merge sort column");

        // distinct parent segments, in first-seen order
        let mut merged_segs: Vec<SegmentId> = Vec::new();
        let mut locations = Vec::with_capacity(self.merged_blks.len());
        let mut input_deletes = Vec::with_capacity(self.merged_blks.len());
        for id in &self.merged_blks {
            let entry = rel.block(*id)?;
            let location = entry.meta_location.clone().ok_or_else(|| {
                Error::InvalidObject(format!("block {id} has no meta location"))
            })?;
            if !merged_segs.contains(&entry.segment) {
                merged_segs.push(entry.segment);
            }
            locations.push(location);
            input_deletes.push(entry.deletes.clone());
        }

        // load the sort column of every input, apply deletes, drop empties
        let mut metas = ObjectMetaCache::new(self.fs.clone());
        let mut sort_vecs: Vec<Column> = Vec::new();
        let mut rows: Vec<u32> = Vec::new();
        let mut from_addr: Vec<u32> = Vec::new();
        let mut skip_blks: Vec<usize> = Vec::new();
        let mut surviving: Vec<BlockId> = Vec::new();
        let mut length = 0u32;
        for (i, location) in locations.iter().enumerate() {
            let col = self
                .load_block_column(&mut metas, location, sort_seqnum, ctx)
                .await?;
            let col = match &input_deletes[i] {
                Some(deletes) => col.filter_deletes(deletes),
                None => col,
            };
            if col.is_empty() {
                skip_blks.push(i);
                continue;
            }
            rows.push(col.len() as u32);
            from_addr.push(length);
            length += col.len() as u32;
            surviving.push(self.merged_blks[i]);
            sort_vecs.push(col);
        }
        if length == 0 {
            return Err(Error::EmptyMerge(format!(
                "all {} input blocks are empty after deletes",
                self.merged_blks.len()
            )));
        }

        // output layout: block_max_rows-sized blocks plus a remainder
        let mut to: Vec<u32> = Vec::new();
        let mut remaining = length;
        while remaining > 0 {
            let n = remaining.min(schema.block_max_rows);
            to.push(n);
            remaining -= n;
        }

        // order the sort column; 4 bytes per surviving row
        let mut sorted_idx: Vec<u32> = Vec::with_capacity(length as usize);
        let (sorted_cols, mapping) = if has_sort_key {
            mergesort::merge_sorted_column(&sort_vecs, &mut sorted_idx, &rows, &to)
        } else {
            let cols = mergesort::reshape(&sort_vecs, &rows, &to);
            sorted_idx.extend(0..length);
            (cols, (0..length).collect())
        };
        drop(sort_vecs);

        let mut to_addr = Vec::with_capacity(sorted_cols.len());
        let mut acc = 0u32;
        for col in &sorted_cols {
            to_addr.push(acc);
            acc += col.len() as u32;
        }
        drop(sorted_cols);

        // gather every user column (the sort key included) into the output
        // layout
        let mut batches: Vec<Batch> = to
            .iter()
            .map(|_| Batch {
                attrs: schema.user_cols().map(|c| c.name.clone()).collect(),
                columns: Vec::new(),
            })
            .collect();
        for def in schema.user_cols() {
            let mut vecs: Vec<Column> = Vec::new();
            for (i, location) in locations.iter().enumerate() {
                if skip_blks.contains(&i) {
                    continue;
                }
                let col = self
                    .load_block_column(&mut metas, location, def.seqnum, ctx)
                    .await?;
                let col = match &input_deletes[i] {
                    Some(deletes) => col.filter_deletes(deletes),
                    None => col,
                };
                vecs.push(col);
            }
            let shards = if has_sort_key {
                mergesort::shuffle_column(&vecs, &sorted_idx, &rows, &to)
            } else {
                mergesort::reshape(&vecs, &rows, &to)
            };
            for (batch, shard) in batches.iter_mut().zip(shards) {
                batch.columns.push(shard);
            }
        }

        // write the new object; its name derives from the new segment id,
        // so a repeated merge collides and the writer rewrites in place
        let seg_uuid = Uuid::new_v4();
        let name = ObjectName::new(seg_uuid, 0);
        let mut writer = ObjectWriter::new(
            self.fs.clone(),
            name,
            schema.version,
            Some(schema.user_seqnums()),
        );
        if let Some(pk_idx) = schema.primary_key_idx {
            writer.set_primary_key(schema.cols[pk_idx].seqnum);
        }
        for batch in &batches {
            writer.write_batch(batch)?;
        }
        let block_metas = writer.finish(ctx).await?;
        drop(batches);

        // catalog mutations: everything before this point aborts cleanly
        let created_segment = rel.create_segment_with_uuid(seg_uuid, true);
        let mut created_blocks = Vec::with_capacity(block_metas.len());
        for (i, bm) in block_metas.iter().enumerate() {
            let id = rel.create_block(created_segment);
            rel.update_block_meta_loc(
                id,
                Location::new(name, bm.meta_location, bm.rows, i as u16),
            )?;
            created_blocks.push(id);
        }

        let fully_consumed: Vec<SegmentId> = merged_segs
            .iter()
            .copied()
            .filter(|seg| rel.segment_fully_consumed(*seg, &self.merged_blks))
            .collect();
        for id in &self.merged_blks {
            rel.soft_delete_block(*id)?;
        }
        for seg in &fully_consumed {
            rel.soft_delete_segment(*seg)?;
        }

        rel.log_merge(MergeCommitEntry {
            merged_segs,
            created_segs: vec![created_segment],
            merged_blks: self.merged_blks.clone(),
            created_blks: created_blocks.clone(),
            mapping: mapping.clone(),
            from_addr: from_addr.clone(),
            to_addr: to_addr.clone(),
            deletes: input_deletes,
            skip_blks: skip_blks.clone(),
        });

        tracing::info!(
            table = %rel.schema.name,
            object = %name,
            merged = surviving.len(),
            skipped = skip_blks.len(),
            created = created_blocks.len(),
            rows = length,
            duration = ?start.elapsed(),
            "[Done] merge blocks"
        );

        Ok(MergeOutcome {
            created_segment,
            created_blocks,
            mapping,
            from_addr,
            to_addr,
            skip_blks,
        })
    }
}
