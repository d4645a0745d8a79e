//! Per-Table Statistics and the Stats Cache
//!
//! `StatsInfoMap` is one table's statistics snapshot: per-column NDV,
//! min/max (decoded to f64) and data-type tags, plus the block count the
//! snapshot was derived from. A snapshot is valid exactly while the
//! table's block count is unchanged; `need_update` is the freshness check.
//!
//! `StatsCache` keeps one snapshot per table for the life of the process.
//! Entries are replaced wholesale, never mutated: racing refreshes compute
//! the same snapshot, so last-writer-wins is benign. The cache is small by
//! design (one entry per user table) and deliberately unbounded. System
//! tables always get a fresh empty snapshot and are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_core::types::DataType;
use quarry_storage::catalog::TableSchema;

use crate::zonemap_info::InfoFromZoneMap;

/// Fixed catalog table ids, never worth caching stats for.
pub const CATALOG_DATABASE_ID: u64 = 1;
pub const CATALOG_TABLES_ID: u64 = 2;
pub const CATALOG_COLUMNS_ID: u64 = 3;

/// Whether a table is a system table: stats are computed fresh and never
/// cached for these.
pub fn is_system_table(table_id: u64, table_name: &str) -> bool {
    matches!(
        table_id,
        CATALOG_DATABASE_ID | CATALOG_TABLES_ID | CATALOG_COLUMNS_ID
    ) || table_name.starts_with("mo_")
        || table_name.starts_with("__mo_")
}

/// Whether the planner should gather statistics for a table at all.
pub fn needs_stats(table_id: u64, table_name: &str) -> bool {
    if is_system_table(table_id, table_name) {
        return false;
    }
    !matches!(table_name, "sys_async_task" | "sys_cron_task")
}

/// One table's statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatsInfoMap {
    pub ndv_map: HashMap<String, f64>,
    pub min_val_map: HashMap<String, f64>,
    pub max_val_map: HashMap<String, f64>,
    pub data_type_map: HashMap<String, DataType>,
    /// Block count observed when the snapshot was derived.
    pub block_number: usize,
    pub table_cnt: f64,
    pub table_name: String,
}

impl StatsInfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the snapshot has never been derived or the table's block
    /// set has changed size since.
    pub fn need_update(&self, current_block_num: usize) -> bool {
        self.block_number == 0 || self.block_number != current_block_num
    }

    pub fn ndv(&self, col: &str) -> f64 {
        self.ndv_map.get(col).copied().unwrap_or(0.0)
    }
}

/// Build a fresh snapshot from derived zone-map info. Min/max are decoded
/// to f64 for every ordered type; other types keep NDV and type tag only.
pub fn update_stats_info_map(
    info: &InfoFromZoneMap,
    block_num_total: usize,
    table_cnt: f64,
    schema: &TableSchema,
) -> StatsInfoMap {
    tracing::info!(table = %schema.name, blocks = block_num_total, "updating stats cache");
    let mut s = StatsInfoMap {
        block_number: block_num_total,
        table_cnt,
        table_name: schema.name.clone(),
        ..Default::default()
    };
    for (i, col) in schema.user_cols().enumerate() {
        s.ndv_map.insert(col.name.clone(), info.column_ndvs[i]);
        s.data_type_map.insert(col.name.clone(), info.data_types[i]);
        if info.data_types[i].is_ordered() {
            let zm = &info.column_zms[i];
            if let (Some(min), Some(max)) = (zm.min_f64(), zm.max_f64()) {
                s.min_val_map.insert(col.name.clone(), min);
                s.max_val_map.insert(col.name.clone(), max);
            }
        }
    }
    s
}

/// Per-process stats cache, keyed by table id. Callers serialize access
/// per table; racing refreshes are benign.
#[derive(Debug, Default)]
pub struct StatsCache {
    pool: HashMap<u64, Arc<StatsInfoMap>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached snapshot for a table, inserting an empty one on
    /// miss. System tables always get a fresh, uncached empty snapshot.
    pub fn get_stats_info_map(&mut self, table_id: u64, table_name: &str) -> Arc<StatsInfoMap> {
        if is_system_table(table_id, table_name) {
            return Arc::new(StatsInfoMap::new());
        }
        self.pool
            .entry(table_id)
            .or_insert_with(|| Arc::new(StatsInfoMap::new()))
            .clone()
    }

    /// Replace a table's snapshot wholesale. System tables are never
    /// cached; the snapshot is still returned for immediate use.
    pub fn update(&mut self, table_id: u64, snapshot: StatsInfoMap) -> Arc<StatsInfoMap> {
        let name = snapshot.table_name.clone();
        let snapshot = Arc::new(snapshot);
        if !is_system_table(table_id, &name) {
            self.pool.insert(table_id, snapshot.clone());
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

/// Estimates attached to every plan node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub table_cnt: f64,
    pub cost: f64,
    pub outcnt: f64,
    pub selectivity: f64,
    pub hashmap_size: f64,
    pub block_num: i32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            table_cnt: 0.0,
            cost: 0.0,
            outcnt: 0.0,
            selectivity: 0.0,
            hashmap_size: 0.0,
            block_num: 0,
        }
    }
}

impl Stats {
    /// Fallback for nodes without usable statistics; the planner never
    /// panics on missing stats.
    pub fn default_stats() -> Stats {
        Stats {
            table_cnt: 1000.0,
            cost: 1000.0,
            outcnt: 1000.0,
            selectivity: 1.0,
            hashmap_size: 0.0,
            block_num: 1,
        }
    }

    pub fn default_huge_stats() -> Stats {
        Stats {
            table_cnt: 10_000_000.0,
            cost: 10_000_000.0,
            outcnt: 10_000_000.0,
            selectivity: 1.0,
            hashmap_size: 0.0,
            block_num: 1000,
        }
    }
}
