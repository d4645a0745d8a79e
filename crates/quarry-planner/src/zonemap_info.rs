//! Zone-Map Statistics Derivation
//!
//! Derives a table's per-column statistics (NDV, min, max, type) from the
//! object-level metadata of its blocks.
//!
//! The critical access pattern: block-level metadata lives inside the
//! object meta, so blocks are grouped by parent object and each distinct
//! object's metadata is loaded exactly once. Per-object aggregates are
//! then merged: zone maps widen, NDVs sum, and the summed NDV is adjusted
//! for cross-object double counting.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;

use quarry_core::types::DataType;
use quarry_storage::catalog::TableSchema;
use quarry_storage::name::Location;
use quarry_storage::object::load_object_meta;
use quarry_storage::zonemap::ZoneMap;

use crate::error::Result;

/// Per-column derived info, indexed by schema order (physical-address
/// column excluded).
#[derive(Debug, Clone)]
pub struct InfoFromZoneMap {
    pub column_zms: Vec<ZoneMap>,
    pub data_types: Vec<DataType>,
    pub column_ndvs: Vec<f64>,
}

impl InfoFromZoneMap {
    pub fn new(len_cols: usize) -> Self {
        Self {
            column_zms: vec![ZoneMap::new(DataType::Any); len_cols],
            data_types: vec![DataType::Any; len_cols],
            column_ndvs: vec![0.0; len_cols],
        }
    }
}

/// Collapse a block list to one representative location per distinct
/// parent object.
pub fn group_blocks_to_objects(blocks: &[Location]) -> Vec<&Location> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut objs = Vec::new();
    for block in blocks {
        let name = block.name.to_string();
        if seen.insert(name, ()).is_none() {
            objs.push(block);
        }
    }
    objs
}

/// Estimate NDV from a zone-map range: 2 for booleans, `max - min + 1`
/// for ordered numeric/time types, -1 ("no information") otherwise.
pub fn calc_ndv_using_zonemap(zm: &ZoneMap, t: DataType) -> f64 {
    if t == DataType::Bool {
        return 2.0;
    }
    if !t.is_ordered() {
        return -1.0;
    }
    match (zm.min_f64(), zm.max_f64()) {
        (Some(min), Some(max)) => max - min + 1.0,
        _ => -1.0,
    }
}

/// Derive per-column NDV/min/max/type for all columns except the
/// physical-address column, loading each distinct object's metadata once.
pub async fn get_info_from_zone_map(
    fs: &Arc<dyn ObjectStore>,
    blocks: &[Location],
    table_cnt: f64,
    schema: &TableSchema,
    ctx: &CancellationToken,
) -> Result<InfoFromZoneMap> {
    let len_cols = schema.user_cols().count();
    let mut info = InfoFromZoneMap::new(len_cols);

    let objs = group_blocks_to_objects(blocks);
    let mut init = false;
    for location in &objs {
        let meta = load_object_meta(fs, location, ctx).await?;
        if !init {
            init = true;
            for (idx, col) in schema.user_cols().enumerate() {
                if let Some(cm) = meta.column_meta(col.seqnum) {
                    info.column_zms[idx] = cm.zone_map.clone();
                    info.column_ndvs[idx] = cm.ndv as f64;
                }
                info.data_types[idx] = col.data_type;
            }
        } else {
            for (idx, col) in schema.user_cols().enumerate() {
                let Some(cm) = meta.column_meta(col.seqnum) else {
                    continue;
                };
                if !cm.zone_map.is_inited() {
                    continue;
                }
                info.column_zms[idx].merge(&cm.zone_map);
                info.column_ndvs[idx] += cm.ndv as f64;
            }
        }
    }

    // NDVs summed across objects overcount shared values; adjust
    let len_objs = objs.len() as f64;
    if len_objs > 1.0 {
        for idx in 0..len_cols {
            let mut rate = info.column_ndvs[idx] / table_cnt;
            if rate > 1.0 {
                rate = 1.0;
            }
            if rate < 0.1 {
                info.column_ndvs[idx] /= len_objs.powf(1.0 - rate);
            }
            let ndv_by_zm = calc_ndv_using_zonemap(&info.column_zms[idx], info.data_types[idx]);
            if ndv_by_zm != -1.0 && info.column_ndvs[idx] > ndv_by_zm {
                info.column_ndvs[idx] = ndv_by_zm;
            }
            if info.column_ndvs[idx] > table_cnt {
                info.column_ndvs[idx] = table_cnt;
            }
        }
    }
    Ok(info)
}
