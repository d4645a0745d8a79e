//! Scan Cardinality (`calc_stats`)
//!
//! Computes a table-scan node's statistics: walk the candidate blocks
//! accumulating the table's row count, prune blocks through zone maps when
//! the filter is monotonic, refresh the table's stats snapshot when the
//! block count changed, and estimate the filter's surviving rows.
//!
//! Object metadata is loaded at most once per distinct object: if the
//! object-level zone maps already exclude the filter, every block of that
//! object is skipped without loading anything else.

use std::sync::Arc;

use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;

use quarry_storage::catalog::TableSchema;
use quarry_storage::name::Location;
use quarry_storage::object::{load_object_meta, BlockMeta, ObjectMeta};
use quarry_storage::zonemap::ZoneMap;

use crate::error::Result;
use crate::estimate::estimate_out_cnt;
use crate::expr::{Expr, FuncOp};
use crate::stats::{update_stats_info_map, Stats, StatsCache};
use crate::zonemap_info::get_info_from_zone_map;

/// Evaluate whether a monotonic filter may match anything summarized by
/// the zone maps `zm_of` resolves. Unknown shapes and missing information
/// answer true: pruning must never drop a block it cannot judge.
pub fn eval_filter_with_zonemap<'a, F>(expr: &Expr, zm_of: &F) -> bool
where
    F: Fn(&str) -> Option<&'a ZoneMap>,
{
    match expr {
        Expr::Func { op: FuncOp::And, args } => {
            args.iter().all(|arg| eval_filter_with_zonemap(arg, zm_of))
        }
        Expr::Func { op: FuncOp::Or, args } => {
            args.iter().any(|arg| eval_filter_with_zonemap(arg, zm_of))
        }
        Expr::Func { op, args } if op.is_comparison() && args.len() == 2 => {
            let (Expr::Col(col), Expr::Const(value)) = (&args[0], &args[1]) else {
                return true;
            };
            let Some(zm) = zm_of(&col.name) else {
                return true;
            };
            let Some(v) = value.to_f64() else {
                return true;
            };
            match op {
                FuncOp::Eq => zm.may_eq(v),
                FuncOp::Gt => zm.may_gt(v),
                FuncOp::Ge => zm.may_ge(v),
                FuncOp::Lt => zm.may_lt(v),
                FuncOp::Le => zm.may_le(v),
                _ => true,
            }
        }
        _ => true,
    }
}

fn eval_on_object(expr: &Expr, meta: &ObjectMeta, schema: &TableSchema) -> bool {
    eval_filter_with_zonemap(expr, &|name: &str| {
        let col = schema.user_cols().find(|c| c.name == name)?;
        let cm = meta.column_meta(col.seqnum)?;
        Some(&cm.zone_map)
    })
}

fn eval_on_block(expr: &Expr, block: &BlockMeta, schema: &TableSchema) -> bool {
    eval_filter_with_zonemap(expr, &|name: &str| {
        let col = schema.user_cols().find(|c| c.name == name)?;
        if col.seqnum >= block.meta_column_count {
            return None;
        }
        Some(&block.column_meta(col.seqnum).zone_map)
    })
}

/// Compute scan statistics over `blocks` with an optional pushed-down
/// filter. Refreshes the table's stats snapshot when stale; on a
/// derivation failure the scan degrades to `Stats::default_stats`.
#[allow(clippy::too_many_arguments)]
pub async fn calc_stats(
    fs: &Arc<dyn ObjectStore>,
    blocks: &[Location],
    expr: Option<&Expr>,
    schema: &TableSchema,
    table_id: u64,
    sort_key_name: &str,
    cache: &mut StatsCache,
    ctx: &CancellationToken,
) -> Result<Stats> {
    let is_mono = expr.map(Expr::is_monotonic).unwrap_or(false);
    let block_num_total = blocks.len();

    let mut table_cnt = 0u64;
    let mut cost = 0u64;
    let mut block_num_need = 0i32;
    let mut current: Option<(String, ObjectMeta, bool)> = None;
    for blk in blocks {
        table_cnt += blk.rows as u64;
        let mut needed = true;
        if is_mono {
            let e = expr.unwrap();
            let name = blk.name.to_string();
            let reload = current
                .as_ref()
                .map(|(loaded, _, _)| *loaded != name)
                .unwrap_or(true);
            if reload {
                let meta = load_object_meta(fs, blk, ctx).await?;
                let skip = !eval_on_object(e, &meta, schema);
                current = Some((name, meta, skip));
            }
            let (_, meta, skip_object) = current.as_ref().unwrap();
            if *skip_object {
                continue;
            }
            needed = match meta.block_meta(blk.id as u32) {
                Some(bm) => eval_on_block(e, bm, schema),
                None => true,
            };
        }
        if needed {
            cost += blk.rows as u64;
            block_num_need += 1;
        }
    }

    let mut stats = Stats {
        table_cnt: table_cnt as f64,
        cost: cost as f64,
        block_num: block_num_need,
        ..Default::default()
    };

    let mut entry = cache.get_stats_info_map(table_id, &schema.name);
    if entry.need_update(block_num_total) {
        match get_info_from_zone_map(fs, blocks, stats.table_cnt, schema, ctx).await {
            Ok(info) => {
                let snapshot =
                    update_stats_info_map(&info, block_num_total, stats.table_cnt, schema);
                entry = cache.update(table_id, snapshot);
            }
            Err(e) => {
                tracing::warn!(table = %schema.name, error = %e,
                    "stats derivation failed, falling back to defaults");
                return Ok(Stats::default_stats());
            }
        }
    }

    stats.outcnt = match expr {
        Some(e) => estimate_out_cnt(e, sort_key_name, stats.table_cnt, stats.cost, &entry),
        None => stats.table_cnt,
    };
    stats.selectivity = if stats.table_cnt > 0.0 {
        stats.outcnt / stats.table_cnt
    } else {
        1.0
    };
    Ok(stats)
}
