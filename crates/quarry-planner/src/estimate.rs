//! Filter Output Estimation and Filter Ordering
//!
//! `estimate_out_cnt` walks a filter expression and estimates how many
//! rows survive it, given the scan's table count, the block-pruned cost,
//! and the table's statistics snapshot. The result is always clamped to
//! `[1, cost]`.
//!
//! `estimate_filter_weight` scores filters for execution ordering: wide
//! types and expensive functions weigh more, monotonic filters weigh an
//! order of magnitude less because they are pushed down to zone-map
//! pruning instead of being evaluated row by row.

use quarry_core::types::DataType;

use crate::expr::{can_merge_to_between_and, Expr, FuncOp};
use crate::stats::StatsInfoMap;

/// Position of `col_name` within a (possibly composite, comma-separated)
/// sort key, or -1 when it is not part of the key.
pub fn get_sort_order(sort_key_name: &str, col_name: &str) -> i32 {
    if sort_key_name.is_empty() {
        return -1;
    }
    for (i, part) in sort_key_name.split(',').enumerate() {
        if part.trim() == col_name {
            return i as i32;
        }
    }
    -1
}

/// Estimate for a filter on the sort key: reading is already clustered,
/// so the survivor fraction mostly depends on how hard the blocks were
/// pruned. The coefficient is 0.1 when every block survived pruning and
/// approaches 1 as pruning removes most of the table.
pub fn estimate_out_cnt_by_sort_order(table_cnt: f64, cost: f64, sort_order: i32) -> f64 {
    if sort_order == -1 {
        return cost;
    }
    let coefficient = 0.1f64.powf(cost / table_cnt);
    let out_cnt = cost * coefficient;
    match sort_order {
        0 => out_cnt * 0.9,
        1 => out_cnt * 0.7,
        _ => out_cnt * 0.5,
    }
}

/// NDV of the value an expression produces, resolved through the stats
/// snapshot. Comparisons look through to their column side; `year(col)`
/// compresses the column's NDV by 365.
pub fn get_expr_ndv(expr: &Expr, s: &StatsInfoMap) -> f64 {
    match expr {
        Expr::Func { op, args } => match op {
            FuncOp::Eq | FuncOp::Gt | FuncOp::Ge | FuncOp::Le | FuncOp::Lt => args
                .first()
                .map(|arg| get_expr_ndv(arg, s))
                .unwrap_or(-1.0),
            FuncOp::Year => args
                .first()
                .map(|arg| get_expr_ndv(arg, s) / 365.0)
                .unwrap_or(-1.0),
            _ => -1.0,
        },
        Expr::Col(col) => s.ndv(&col.name),
        Expr::Const(_) => -1.0,
    }
}

fn estimate_out_cnt_for_equality(
    expr: &Expr,
    sort_key_name: &str,
    table_cnt: f64,
    cost: f64,
    s: &StatsInfoMap,
) -> f64 {
    // only a single-column filter is estimable
    let Some(col) = expr.check_filter() else {
        return cost / 100.0;
    };
    let sort_order = get_sort_order(sort_key_name, &col.name);
    if sort_order != -1 {
        return estimate_out_cnt_by_sort_order(table_cnt, cost, sort_order);
    }
    let ndv = get_expr_ndv(expr, s);
    if ndv > 0.0 {
        return table_cnt / ndv;
    }
    cost / 100.0
}

fn calc_out_cnt_by_min_max(op: FuncOp, table_cnt: f64, min: f64, max: f64, val: f64) -> f64 {
    if max <= min {
        return -1.0;
    }
    match op {
        FuncOp::Gt | FuncOp::Ge => (max - val) / (max - min) * table_cnt,
        FuncOp::Lt | FuncOp::Le => (val - min) / (max - min) * table_cnt,
        _ => -1.0,
    }
}

fn estimate_out_cnt_for_non_equality(
    expr: &Expr,
    sort_key_name: &str,
    table_cnt: f64,
    cost: f64,
    s: &StatsInfoMap,
) -> f64 {
    let Some(col) = expr.check_filter() else {
        return cost / 10.0;
    };
    let sort_order = get_sort_order(sort_key_name, &col.name);
    if sort_order != -1 {
        return estimate_out_cnt_by_sort_order(table_cnt, cost, sort_order);
    }
    // off the sort key, a strict numeric/date filter interpolates linearly
    // between the column's min and max
    if let Some((col, op, val)) = expr.check_strict_filter() {
        let strict_type = matches!(
            s.data_type_map.get(&col.name),
            Some(
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
                    | DataType::Date
            )
        );
        if strict_type {
            if let (Some(min), Some(max)) = (
                s.min_val_map.get(&col.name).copied(),
                s.max_val_map.get(&col.name).copied(),
            ) {
                let out = calc_out_cnt_by_min_max(op, table_cnt, min, max, val);
                if out >= 0.0 {
                    return out;
                }
            }
        }
    }
    cost / 2.0
}

/// How strongly two conjoined selectivities compound. Independent
/// multiplication is kept for ordinary selectivities; two very selective
/// conjuncts are usually correlated, so the combined estimate backs off
/// toward the smaller one.
pub fn and_selectivity(s1: f64, s2: f64) -> f64 {
    if s1 > 0.15 || s2 > 0.15 || s1 * s2 > 0.1 {
        return s1 * s2;
    }
    s1.min(s2) * s1.powf(s2.powi(2)).max(s2.powf(s1.powi(2)))
}

/// Estimate surviving rows for a filter, clamped to `[1, cost]`.
pub fn estimate_out_cnt(
    expr: &Expr,
    sort_key_name: &str,
    table_cnt: f64,
    cost: f64,
    s: &StatsInfoMap,
) -> f64 {
    let mut out_cnt = match expr {
        Expr::Func { op, args } => match op {
            FuncOp::Eq => estimate_out_cnt_for_equality(expr, sort_key_name, table_cnt, cost, s),
            FuncOp::Gt | FuncOp::Ge | FuncOp::Lt | FuncOp::Le => {
                estimate_out_cnt_for_non_equality(expr, sort_key_name, table_cnt, cost, s)
            }
            FuncOp::And => {
                let out1 = estimate_out_cnt(&args[0], sort_key_name, table_cnt, cost, s);
                let out2 = estimate_out_cnt(&args[1], sort_key_name, table_cnt, cost, s);
                if can_merge_to_between_and(&args[0], &args[1]) && (out1 + out2) > table_cnt {
                    (out1 + out2) - table_cnt
                } else {
                    and_selectivity(out1 / table_cnt, out2 / table_cnt) * table_cnt
                }
            }
            FuncOp::Or => {
                let out1 = estimate_out_cnt(&args[0], sort_key_name, table_cnt, cost, s);
                let out2 = estimate_out_cnt(&args[1], sort_key_name, table_cnt, cost, s);
                if out1 == out2 {
                    out1 + out2
                } else {
                    out1.max(out2) * 1.5
                }
            }
            _ => cost * 0.15,
        },
        Expr::Const(_) => cost,
        Expr::Col(_) => 0.0,
    };
    if out_cnt > cost {
        out_cnt = cost;
    } else if out_cnt < 1.0 {
        out_cnt = 1.0;
    }
    out_cnt
}

/// Execution-cost weight of a filter, used to order a scan's filter list
/// ascending. Lower weight runs first.
pub fn estimate_filter_weight(expr: &Expr, mut w: f64) -> f64 {
    match expr.data_type() {
        DataType::Decimal64 => w += 64.0,
        DataType::Decimal128 => w += 128.0,
        DataType::Char | DataType::Varchar | DataType::Text | DataType::Json => w += 4.0,
        _ => {}
    }
    if let Expr::Func { op, args } = expr {
        match op {
            FuncOp::Like => w += 10.0,
            FuncOp::In => w += 5.0,
            FuncOp::Lt | FuncOp::Le => w += 1.1,
            _ => w += 1.0,
        }
        for child in args {
            w += estimate_filter_weight(child, 0.0);
        }
    }
    if expr.is_monotonic() {
        // pushed to zone-map pruning, so nearly free at execution time
        w *= 0.1;
    }
    w
}

/// Convenience for estimator consumers: the constant used in test
/// snapshots to mean "no statistics".
pub fn empty_stats() -> StatsInfoMap {
    StatsInfoMap::new()
}
