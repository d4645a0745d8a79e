//! Plan Nodes and Stats-Driven Rewrites
//!
//! An arena-indexed plan tree with per-node statistics, plus the three
//! stats-driven passes the planner runs over it:
//!
//! - `recalc_node_stats`: post-order recomputation of output counts,
//!   costs, selectivities and hash sizes for every node shape
//! - `apply_swap_rule_by_stats`: put the larger input on the probe side of
//!   hash joins (or record `build_on_left` for side-asymmetric joins)
//! - `sort_filter_list_by_stats`: order each scan's filters cheapest-first
//!
//! All passes degrade instead of failing: a node with no usable statistics
//! gets `Stats::default_stats` and planning proceeds.

use std::sync::Arc;

use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;

use quarry_storage::catalog::TableSchema;
use quarry_storage::name::Location;

use crate::error::Result;
use crate::estimate::{estimate_filter_weight, estimate_out_cnt, get_expr_ndv};
use crate::expr::{constant_fold, split_by_monotonic, Expr, FuncOp};
use crate::scan::calc_stats;
use crate::stats::{Stats, StatsCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Join,
    Agg,
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Minus,
    MinusAll,
    ValueScan,
    TableScan,
    FunctionScan,
    Filter,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
    Semi,
    Anti,
    Single,
    Mark,
}

/// What a table-scan node scans.
#[derive(Debug, Clone)]
pub struct ScanSource {
    pub table_id: u64,
    pub schema: TableSchema,
    pub blocks: Vec<Location>,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub node_type: NodeType,
    pub children: Vec<usize>,
    pub join_type: JoinType,
    pub on_list: Vec<Expr>,
    /// For side-asymmetric joins that cannot swap children: build the hash
    /// table on the left input.
    pub build_on_left: bool,
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    /// Literal rowset size for value scans.
    pub rowset_rows: Option<usize>,
    pub source: Option<ScanSource>,
    pub stats: Stats,
}

impl PlanNode {
    fn base(node_type: NodeType) -> Self {
        Self {
            node_type,
            children: Vec::new(),
            join_type: JoinType::default(),
            on_list: Vec::new(),
            build_on_left: false,
            filters: Vec::new(),
            group_by: Vec::new(),
            rowset_rows: None,
            source: None,
            stats: Stats::default(),
        }
    }

    pub fn join(join_type: JoinType, left: usize, right: usize, on_list: Vec<Expr>) -> Self {
        Self {
            children: vec![left, right],
            join_type,
            on_list,
            ..Self::base(NodeType::Join)
        }
    }

    pub fn table_scan(source: ScanSource, filters: Vec<Expr>) -> Self {
        Self {
            source: Some(source),
            filters,
            ..Self::base(NodeType::TableScan)
        }
    }

    pub fn function_scan() -> Self {
        Self::base(NodeType::FunctionScan)
    }

    pub fn value_scan(rows: usize) -> Self {
        Self {
            rowset_rows: Some(rows),
            ..Self::base(NodeType::ValueScan)
        }
    }

    pub fn agg(child: usize, group_by: Vec<Expr>) -> Self {
        Self {
            children: vec![child],
            group_by,
            ..Self::base(NodeType::Agg)
        }
    }

    pub fn set_op(node_type: NodeType, left: usize, right: usize) -> Self {
        Self {
            children: vec![left, right],
            ..Self::base(node_type)
        }
    }

    pub fn filter_node(child: usize) -> Self {
        Self {
            children: vec![child],
            ..Self::base(NodeType::Filter)
        }
    }

    pub fn project(child: usize) -> Self {
        Self {
            children: vec![child],
            ..Self::base(NodeType::Project)
        }
    }
}

/// Arena of plan nodes; children reference by index.
#[derive(Debug, Default)]
pub struct Query {
    pub nodes: Vec<PlanNode>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: PlanNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// What a table-scan recomputation needs from the environment.
pub struct ScanStatsContext<'a> {
    pub fs: Arc<dyn ObjectStore>,
    pub cache: &'a mut StatsCache,
    pub ctx: &'a CancellationToken,
}

fn postorder(query: &Query, root: usize, out: &mut Vec<usize>) {
    for child in query.nodes[root].children.clone() {
        postorder(query, child, out);
    }
    out.push(root);
}

fn find_scan_source(query: &Query, id: usize) -> Option<(u64, String)> {
    let node = &query.nodes[id];
    if node.node_type == NodeType::TableScan {
        if let Some(src) = &node.source {
            return Some((src.table_id, src.schema.name.clone()));
        }
    }
    for child in &node.children {
        if let Some(found) = find_scan_source(query, *child) {
            return Some(found);
        }
    }
    None
}

/// Recompute statistics bottom-up from `node_id`. `leaf_node` gates the
/// expensive table-scan recomputation; pass `None` for `scan` to keep
/// existing scan stats untouched.
pub async fn recalc_node_stats(
    query: &mut Query,
    node_id: usize,
    recursive: bool,
    leaf_node: bool,
    mut scan: Option<&mut ScanStatsContext<'_>>,
) -> Result<()> {
    let mut order = Vec::new();
    if recursive {
        postorder(query, node_id, &mut order);
    } else {
        order.push(node_id);
    }

    for id in order {
        let child_ids = query.nodes[id].children.clone();
        let child_stats: Vec<Stats> = child_ids
            .iter()
            .map(|c| query.nodes[*c].stats.clone())
            .collect();
        let node_type = query.nodes[id].node_type;
        let scan_ref = scan.as_deref_mut();

        let new_stats = match node_type {
            NodeType::Join => {
                let left = &child_stats[0];
                let right = &child_stats[1];
                let ndv = left.outcnt.min(right.outcnt).max(1.0);
                let selectivity = right.selectivity.powf(left.selectivity.powf(0.5));
                let selectivity_out = left
                    .selectivity
                    .powf(right.selectivity.powf(0.5))
                    .min(selectivity);
                let joined = left.outcnt * right.outcnt / ndv * selectivity;
                let outcnt = match query.nodes[id].join_type {
                    JoinType::Inner => joined,
                    JoinType::Left => joined + left.outcnt,
                    JoinType::Right => joined + right.outcnt,
                    JoinType::Outer => joined + left.outcnt + right.outcnt,
                    JoinType::Semi | JoinType::Anti => left.outcnt * selectivity,
                    JoinType::Single | JoinType::Mark => left.outcnt,
                };
                Stats {
                    outcnt,
                    cost: left.cost + right.cost,
                    hashmap_size: right.outcnt,
                    selectivity: selectivity_out,
                    ..Default::default()
                }
            }

            NodeType::Agg => {
                let child = &child_stats[0];
                let group_by = query.nodes[id].group_by.clone();
                if group_by.is_empty() {
                    Stats {
                        outcnt: 1.0,
                        cost: child.cost,
                        selectivity: 1.0,
                        ..Default::default()
                    }
                } else {
                    let input = child.outcnt;
                    let ndv_map = match (scan_ref, find_scan_source(query, id)) {
                        (Some(sc), Some((table_id, name))) => {
                            Some(sc.cache.get_stats_info_map(table_id, &name))
                        }
                        _ => None,
                    };
                    let mut output = 1.0;
                    let mut unknown = ndv_map.is_none();
                    if let Some(map) = &ndv_map {
                        for g in &group_by {
                            let ndv = get_expr_ndv(g, map);
                            if ndv <= 0.0 {
                                unknown = true;
                                break;
                            }
                            output *= ndv;
                        }
                    }
                    let output = if unknown { input } else { output.min(input) };
                    Stats {
                        outcnt: output,
                        cost: input + output,
                        hashmap_size: output,
                        selectivity: 1.0,
                        ..Default::default()
                    }
                }
            }

            NodeType::Union
            | NodeType::UnionAll
            | NodeType::Intersect
            | NodeType::IntersectAll
            | NodeType::Minus
            | NodeType::MinusAll => {
                let left = &child_stats[0];
                let right = &child_stats[1];
                let diff = left.outcnt.max(right.outcnt) - left.outcnt.min(right.outcnt);
                let (outcnt, hashmap_size) = match node_type {
                    NodeType::Union => ((left.outcnt + right.outcnt) * 0.7, right.outcnt),
                    NodeType::UnionAll => (left.outcnt + right.outcnt, 0.0),
                    NodeType::Intersect => (left.outcnt.min(right.outcnt) * 0.5, right.outcnt),
                    NodeType::IntersectAll => (left.outcnt.min(right.outcnt) * 0.7, right.outcnt),
                    NodeType::Minus => (diff * 0.5, right.outcnt),
                    NodeType::MinusAll => (diff * 0.7, right.outcnt),
                    _ => unreachable!(),
                };
                Stats {
                    outcnt,
                    cost: left.outcnt + right.outcnt,
                    hashmap_size,
                    selectivity: 1.0,
                    ..Default::default()
                }
            }

            NodeType::ValueScan => match query.nodes[id].rowset_rows {
                None => Stats::default_stats(),
                Some(rows) => {
                    let row_count = rows as f64;
                    Stats {
                        table_cnt: row_count,
                        block_num: (row_count / 8192.0 + 1.0) as i32,
                        outcnt: row_count,
                        cost: row_count,
                        selectivity: 1.0,
                        hashmap_size: 0.0,
                    }
                }
            },

            NodeType::TableScan => {
                let has_source = query.nodes[id].source.is_some();
                match (leaf_node && has_source, scan_ref) {
                    (true, Some(sc)) => {
                        let filters = query.nodes[id].filters.clone();
                        let (mono, non_mono) = split_by_monotonic(&filters);
                        let src = query.nodes[id].source.as_ref().unwrap();
                        let sort_key = if src.schema.has_sort_key() {
                            src.schema.sort_key_name().to_string()
                        } else {
                            String::new()
                        };
                        let mut stats = calc_stats(
                            &sc.fs,
                            &src.blocks,
                            mono.as_ref(),
                            &src.schema,
                            src.table_id,
                            &sort_key,
                            sc.cache,
                            sc.ctx,
                        )
                        .await?;
                        if let Some(non_mono) = non_mono {
                            if stats.table_cnt > 0.0 {
                                let s_map = sc
                                    .cache
                                    .get_stats_info_map(src.table_id, &src.schema.name);
                                let outcnt = estimate_out_cnt(
                                    &non_mono,
                                    &sort_key,
                                    stats.table_cnt,
                                    stats.cost,
                                    &s_map,
                                );
                                stats.selectivity *= outcnt / stats.table_cnt;
                                stats.outcnt = stats.table_cnt * stats.selectivity;
                                stats.cost = stats.outcnt;
                                stats.block_num = (stats.outcnt / 8192.0 + 1.0) as i32;
                            }
                        }
                        stats
                    }
                    _ => {
                        let current = query.nodes[id].stats.clone();
                        if current == Stats::default() {
                            Stats::default_stats()
                        } else {
                            current
                        }
                    }
                }
            }

            NodeType::Filter => {
                let child = &child_stats[0];
                Stats {
                    outcnt: child.outcnt * 0.05,
                    cost: child.cost,
                    selectivity: 0.05,
                    ..Default::default()
                }
            }

            NodeType::FunctionScan | NodeType::Project => match child_stats.first() {
                Some(child) => Stats {
                    outcnt: child.outcnt,
                    cost: child.outcnt,
                    selectivity: child.selectivity,
                    ..Default::default()
                },
                None => {
                    let current = query.nodes[id].stats.clone();
                    if current == Stats::default() {
                        Stats::default_stats()
                    } else {
                        current
                    }
                }
            },
        };
        query.nodes[id].stats = new_stats;
    }
    Ok(())
}

/// Whether every join condition is a column-to-column equality.
pub fn is_equi_join(on_list: &[Expr]) -> bool {
    !on_list.is_empty()
        && on_list.iter().all(|e| {
            matches!(e, Expr::Func { op: FuncOp::Eq, args }
                if args.len() == 2
                    && matches!(args[0], Expr::Col(_))
                    && matches!(args[1], Expr::Col(_)))
        })
}

/// Post-order join-side selection: put the larger output on the probe
/// side. Side-asymmetric joins record `build_on_left` instead of
/// physically swapping.
pub fn apply_swap_rule_by_stats(query: &mut Query, node_id: usize, recursive: bool) {
    let mut order = Vec::new();
    if recursive {
        postorder(query, node_id, &mut order);
    } else {
        order.push(node_id);
    }
    for id in order {
        if query.nodes[id].node_type != NodeType::Join {
            continue;
        }
        let left = query.nodes[id].children[0];
        let right = query.nodes[id].children[1];
        if query.nodes[right].node_type == NodeType::FunctionScan {
            continue;
        }
        let left_out = query.nodes[left].stats.outcnt;
        let right_out = query.nodes[right].stats.outcnt;
        match query.nodes[id].join_type {
            JoinType::Inner | JoinType::Outer => {
                if left_out < right_out {
                    query.nodes[id].children.swap(0, 1);
                }
            }
            JoinType::Left | JoinType::Semi | JoinType::Anti => {
                // these joins are side-asymmetric and cannot swap
                if is_equi_join(&query.nodes[id].on_list) && left_out < right_out {
                    query.nodes[id].build_on_left = true;
                }
            }
            _ => {}
        }
    }
}

/// Order joins by how much they reduce data: selectivity first, then
/// smaller output.
pub fn compare_stats(a: &Stats, b: &Stats) -> bool {
    if (a.selectivity - b.selectivity).abs() > 0.01 {
        a.selectivity < b.selectivity
    } else {
        a.outcnt < b.outcnt
    }
}

/// Constant-fold and reorder every scan's filter list so the cheapest
/// filters run first.
pub fn sort_filter_list_by_stats(query: &mut Query, node_id: usize) {
    let mut order = Vec::new();
    postorder(query, node_id, &mut order);
    for id in order {
        let node = &mut query.nodes[id];
        if node.node_type != NodeType::TableScan || node.filters.len() < 2 {
            continue;
        }
        let filters = std::mem::take(&mut node.filters);
        let mut filters: Vec<Expr> = filters.into_iter().map(constant_fold).collect();
        filters.sort_by(|a, b| {
            estimate_filter_weight(a, 0.0).total_cmp(&estimate_filter_weight(b, 0.0))
        });
        node.filters = filters;
    }
}
