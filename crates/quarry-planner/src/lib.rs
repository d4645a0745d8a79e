//! Quarry Planner
//!
//! The cost-based scan planning core: per-table statistics derived from
//! zone maps, a process-wide stats cache, cardinality estimation for scan
//! filters, and the stats-driven plan rewrites (node stats recalculation,
//! join build-side selection, filter ordering).
//!
//! ## Data Flow
//!
//! ```text
//! object metadata ──► zonemap_info (NDV/min/max per column)
//!        │                   │
//!        │                   ▼
//!        │            stats (per-table snapshot cache)
//!        │                   │
//!        ▼                   ▼
//!  scan::calc_stats ──► estimate (filter out-count, weights)
//!                            │
//!                            ▼
//!                      plan (node stats, join swap, filter order)
//! ```

pub mod error;
pub mod estimate;
pub mod expr;
pub mod plan;
pub mod scan;
pub mod stats;
pub mod zonemap_info;

pub use error::{Error, Result};
pub use estimate::{estimate_filter_weight, estimate_out_cnt};
pub use expr::{ColRef, ConstVal, Expr, FuncOp};
pub use plan::{
    apply_swap_rule_by_stats, recalc_node_stats, sort_filter_list_by_stats, JoinType, NodeType,
    PlanNode, Query, ScanSource, ScanStatsContext,
};
pub use scan::calc_stats;
pub use stats::{Stats, StatsCache, StatsInfoMap};
pub use zonemap_info::{calc_ndv_using_zonemap, get_info_from_zone_map, InfoFromZoneMap};
