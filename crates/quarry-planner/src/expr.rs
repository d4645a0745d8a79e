//! Filter Expressions
//!
//! The small expression tree the estimator and the zone-map pruner operate
//! on: column references, constants, and function applications. This is
//! the planner's internal shape for pushed-down scan filters, not a SQL
//! surface.
//!
//! The load-bearing predicate here is *monotonicity*: an expression whose
//! truth value is monotonic in a column's value can be evaluated against
//! zone-map bounds, so monotonic conjuncts are split off and pushed to the
//! block pruner while the rest go through the selectivity estimator.

use quarry_core::types::DataType;

/// A constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstVal {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    /// Days since the epoch.
    Date(i32),
}

impl ConstVal {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            ConstVal::Bool(v) => Some(u8::from(*v) as f64),
            ConstVal::I64(v) => Some(*v as f64),
            ConstVal::U64(v) => Some(*v as f64),
            ConstVal::F64(v) => Some(*v),
            ConstVal::Date(v) => Some(*v as f64),
            ConstVal::Str(_) => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ConstVal::Bool(_) => DataType::Bool,
            ConstVal::I64(_) => DataType::Int64,
            ConstVal::U64(_) => DataType::UInt64,
            ConstVal::F64(_) => DataType::Float64,
            ConstVal::Date(_) => DataType::Date,
            ConstVal::Str(_) => DataType::Varchar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColRef {
    pub name: String,
    pub data_type: DataType,
}

impl ColRef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Not,
    Like,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Year,
}

impl FuncOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            FuncOp::Eq | FuncOp::Ne | FuncOp::Gt | FuncOp::Ge | FuncOp::Lt | FuncOp::Le
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Col(ColRef),
    Const(ConstVal),
    Func { op: FuncOp, args: Vec<Expr> },
}

impl Expr {
    pub fn col(name: impl Into<String>, data_type: DataType) -> Expr {
        Expr::Col(ColRef::new(name, data_type))
    }

    pub fn func(op: FuncOp, args: Vec<Expr>) -> Expr {
        Expr::Func { op, args }
    }

    /// `col op const` shorthand.
    pub fn cmp(op: FuncOp, col: Expr, value: ConstVal) -> Expr {
        Expr::Func {
            op,
            args: vec![col, Expr::Const(value)],
        }
    }

    pub fn and(a: Expr, b: Expr) -> Expr {
        Expr::Func {
            op: FuncOp::And,
            args: vec![a, b],
        }
    }

    pub fn or(a: Expr, b: Expr) -> Expr {
        Expr::Func {
            op: FuncOp::Or,
            args: vec![a, b],
        }
    }

    /// The expression's result type.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Col(c) => c.data_type,
            Expr::Const(c) => c.data_type(),
            Expr::Func { op, args } => match op {
                FuncOp::Eq
                | FuncOp::Ne
                | FuncOp::Gt
                | FuncOp::Ge
                | FuncOp::Lt
                | FuncOp::Le
                | FuncOp::And
                | FuncOp::Or
                | FuncOp::Not
                | FuncOp::Like
                | FuncOp::In => DataType::Bool,
                FuncOp::Year => DataType::Int64,
                FuncOp::Add | FuncOp::Sub | FuncOp::Mul | FuncOp::Div => args
                    .first()
                    .map(Expr::data_type)
                    .unwrap_or(DataType::Any),
            },
        }
    }

    fn collect_cols<'a>(&'a self, out: &mut Vec<&'a ColRef>) {
        match self {
            Expr::Col(c) => out.push(c),
            Expr::Const(_) => {}
            Expr::Func { args, .. } => {
                for arg in args {
                    arg.collect_cols(out);
                }
            }
        }
    }

    pub fn columns_referenced(&self) -> Vec<&ColRef> {
        let mut out = Vec::new();
        self.collect_cols(&mut out);
        out
    }

    /// Whether the expression's truth value is monotonic in its columns'
    /// values, which makes it usable for zone-map pruning.
    pub fn is_monotonic(&self) -> bool {
        match self {
            Expr::Col(_) | Expr::Const(_) => true,
            Expr::Func { op, args } => {
                let op_ok = matches!(
                    op,
                    FuncOp::Eq
                        | FuncOp::Gt
                        | FuncOp::Ge
                        | FuncOp::Lt
                        | FuncOp::Le
                        | FuncOp::And
                        | FuncOp::Or
                        | FuncOp::Add
                        | FuncOp::Sub
                        | FuncOp::Year
                );
                op_ok && args.iter().all(Expr::is_monotonic)
            }
        }
    }

    /// A filter the estimator can reason about: a comparison referencing
    /// exactly one column occurrence. Returns that column.
    pub fn check_filter(&self) -> Option<&ColRef> {
        let Expr::Func { op, .. } = self else {
            return None;
        };
        if !op.is_comparison() {
            return None;
        }
        let cols = self.columns_referenced();
        if cols.len() == 1 {
            Some(cols[0])
        } else {
            None
        }
    }

    /// A strict filter: `col op const` with a numeric or date constant.
    /// Returns the column, the operator, and the constant as f64.
    pub fn check_strict_filter(&self) -> Option<(&ColRef, FuncOp, f64)> {
        let Expr::Func { op, args } = self else {
            return None;
        };
        if !op.is_comparison() || args.len() != 2 {
            return None;
        }
        let (Expr::Col(col), Expr::Const(value)) = (&args[0], &args[1]) else {
            return None;
        };
        if matches!(value, ConstVal::Str(_)) {
            return None;
        }
        value.to_f64().map(|v| (col, *op, v))
    }
}

fn fold_binary_i64(op: FuncOp, a: i64, b: i64) -> Option<ConstVal> {
    Some(match op {
        FuncOp::Add => ConstVal::I64(a.checked_add(b)?),
        FuncOp::Sub => ConstVal::I64(a.checked_sub(b)?),
        FuncOp::Mul => ConstVal::I64(a.checked_mul(b)?),
        FuncOp::Div => {
            if b == 0 {
                return None;
            }
            ConstVal::I64(a / b)
        }
        _ => return None,
    })
}

fn fold_binary_f64(op: FuncOp, a: f64, b: f64) -> Option<ConstVal> {
    Some(match op {
        FuncOp::Add => ConstVal::F64(a + b),
        FuncOp::Sub => ConstVal::F64(a - b),
        FuncOp::Mul => ConstVal::F64(a * b),
        FuncOp::Div => {
            if b == 0.0 {
                return None;
            }
            ConstVal::F64(a / b)
        }
        _ => return None,
    })
}

/// Evaluate constant subtrees. Anything that cannot be folded (including
/// division by zero) is left untouched.
pub fn constant_fold(expr: Expr) -> Expr {
    let Expr::Func { op, args } = expr else {
        return expr;
    };
    let args: Vec<Expr> = args.into_iter().map(constant_fold).collect();

    if args.len() == 2 {
        if let (Expr::Const(a), Expr::Const(b)) = (&args[0], &args[1]) {
            let folded = match op {
                FuncOp::Add | FuncOp::Sub | FuncOp::Mul | FuncOp::Div => {
                    if let (ConstVal::I64(x), ConstVal::I64(y)) = (a, b) {
                        fold_binary_i64(op, *x, *y)
                    } else {
                        match (a.to_f64(), b.to_f64()) {
                            (Some(x), Some(y)) => fold_binary_f64(op, x, y),
                            _ => None,
                        }
                    }
                }
                FuncOp::Eq | FuncOp::Ne | FuncOp::Gt | FuncOp::Ge | FuncOp::Lt | FuncOp::Le => {
                    match (a.to_f64(), b.to_f64()) {
                        (Some(x), Some(y)) => Some(ConstVal::Bool(match op {
                            FuncOp::Eq => x == y,
                            FuncOp::Ne => x != y,
                            FuncOp::Gt => x > y,
                            FuncOp::Ge => x >= y,
                            FuncOp::Lt => x < y,
                            FuncOp::Le => x <= y,
                            _ => unreachable!(),
                        })),
                        _ => None,
                    }
                }
                FuncOp::And | FuncOp::Or => {
                    if let (ConstVal::Bool(x), ConstVal::Bool(y)) = (a, b) {
                        Some(ConstVal::Bool(match op {
                            FuncOp::And => *x && *y,
                            _ => *x || *y,
                        }))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(value) = folded {
                return Expr::Const(value);
            }
        }
    }
    if op == FuncOp::Not && args.len() == 1 {
        if let Expr::Const(ConstVal::Bool(v)) = &args[0] {
            return Expr::Const(ConstVal::Bool(!v));
        }
    }
    Expr::Func { op, args }
}

/// Fold a list of conjuncts into one nested AND.
pub fn and_join(mut exprs: Vec<Expr>) -> Option<Expr> {
    let first = match exprs.is_empty() {
        true => return None,
        false => exprs.remove(0),
    };
    Some(exprs.into_iter().fold(first, Expr::and))
}

/// Partition filters into the monotonic conjunction (usable by zone-map
/// pruning) and the rest.
pub fn split_by_monotonic(filters: &[Expr]) -> (Option<Expr>, Option<Expr>) {
    let (mono, non_mono): (Vec<Expr>, Vec<Expr>) =
        filters.iter().cloned().partition(Expr::is_monotonic);
    (and_join(mono), and_join(non_mono))
}

/// Whether two conjuncts form a range over the same column, e.g.
/// `a > 1 and a < 10`.
pub fn can_merge_to_between_and(a: &Expr, b: &Expr) -> bool {
    let (Some((col_a, op_a, _)), Some((col_b, op_b, _))) =
        (a.check_strict_filter(), b.check_strict_filter())
    else {
        return false;
    };
    if col_a.name != col_b.name {
        return false;
    }
    let lower = |op: FuncOp| matches!(op, FuncOp::Gt | FuncOp::Ge);
    let upper = |op: FuncOp| matches!(op, FuncOp::Lt | FuncOp::Le);
    (lower(op_a) && upper(op_b)) || (upper(op_a) && lower(op_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col() -> Expr {
        Expr::col("a", DataType::Int64)
    }

    #[test]
    fn test_monotonic_shapes() {
        assert!(Expr::cmp(FuncOp::Eq, col(), ConstVal::I64(1)).is_monotonic());
        assert!(Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(1)).is_monotonic());
        assert!(Expr::and(
            Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(1)),
            Expr::cmp(FuncOp::Lt, col(), ConstVal::I64(9)),
        )
        .is_monotonic());
        assert!(!Expr::cmp(FuncOp::Like, col(), ConstVal::Str("a%".into())).is_monotonic());
        assert!(!Expr::cmp(FuncOp::Ne, col(), ConstVal::I64(1)).is_monotonic());
        assert!(
            !Expr::func(FuncOp::In, vec![col(), Expr::Const(ConstVal::I64(1))]).is_monotonic()
        );
    }

    #[test]
    fn test_check_filter_single_column() {
        let e = Expr::cmp(FuncOp::Eq, col(), ConstVal::I64(5));
        assert_eq!(e.check_filter().unwrap().name, "a");

        // two columns: not estimable
        let two = Expr::func(
            FuncOp::Eq,
            vec![col(), Expr::col("b", DataType::Int64)],
        );
        assert!(two.check_filter().is_none());

        // not a comparison
        assert!(col().check_filter().is_none());
    }

    #[test]
    fn test_check_strict_filter() {
        let e = Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(50));
        let (c, op, v) = e.check_strict_filter().unwrap();
        assert_eq!(c.name, "a");
        assert_eq!(op, FuncOp::Gt);
        assert_eq!(v, 50.0);

        let s = Expr::cmp(FuncOp::Gt, col(), ConstVal::Str("x".into()));
        assert!(s.check_strict_filter().is_none());

        // function-wrapped column is not strict
        let wrapped = Expr::func(
            FuncOp::Gt,
            vec![
                Expr::func(FuncOp::Year, vec![col()]),
                Expr::Const(ConstVal::I64(2020)),
            ],
        );
        assert!(wrapped.check_strict_filter().is_none());
    }

    #[test]
    fn test_constant_fold_arithmetic() {
        let e = Expr::func(
            FuncOp::Add,
            vec![
                Expr::Const(ConstVal::I64(2)),
                Expr::Const(ConstVal::I64(3)),
            ],
        );
        assert_eq!(constant_fold(e), Expr::Const(ConstVal::I64(5)));

        // nested: a > (2 * 5) folds the right side only
        let e = Expr::func(
            FuncOp::Gt,
            vec![
                col(),
                Expr::func(
                    FuncOp::Mul,
                    vec![
                        Expr::Const(ConstVal::I64(2)),
                        Expr::Const(ConstVal::I64(5)),
                    ],
                ),
            ],
        );
        assert_eq!(
            constant_fold(e),
            Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(10))
        );
    }

    #[test]
    fn test_constant_fold_comparison_and_bool() {
        let e = Expr::func(
            FuncOp::Lt,
            vec![
                Expr::Const(ConstVal::I64(1)),
                Expr::Const(ConstVal::I64(2)),
            ],
        );
        assert_eq!(constant_fold(e), Expr::Const(ConstVal::Bool(true)));

        let e = Expr::and(
            Expr::Const(ConstVal::Bool(true)),
            Expr::Const(ConstVal::Bool(false)),
        );
        assert_eq!(constant_fold(e), Expr::Const(ConstVal::Bool(false)));
    }

    #[test]
    fn test_constant_fold_div_by_zero_left_alone() {
        let e = Expr::func(
            FuncOp::Div,
            vec![
                Expr::Const(ConstVal::I64(1)),
                Expr::Const(ConstVal::I64(0)),
            ],
        );
        let folded = constant_fold(e.clone());
        assert_eq!(folded, e);
    }

    #[test]
    fn test_split_by_monotonic() {
        let mono = Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(1));
        let non_mono = Expr::cmp(FuncOp::Like, col(), ConstVal::Str("x%".into()));
        let (m, n) = split_by_monotonic(&[mono.clone(), non_mono.clone()]);
        assert_eq!(m, Some(mono.clone()));
        assert_eq!(n, Some(non_mono));

        let (m, n) = split_by_monotonic(&[mono.clone()]);
        assert!(m.is_some());
        assert!(n.is_none());

        // two monotonic filters fold into one AND
        let second = Expr::cmp(FuncOp::Lt, col(), ConstVal::I64(10));
        let (m, _) = split_by_monotonic(&[mono.clone(), second.clone()]);
        assert_eq!(m, Some(Expr::and(mono, second)));
    }

    #[test]
    fn test_between_and_merge() {
        let lo = Expr::cmp(FuncOp::Gt, col(), ConstVal::I64(1));
        let hi = Expr::cmp(FuncOp::Le, col(), ConstVal::I64(10));
        assert!(can_merge_to_between_and(&lo, &hi));
        assert!(can_merge_to_between_and(&hi, &lo));

        let same_dir = Expr::cmp(FuncOp::Ge, col(), ConstVal::I64(5));
        assert!(!can_merge_to_between_and(&lo, &same_dir));

        let other_col = Expr::cmp(
            FuncOp::Lt,
            Expr::col("b", DataType::Int64),
            ConstVal::I64(10),
        );
        assert!(!can_merge_to_between_and(&lo, &other_col));
    }

    #[test]
    fn test_expr_data_types() {
        assert_eq!(
            Expr::cmp(FuncOp::Eq, col(), ConstVal::I64(1)).data_type(),
            DataType::Bool
        );
        assert_eq!(
            Expr::func(FuncOp::Year, vec![col()]).data_type(),
            DataType::Int64
        );
        assert_eq!(
            Expr::col("d", DataType::Decimal128).data_type(),
            DataType::Decimal128
        );
    }
}
