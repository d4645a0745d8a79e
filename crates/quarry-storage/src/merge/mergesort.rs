//! Merge-Sort Kernels for Compaction
//!
//! Three column-level operations shared by the merge-blocks task:
//!
//! - `merge_sorted_column`: order every row of the per-block sort-key
//!   columns into output-block shards, producing the global `sorted_idx`
//!   (source position per output position) and `mapping` (source position
//!   → output position)
//! - `shuffle_column`: gather any other column into output shards aligned
//!   with the sort column's layout
//! - `reshape`: concatenate and re-split without reordering, for tables
//!   with no declared sort key
//!
//! Positions are global: block-local rows offset by the block's prefix sum
//! in `from_layout` (inputs) or `to_layout` (outputs). Nulls sort first;
//! ties keep source order, so the merge is stable and deterministic.

use std::cmp::Ordering;

use quarry_core::column::Column;
use quarry_core::types::Datum;

fn prefix_sums(layout: &[u32]) -> Vec<u32> {
    let mut bases = Vec::with_capacity(layout.len());
    let mut acc = 0u32;
    for n in layout {
        bases.push(acc);
        acc += n;
    }
    bases
}

fn locate(bases: &[u32], global: u32) -> (usize, usize) {
    // layouts are short; a linear scan beats a binary search here
    let mut col = 0;
    for (i, base) in bases.iter().enumerate() {
        if global >= *base {
            col = i;
        } else {
            break;
        }
    }
    (col, (global - bases[col]) as usize)
}

fn split_to_layout(merged: &Column, to_layout: &[u32]) -> Vec<Column> {
    let mut out = Vec::with_capacity(to_layout.len());
    let mut offset = 0usize;
    for n in to_layout {
        out.push(merged.window(offset, *n as usize));
        offset += *n as usize;
    }
    out
}

fn cmp_keys(a: &Option<Datum>, b: &Option<Datum>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp_total(y),
    }
}

/// Order the sort-key rows of all input blocks into `to_layout`-shaped
/// shards.
///
/// On return `sorted_idx[pos]` is the global source position of output
/// position `pos`, and the returned mapping places each global source
/// position at its output position.
pub fn merge_sorted_column(
    columns: &[Column],
    sorted_idx: &mut Vec<u32>,
    from_layout: &[u32],
    to_layout: &[u32],
) -> (Vec<Column>, Vec<u32>) {
    let total: u32 = from_layout.iter().sum();
    debug_assert_eq!(total, to_layout.iter().sum::<u32>());

    let mut keys: Vec<Option<Datum>> = Vec::with_capacity(total as usize);
    for column in columns {
        for i in 0..column.len() {
            keys.push(column.datum(i));
        }
    }

    sorted_idx.clear();
    sorted_idx.extend(0..total);
    sorted_idx.sort_by(|a, b| {
        cmp_keys(&keys[*a as usize], &keys[*b as usize]).then_with(|| a.cmp(b))
    });

    let mut mapping = vec![0u32; total as usize];
    let dtype = columns
        .first()
        .map(Column::data_type)
        .unwrap_or(quarry_core::DataType::Any);
    let mut merged = Column::new(dtype);
    for (pos, src) in sorted_idx.iter().enumerate() {
        mapping[*src as usize] = pos as u32;
        merged.append(keys[*src as usize].clone());
    }

    (split_to_layout(&merged, to_layout), mapping)
}

/// Gather a non-sort column into output shards following `sorted_idx`.
pub fn shuffle_column(
    columns: &[Column],
    sorted_idx: &[u32],
    from_layout: &[u32],
    to_layout: &[u32],
) -> Vec<Column> {
    let bases = prefix_sums(from_layout);
    let dtype = columns
        .first()
        .map(Column::data_type)
        .unwrap_or(quarry_core::DataType::Any);
    let mut merged = Column::new(dtype);
    for src in sorted_idx {
        let (col, row) = locate(&bases, *src);
        merged.append(columns[col].datum(row));
    }
    split_to_layout(&merged, to_layout)
}

/// Concatenate without reordering and re-split into `to_layout` shards.
/// The caller's mapping for a reshape is the identity.
pub fn reshape(columns: &[Column], _from_layout: &[u32], to_layout: &[u32]) -> Vec<Column> {
    let dtype = columns
        .first()
        .map(Column::data_type)
        .unwrap_or(quarry_core::DataType::Any);
    let mut merged = Column::new(dtype);
    for column in columns {
        for i in 0..column.len() {
            merged.append(column.datum(i));
        }
    }
    split_to_layout(&merged, to_layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(col: &Column) -> Vec<i64> {
        (0..col.len())
            .map(|i| match col.datum(i) {
                Some(Datum::I64(v)) => v,
                other => panic!("unexpected datum {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_merge_two_sorted_blocks() {
        let a = Column::int64(vec![1, 2, 3]);
        let b = Column::int64(vec![4, 5, 6]);
        let mut sorted_idx = Vec::new();
        let (out, mapping) = merge_sorted_column(&[a, b], &mut sorted_idx, &[3, 3], &[6]);
        assert_eq!(out.len(), 1);
        assert_eq!(values(&out[0]), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(sorted_idx, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mapping, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_merge_unsorted_runs() {
        let a = Column::int64(vec![3, 1, 2]);
        let b = Column::int64(vec![6, 5, 4]);
        let mut sorted_idx = Vec::new();
        let (out, mapping) = merge_sorted_column(&[a, b], &mut sorted_idx, &[3, 3], &[6]);
        assert_eq!(values(&out[0]), vec![1, 2, 3, 4, 5, 6]);
        // source row → output index
        assert_eq!(mapping, vec![2, 0, 1, 5, 4, 3]);
        assert_eq!(sorted_idx, vec![1, 2, 0, 5, 4, 3]);
    }

    #[test]
    fn test_merge_interleaved() {
        let a = Column::int64(vec![1, 4, 7]);
        let b = Column::int64(vec![2, 5, 8]);
        let c = Column::int64(vec![3, 6, 9]);
        let mut sorted_idx = Vec::new();
        let (out, mapping) =
            merge_sorted_column(&[a, b, c], &mut sorted_idx, &[3, 3, 3], &[9]);
        assert_eq!(values(&out[0]), (1..=9).collect::<Vec<_>>());
        assert_eq!(mapping[0], 0);
        assert_eq!(mapping[3], 1);
        assert_eq!(mapping[8], 8);
        assert_eq!(sorted_idx[1], 3);
    }

    #[test]
    fn test_merge_splits_into_output_layout() {
        let a = Column::int64(vec![1, 3, 5, 7]);
        let b = Column::int64(vec![2, 4, 6, 8]);
        let mut sorted_idx = Vec::new();
        let (out, _) = merge_sorted_column(&[a, b], &mut sorted_idx, &[4, 4], &[3, 3, 2]);
        assert_eq!(out.len(), 3);
        assert_eq!(values(&out[0]), vec![1, 2, 3]);
        assert_eq!(values(&out[1]), vec![4, 5, 6]);
        assert_eq!(values(&out[2]), vec![7, 8]);
    }

    #[test]
    fn test_merge_stability_on_ties() {
        let a = Column::int64(vec![5, 5]);
        let b = Column::int64(vec![5]);
        let mut sorted_idx = Vec::new();
        let (_, mapping) = merge_sorted_column(&[a, b], &mut sorted_idx, &[2, 1], &[3]);
        // earlier source position wins ties
        assert_eq!(sorted_idx, vec![0, 1, 2]);
        assert_eq!(mapping, vec![0, 1, 2]);
    }

    #[test]
    fn test_nulls_sort_first() {
        let mut a = Column::new(quarry_core::DataType::Int64);
        a.append(Some(Datum::I64(3)));
        let mut b = Column::new(quarry_core::DataType::Int64);
        b.append(None);
        b.append(Some(Datum::I64(1)));
        let mut sorted_idx = Vec::new();
        let (out, _) = merge_sorted_column(&[a, b], &mut sorted_idx, &[1, 2], &[3]);
        assert!(out[0].is_null(0));
        assert_eq!(out[0].datum(1), Some(Datum::I64(1)));
        assert_eq!(out[0].datum(2), Some(Datum::I64(3)));
    }

    #[test]
    fn test_shuffle_follows_sort_order() {
        let a = Column::int64(vec![3]);
        let b = Column::int64(vec![1, 2]);
        let mut sorted_idx = Vec::new();
        let (out, _) = merge_sorted_column(&[a, b], &mut sorted_idx, &[1, 2], &[3]);
        assert_eq!(values(&out[0]), vec![1, 2, 3]);

        // payload columns aligned with the original runs
        let pay_a = Column::utf8(["c"]);
        let pay_b = Column::utf8(["a", "b"]);
        let shuffled = shuffle_column(&[pay_a, pay_b], &sorted_idx, &[1, 2], &[3]);
        assert_eq!(shuffled.len(), 1);
        assert_eq!(shuffled[0].datum(0), Some(Datum::Bytes(b"a".to_vec())));
        assert_eq!(shuffled[0].datum(1), Some(Datum::Bytes(b"b".to_vec())));
        assert_eq!(shuffled[0].datum(2), Some(Datum::Bytes(b"c".to_vec())));
    }

    #[test]
    fn test_reshape_concatenates() {
        let a = Column::int64(vec![9, 8]);
        let b = Column::int64(vec![7]);
        let out = reshape(&[a, b], &[2, 1], &[2, 1]);
        assert_eq!(values(&out[0]), vec![9, 8]);
        assert_eq!(values(&out[1]), vec![7]);
    }

    #[test]
    fn test_reshape_repartitions() {
        let a = Column::int64(vec![1, 2, 3, 4]);
        let b = Column::int64(vec![5, 6]);
        let out = reshape(&[a, b], &[4, 2], &[3, 3]);
        assert_eq!(values(&out[0]), vec![1, 2, 3]);
        assert_eq!(values(&out[1]), vec![4, 5, 6]);
    }
}
