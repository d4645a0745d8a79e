//! Typed Columns and Batches
//!
//! The in-memory container the writer, merge task and tests operate on: a
//! `Column` is a typed value vector plus a null bitmap, a `Batch` is a
//! rectangle of equal-length columns.
//!
//! ## Binary Layout
//!
//! `marshal` produces the column's self-contained little-endian form:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ type tag (1 byte)                            │
//! │ row count (4 bytes)                          │
//! │ values                                       │
//! │  - fixed-width class: packed LE values       │
//! │  - byte class: per value u32 length ∥ bytes  │
//! │ null bitmap (word-packed, length-prefixed)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Rows masked null still carry a (default) value slot so fixed-width
//! decoding stays positional.

use std::collections::HashSet;

use bytes::{Buf, BufMut};

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::types::{DataType, Datum, StorageClass};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I128(Vec<i128>),
    Bytes(Vec<Vec<u8>>),
    Fixed16(Vec<[u8; 16]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    dtype: DataType,
    data: ColumnData,
    nulls: Bitmap,
}

impl Column {
    pub fn new(dtype: DataType) -> Self {
        let data = match dtype.storage_class() {
            StorageClass::Bool => ColumnData::Bool(Vec::new()),
            StorageClass::I8 => ColumnData::I8(Vec::new()),
            StorageClass::I16 => ColumnData::I16(Vec::new()),
            StorageClass::I32 => ColumnData::I32(Vec::new()),
            StorageClass::I64 => ColumnData::I64(Vec::new()),
            StorageClass::U8 => ColumnData::U8(Vec::new()),
            StorageClass::U16 => ColumnData::U16(Vec::new()),
            StorageClass::U32 => ColumnData::U32(Vec::new()),
            StorageClass::U64 => ColumnData::U64(Vec::new()),
            StorageClass::F32 => ColumnData::F32(Vec::new()),
            StorageClass::F64 => ColumnData::F64(Vec::new()),
            StorageClass::I128 => ColumnData::I128(Vec::new()),
            StorageClass::Bytes => ColumnData::Bytes(Vec::new()),
            StorageClass::Fixed16 => ColumnData::Fixed16(Vec::new()),
        };
        Self {
            dtype,
            data,
            nulls: Bitmap::new(),
        }
    }

    pub fn int64(values: Vec<i64>) -> Self {
        Self {
            dtype: DataType::Int64,
            data: ColumnData::I64(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn int32(values: Vec<i32>) -> Self {
        Self {
            dtype: DataType::Int32,
            data: ColumnData::I32(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn uint64(values: Vec<u64>) -> Self {
        Self {
            dtype: DataType::UInt64,
            data: ColumnData::U64(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn float64(values: Vec<f64>) -> Self {
        Self {
            dtype: DataType::Float64,
            data: ColumnData::F64(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn date(values: Vec<i32>) -> Self {
        Self {
            dtype: DataType::Date,
            data: ColumnData::I32(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn utf8<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            dtype: DataType::Varchar,
            data: ColumnData::Bytes(
                values
                    .into_iter()
                    .map(|s| s.as_ref().as_bytes().to_vec())
                    .collect(),
            ),
            nulls: Bitmap::new(),
        }
    }

    pub fn row_ids(values: Vec<[u8; 16]>) -> Self {
        Self {
            dtype: DataType::RowId,
            data: ColumnData::Fixed16(values),
            nulls: Bitmap::new(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.dtype
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Bool(v) => v.len(),
            ColumnData::I8(v) => v.len(),
            ColumnData::I16(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::U8(v) => v.len(),
            ColumnData::U16(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::U64(v) => v.len(),
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::I128(v) => v.len(),
            ColumnData::Bytes(v) => v.len(),
            ColumnData::Fixed16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nulls.contains(i as u32)
    }

    pub fn null_count(&self) -> usize {
        self.nulls.cardinality()
    }

    pub fn nulls(&self) -> &Bitmap {
        &self.nulls
    }

    /// The stored value at `i`, ignoring the null mask.
    pub fn value(&self, i: usize) -> Datum {
        match &self.data {
            ColumnData::Bool(v) => Datum::Bool(v[i]),
            ColumnData::I8(v) => Datum::I8(v[i]),
            ColumnData::I16(v) => Datum::I16(v[i]),
            ColumnData::I32(v) => Datum::I32(v[i]),
            ColumnData::I64(v) => Datum::I64(v[i]),
            ColumnData::U8(v) => Datum::U8(v[i]),
            ColumnData::U16(v) => Datum::U16(v[i]),
            ColumnData::U32(v) => Datum::U32(v[i]),
            ColumnData::U64(v) => Datum::U64(v[i]),
            ColumnData::F32(v) => Datum::F32(v[i]),
            ColumnData::F64(v) => Datum::F64(v[i]),
            ColumnData::I128(v) => Datum::I128(v[i]),
            ColumnData::Bytes(v) => Datum::Bytes(v[i].clone()),
            ColumnData::Fixed16(v) => Datum::Fixed16(v[i]),
        }
    }

    /// The value at `i`, `None` when masked null.
    pub fn datum(&self, i: usize) -> Option<Datum> {
        if self.is_null(i) {
            None
        } else {
            Some(self.value(i))
        }
    }

    pub fn append(&mut self, value: Option<Datum>) {
        let row = self.len() as u32;
        match value {
            Some(d) => self.push_value(d),
            None => {
                self.push_default();
                self.nulls.set(row);
            }
        }
    }

    fn push_value(&mut self, d: Datum) {
        match (&mut self.data, d) {
            (ColumnData::Bool(v), Datum::Bool(x)) => v.push(x),
            (ColumnData::I8(v), Datum::I8(x)) => v.push(x),
            (ColumnData::I16(v), Datum::I16(x)) => v.push(x),
            (ColumnData::I32(v), Datum::I32(x)) => v.push(x),
            (ColumnData::I64(v), Datum::I64(x)) => v.push(x),
            (ColumnData::U8(v), Datum::U8(x)) => v.push(x),
            (ColumnData::U16(v), Datum::U16(x)) => v.push(x),
            (ColumnData::U32(v), Datum::U32(x)) => v.push(x),
            (ColumnData::U64(v), Datum::U64(x)) => v.push(x),
            (ColumnData::F32(v), Datum::F32(x)) => v.push(x),
            (ColumnData::F64(v), Datum::F64(x)) => v.push(x),
            (ColumnData::I128(v), Datum::I128(x)) => v.push(x),
            (ColumnData::Bytes(v), Datum::Bytes(x)) => v.push(x),
            (ColumnData::Fixed16(v), Datum::Fixed16(x)) => v.push(x),
            (_, d) => panic!("datum {d:?} does not match column type {:?}", self.dtype),
        }
    }

    fn push_default(&mut self) {
        match &mut self.data {
            ColumnData::Bool(v) => v.push(false),
            ColumnData::I8(v) => v.push(0),
            ColumnData::I16(v) => v.push(0),
            ColumnData::I32(v) => v.push(0),
            ColumnData::I64(v) => v.push(0),
            ColumnData::U8(v) => v.push(0),
            ColumnData::U16(v) => v.push(0),
            ColumnData::U32(v) => v.push(0),
            ColumnData::U64(v) => v.push(0),
            ColumnData::F32(v) => v.push(0.0),
            ColumnData::F64(v) => v.push(0.0),
            ColumnData::I128(v) => v.push(0),
            ColumnData::Bytes(v) => v.push(Vec::new()),
            ColumnData::Fixed16(v) => v.push([0u8; 16]),
        }
    }

    /// Build a new column from rows of `self` selected by `idx`, in order.
    pub fn gather(&self, idx: &[u32]) -> Column {
        let mut out = Column::new(self.dtype);
        for &i in idx {
            out.append(self.datum(i as usize));
        }
        out
    }

    /// A copy of the rows `[offset, offset + len)`.
    pub fn window(&self, offset: usize, len: usize) -> Column {
        let mut out = Column::new(self.dtype);
        for i in offset..offset + len {
            out.append(self.datum(i));
        }
        out
    }

    /// Drop every row whose position is set in `deletes`.
    pub fn filter_deletes(&self, deletes: &Bitmap) -> Column {
        if deletes.is_empty() {
            return self.clone();
        }
        let mut out = Column::new(self.dtype);
        for i in 0..self.len() {
            if !deletes.contains(i as u32) {
                out.append(self.datum(i));
            }
        }
        out
    }

    /// Min and max over non-null rows, `None` when every row is null (or
    /// the column is empty).
    pub fn min_max(&self) -> Option<(Datum, Datum)> {
        let mut acc: Option<(Datum, Datum)> = None;
        for i in 0..self.len() {
            let Some(d) = self.datum(i) else { continue };
            acc = Some(match acc {
                None => (d.clone(), d),
                Some((lo, hi)) => {
                    let lo = if d.cmp_total(&lo).is_lt() { d.clone() } else { lo };
                    let hi = if d.cmp_total(&hi).is_gt() { d } else { hi };
                    (lo, hi)
                }
            });
        }
        acc
    }

    /// Exact distinct count of non-null values. Object-level NDVs are sums
    /// of these per block, later clamped by the stats derivation.
    pub fn distinct_count(&self) -> usize {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut scratch = Vec::new();
        for i in 0..self.len() {
            let Some(d) = self.datum(i) else { continue };
            scratch.clear();
            d.encode_into(&mut scratch);
            if !seen.contains(scratch.as_slice()) {
                seen.insert(scratch.clone());
            }
        }
        seen.len()
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.dtype.to_u8());
        buf.put_u32_le(self.len() as u32);
        match &self.data {
            ColumnData::Bool(v) => {
                for x in v {
                    buf.put_u8(u8::from(*x));
                }
            }
            ColumnData::I8(v) => {
                for x in v {
                    buf.put_i8(*x);
                }
            }
            ColumnData::I16(v) => {
                for x in v {
                    buf.put_i16_le(*x);
                }
            }
            ColumnData::I32(v) => {
                for x in v {
                    buf.put_i32_le(*x);
                }
            }
            ColumnData::I64(v) => {
                for x in v {
                    buf.put_i64_le(*x);
                }
            }
            ColumnData::U8(v) => buf.extend_from_slice(v),
            ColumnData::U16(v) => {
                for x in v {
                    buf.put_u16_le(*x);
                }
            }
            ColumnData::U32(v) => {
                for x in v {
                    buf.put_u32_le(*x);
                }
            }
            ColumnData::U64(v) => {
                for x in v {
                    buf.put_u64_le(*x);
                }
            }
            ColumnData::F32(v) => {
                for x in v {
                    buf.put_f32_le(*x);
                }
            }
            ColumnData::F64(v) => {
                for x in v {
                    buf.put_f64_le(*x);
                }
            }
            ColumnData::I128(v) => {
                for x in v {
                    buf.put_i128_le(*x);
                }
            }
            ColumnData::Bytes(v) => {
                for x in v {
                    buf.put_u32_le(x.len() as u32);
                    buf.extend_from_slice(x);
                }
            }
            ColumnData::Fixed16(v) => {
                for x in v {
                    buf.extend_from_slice(x);
                }
            }
        }
        self.nulls.marshal(buf);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < 5 {
            return Err(Error::InvalidData("truncated column header".to_string()));
        }
        let dtype = DataType::try_from_u8(buf.get_u8())?;
        let n = buf.get_u32_le() as usize;
        let need = |buf: &&[u8], bytes: usize| -> Result<()> {
            if buf.remaining() < bytes {
                Err(Error::InvalidData("truncated column values".to_string()))
            } else {
                Ok(())
            }
        };
        let data = match dtype.storage_class() {
            StorageClass::Bool => {
                need(buf, n)?;
                ColumnData::Bool((0..n).map(|_| buf.get_u8() != 0).collect())
            }
            StorageClass::I8 => {
                need(buf, n)?;
                ColumnData::I8((0..n).map(|_| buf.get_i8()).collect())
            }
            StorageClass::I16 => {
                need(buf, n * 2)?;
                ColumnData::I16((0..n).map(|_| buf.get_i16_le()).collect())
            }
            StorageClass::I32 => {
                need(buf, n * 4)?;
                ColumnData::I32((0..n).map(|_| buf.get_i32_le()).collect())
            }
            StorageClass::I64 => {
                need(buf, n * 8)?;
                ColumnData::I64((0..n).map(|_| buf.get_i64_le()).collect())
            }
            StorageClass::U8 => {
                need(buf, n)?;
                ColumnData::U8((0..n).map(|_| buf.get_u8()).collect())
            }
            StorageClass::U16 => {
                need(buf, n * 2)?;
                ColumnData::U16((0..n).map(|_| buf.get_u16_le()).collect())
            }
            StorageClass::U32 => {
                need(buf, n * 4)?;
                ColumnData::U32((0..n).map(|_| buf.get_u32_le()).collect())
            }
            StorageClass::U64 => {
                need(buf, n * 8)?;
                ColumnData::U64((0..n).map(|_| buf.get_u64_le()).collect())
            }
            StorageClass::F32 => {
                need(buf, n * 4)?;
                ColumnData::F32((0..n).map(|_| buf.get_f32_le()).collect())
            }
            StorageClass::F64 => {
                need(buf, n * 8)?;
                ColumnData::F64((0..n).map(|_| buf.get_f64_le()).collect())
            }
            StorageClass::I128 => {
                need(buf, n * 16)?;
                ColumnData::I128((0..n).map(|_| buf.get_i128_le()).collect())
            }
            StorageClass::Bytes => {
                let mut values = Vec::with_capacity(n);
                for _ in 0..n {
                    need(buf, 4)?;
                    let len = buf.get_u32_le() as usize;
                    need(buf, len)?;
                    let mut value = vec![0u8; len];
                    buf.copy_to_slice(&mut value);
                    values.push(value);
                }
                ColumnData::Bytes(values)
            }
            StorageClass::Fixed16 => {
                need(buf, n * 16)?;
                ColumnData::Fixed16(
                    (0..n)
                        .map(|_| {
                            let mut value = [0u8; 16];
                            buf.copy_to_slice(&mut value);
                            value
                        })
                        .collect(),
                )
            }
        };
        let nulls = Bitmap::unmarshal(buf)?;
        Ok(Self {
            dtype,
            data,
            nulls,
        })
    }
}

/// A rectangle of equal-length columns.
///
/// The row count of a batch is the length of its FIRST column; a batch with
/// shorter or longer trailing columns is malformed but tolerated (the
/// writer logs the mismatch and trusts column zero).
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub attrs: Vec<String>,
    pub columns: Vec<Column>,
}

impl Batch {
    pub fn new(attrs: Vec<String>, columns: Vec<Column>) -> Self {
        Self { attrs, columns }
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        let attrs = (0..columns.len()).map(|i| format!("col{i}")).collect();
        Self { attrs, columns }
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Construction and access
    // ---------------------------------------------------------------

    #[test]
    fn test_int64_column_basics() {
        let col = Column::int64(vec![3, 1, 2]);
        assert_eq!(col.len(), 3);
        assert_eq!(col.data_type(), DataType::Int64);
        assert_eq!(col.datum(1), Some(Datum::I64(1)));
        assert_eq!(col.null_count(), 0);
    }

    #[test]
    fn test_append_with_nulls() {
        let mut col = Column::new(DataType::Int32);
        col.append(Some(Datum::I32(7)));
        col.append(None);
        col.append(Some(Datum::I32(9)));
        assert_eq!(col.len(), 3);
        assert_eq!(col.null_count(), 1);
        assert!(col.is_null(1));
        assert_eq!(col.datum(1), None);
        assert_eq!(col.datum(2), Some(Datum::I32(9)));
    }

    #[test]
    #[should_panic]
    fn test_append_wrong_type_panics() {
        let mut col = Column::new(DataType::Int32);
        col.append(Some(Datum::I64(1)));
    }

    // ---------------------------------------------------------------
    // Gather / window / deletes
    // ---------------------------------------------------------------

    #[test]
    fn test_gather() {
        let col = Column::utf8(["a", "b", "c", "d"]);
        let out = col.gather(&[3, 0, 2]);
        assert_eq!(out.datum(0), Some(Datum::Bytes(b"d".to_vec())));
        assert_eq!(out.datum(1), Some(Datum::Bytes(b"a".to_vec())));
        assert_eq!(out.datum(2), Some(Datum::Bytes(b"c".to_vec())));
    }

    #[test]
    fn test_window() {
        let col = Column::int64(vec![10, 20, 30, 40]);
        let w = col.window(1, 2);
        assert_eq!(w.len(), 2);
        assert_eq!(w.datum(0), Some(Datum::I64(20)));
        assert_eq!(w.datum(1), Some(Datum::I64(30)));
    }

    #[test]
    fn test_filter_deletes() {
        let col = Column::int64(vec![1, 2, 3, 4, 5]);
        let deletes = Bitmap::from_iter([1, 3]);
        let out = col.filter_deletes(&deletes);
        assert_eq!(out.len(), 3);
        assert_eq!(out.datum(0), Some(Datum::I64(1)));
        assert_eq!(out.datum(1), Some(Datum::I64(3)));
        assert_eq!(out.datum(2), Some(Datum::I64(5)));
    }

    #[test]
    fn test_filter_deletes_preserves_nulls() {
        let mut col = Column::new(DataType::Int64);
        col.append(Some(Datum::I64(1)));
        col.append(None);
        col.append(Some(Datum::I64(3)));
        let out = col.filter_deletes(&Bitmap::from_iter([0]));
        assert_eq!(out.len(), 2);
        assert!(out.is_null(0));
        assert_eq!(out.datum(1), Some(Datum::I64(3)));
    }

    // ---------------------------------------------------------------
    // Min/max and distinct
    // ---------------------------------------------------------------

    #[test]
    fn test_min_max_ints() {
        let col = Column::int64(vec![5, -2, 9, 0]);
        let (lo, hi) = col.min_max().unwrap();
        assert_eq!(lo, Datum::I64(-2));
        assert_eq!(hi, Datum::I64(9));
    }

    #[test]
    fn test_min_max_skips_nulls() {
        let mut col = Column::new(DataType::Int64);
        col.append(None);
        col.append(Some(Datum::I64(4)));
        col.append(None);
        let (lo, hi) = col.min_max().unwrap();
        assert_eq!(lo, Datum::I64(4));
        assert_eq!(hi, Datum::I64(4));
    }

    #[test]
    fn test_min_max_all_null_is_none() {
        let mut col = Column::new(DataType::Int64);
        col.append(None);
        assert!(col.min_max().is_none());
        assert!(Column::new(DataType::Int64).min_max().is_none());
    }

    #[test]
    fn test_min_max_strings() {
        let col = Column::utf8(["pear", "apple", "zebra"]);
        let (lo, hi) = col.min_max().unwrap();
        assert_eq!(lo, Datum::Bytes(b"apple".to_vec()));
        assert_eq!(hi, Datum::Bytes(b"zebra".to_vec()));
    }

    #[test]
    fn test_distinct_count() {
        let col = Column::int64(vec![1, 2, 2, 3, 3, 3]);
        assert_eq!(col.distinct_count(), 3);
        let mut with_nulls = Column::new(DataType::Int32);
        with_nulls.append(Some(Datum::I32(1)));
        with_nulls.append(None);
        with_nulls.append(Some(Datum::I32(1)));
        assert_eq!(with_nulls.distinct_count(), 1);
    }

    // ---------------------------------------------------------------
    // Marshal round-trips
    // ---------------------------------------------------------------

    #[test]
    fn test_marshal_roundtrip_fixed() {
        let col = Column::int64(vec![i64::MIN, -1, 0, 1, i64::MAX]);
        let mut buf = Vec::new();
        col.marshal(&mut buf);
        let restored = Column::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(col, restored);
    }

    #[test]
    fn test_marshal_roundtrip_varlen_with_nulls() {
        let mut col = Column::new(DataType::Varchar);
        col.append(Some(Datum::Bytes(b"hello".to_vec())));
        col.append(None);
        col.append(Some(Datum::Bytes(Vec::new())));
        let mut buf = Vec::new();
        col.marshal(&mut buf);
        let restored = Column::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(col, restored);
        assert!(restored.is_null(1));
    }

    #[test]
    fn test_marshal_roundtrip_float_and_date() {
        let col = Column::float64(vec![1.5, -0.25]);
        let mut buf = Vec::new();
        col.marshal(&mut buf);
        assert_eq!(Column::unmarshal(&mut buf.as_slice()).unwrap(), col);

        let col = Column::date(vec![19000, 19001]);
        let mut buf = Vec::new();
        col.marshal(&mut buf);
        let restored = Column::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.data_type(), DataType::Date);
        assert_eq!(restored, col);
    }

    #[test]
    fn test_unmarshal_truncated_is_error() {
        let col = Column::int64(vec![1, 2, 3]);
        let mut buf = Vec::new();
        col.marshal(&mut buf);
        assert!(Column::unmarshal(&mut &buf[..buf.len() - 10]).is_err());
        assert!(Column::unmarshal(&mut &buf[..3]).is_err());
    }

    // ---------------------------------------------------------------
    // Batch
    // ---------------------------------------------------------------

    #[test]
    fn test_batch_rows_is_first_column() {
        let batch = Batch::from_columns(vec![
            Column::int64(vec![1, 2, 3]),
            Column::utf8(["a", "b"]),
        ]);
        assert_eq!(batch.rows(), 3);
        assert_eq!(batch.column_count(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::default();
        assert_eq!(batch.rows(), 0);
        assert_eq!(batch.column_count(), 0);
    }
}
