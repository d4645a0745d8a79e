//! Zone Maps
//!
//! A zone map is a fixed-width `{min, max, init}` summary of one column
//! over one block (or, aggregated, over a whole object). The buffer is
//! `ZM_WIDTH` bytes for every type: a 30-byte min half, a 30-byte max half,
//! an init flag and reserved padding. Fixed-width types occupy a
//! type-specific little-endian prefix of each half; variable-length values
//! are truncated to the half width, which can only widen the range and is
//! therefore safe for pruning.
//!
//! Zone maps are immutable once their block is written; `merge` exists for
//! building object-level and table-level aggregates from block maps.

use std::cmp::Ordering;

use quarry_core::column::Column;
use quarry_core::types::{DataType, Datum, StorageClass};

use crate::error::{Error, Result};

/// Serialized width of a zone map, same for every type.
pub const ZM_WIDTH: usize = 64;

/// Width of each of the min and max halves.
pub const ZM_HALF: usize = 30;

const INIT_FLAG_OFFSET: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneMap {
    dtype: DataType,
    data: [u8; ZM_WIDTH],
}

fn encode_half(d: &Datum) -> [u8; ZM_HALF] {
    let mut scratch = Vec::with_capacity(ZM_HALF);
    d.encode_into(&mut scratch);
    let mut half = [0u8; ZM_HALF];
    let n = scratch.len().min(ZM_HALF);
    half[..n].copy_from_slice(&scratch[..n]);
    half
}

fn cmp_halves(dtype: DataType, a: &[u8], b: &[u8]) -> Ordering {
    match dtype.storage_class() {
        StorageClass::Bool | StorageClass::U8 => a[0].cmp(&b[0]),
        StorageClass::I8 => (a[0] as i8).cmp(&(b[0] as i8)),
        StorageClass::I16 => i16::from_le_bytes(a[..2].try_into().unwrap())
            .cmp(&i16::from_le_bytes(b[..2].try_into().unwrap())),
        StorageClass::I32 => i32::from_le_bytes(a[..4].try_into().unwrap())
            .cmp(&i32::from_le_bytes(b[..4].try_into().unwrap())),
        StorageClass::I64 => i64::from_le_bytes(a[..8].try_into().unwrap())
            .cmp(&i64::from_le_bytes(b[..8].try_into().unwrap())),
        StorageClass::U16 => u16::from_le_bytes(a[..2].try_into().unwrap())
            .cmp(&u16::from_le_bytes(b[..2].try_into().unwrap())),
        StorageClass::U32 => u32::from_le_bytes(a[..4].try_into().unwrap())
            .cmp(&u32::from_le_bytes(b[..4].try_into().unwrap())),
        StorageClass::U64 => u64::from_le_bytes(a[..8].try_into().unwrap())
            .cmp(&u64::from_le_bytes(b[..8].try_into().unwrap())),
        StorageClass::F32 => f32::from_le_bytes(a[..4].try_into().unwrap())
            .total_cmp(&f32::from_le_bytes(b[..4].try_into().unwrap())),
        StorageClass::F64 => f64::from_le_bytes(a[..8].try_into().unwrap())
            .total_cmp(&f64::from_le_bytes(b[..8].try_into().unwrap())),
        StorageClass::I128 => i128::from_le_bytes(a[..16].try_into().unwrap())
            .cmp(&i128::from_le_bytes(b[..16].try_into().unwrap())),
        StorageClass::Bytes | StorageClass::Fixed16 => a.cmp(b),
    }
}

impl ZoneMap {
    pub fn new(dtype: DataType) -> Self {
        Self {
            dtype,
            data: [0u8; ZM_WIDTH],
        }
    }

    /// Summarize a column, skipping nulls. The map stays uninitialized when
    /// the column is empty or all null.
    pub fn from_column(col: &Column) -> Self {
        let mut zm = Self::new(col.data_type());
        if let Some((lo, hi)) = col.min_max() {
            zm.set_min(&lo);
            zm.set_max(&hi);
            zm.data[INIT_FLAG_OFFSET] = 1;
        }
        zm
    }

    pub fn data_type(&self) -> DataType {
        self.dtype
    }

    pub fn is_inited(&self) -> bool {
        self.data[INIT_FLAG_OFFSET] == 1
    }

    pub fn min_buf(&self) -> &[u8] {
        &self.data[..ZM_HALF]
    }

    pub fn max_buf(&self) -> &[u8] {
        &self.data[ZM_HALF..2 * ZM_HALF]
    }

    fn set_min(&mut self, d: &Datum) {
        let half = encode_half(d);
        self.data[..ZM_HALF].copy_from_slice(&half);
    }

    fn set_max(&mut self, d: &Datum) {
        let half = encode_half(d);
        self.data[ZM_HALF..2 * ZM_HALF].copy_from_slice(&half);
    }

    /// Widen the range to include `d`.
    pub fn update(&mut self, d: &Datum) {
        let half = encode_half(d);
        self.update_buf(&half);
    }

    /// Widen the range to include an already-encoded value buffer.
    pub fn update_buf(&mut self, half: &[u8]) {
        debug_assert_eq!(half.len(), ZM_HALF);
        if !self.is_inited() {
            self.data[..ZM_HALF].copy_from_slice(half);
            self.data[ZM_HALF..2 * ZM_HALF].copy_from_slice(half);
            self.data[INIT_FLAG_OFFSET] = 1;
            return;
        }
        if cmp_halves(self.dtype, half, self.min_buf()) == Ordering::Less {
            self.data[..ZM_HALF].copy_from_slice(half);
        }
        if cmp_halves(self.dtype, half, self.max_buf()) == Ordering::Greater {
            self.data[ZM_HALF..2 * ZM_HALF].copy_from_slice(half);
        }
    }

    /// Widen this map by another map's min and max.
    pub fn merge(&mut self, other: &ZoneMap) {
        if !other.is_inited() {
            return;
        }
        let mut min = [0u8; ZM_HALF];
        min.copy_from_slice(other.min_buf());
        let mut max = [0u8; ZM_HALF];
        max.copy_from_slice(other.max_buf());
        self.update_buf(&max);
        self.update_buf(&min);
    }

    fn decode_half_f64(&self, half: &[u8]) -> Option<f64> {
        if !self.is_inited() || !self.dtype.is_ordered() {
            return None;
        }
        Some(match self.dtype.storage_class() {
            StorageClass::I8 => half[0] as i8 as f64,
            StorageClass::I16 => i16::from_le_bytes(half[..2].try_into().unwrap()) as f64,
            StorageClass::I32 => i32::from_le_bytes(half[..4].try_into().unwrap()) as f64,
            StorageClass::I64 => i64::from_le_bytes(half[..8].try_into().unwrap()) as f64,
            StorageClass::U8 => half[0] as f64,
            StorageClass::U16 => u16::from_le_bytes(half[..2].try_into().unwrap()) as f64,
            StorageClass::U32 => u32::from_le_bytes(half[..4].try_into().unwrap()) as f64,
            StorageClass::U64 => u64::from_le_bytes(half[..8].try_into().unwrap()) as f64,
            StorageClass::F32 => f32::from_le_bytes(half[..4].try_into().unwrap()) as f64,
            StorageClass::F64 => f64::from_le_bytes(half[..8].try_into().unwrap()),
            _ => return None,
        })
    }

    /// Numeric view of the min bound; `None` when uninitialized or the type
    /// has no meaningful numeric order.
    pub fn min_f64(&self) -> Option<f64> {
        self.decode_half_f64(&self.data[..ZM_HALF])
    }

    pub fn max_f64(&self) -> Option<f64> {
        self.decode_half_f64(&self.data[ZM_HALF..2 * ZM_HALF])
    }

    // Pruning predicates. Each answers "may a row in this zone satisfy the
    // comparison" and degrades to true when there is no information.

    pub fn may_eq(&self, v: f64) -> bool {
        match (self.min_f64(), self.max_f64()) {
            (Some(min), Some(max)) => min <= v && v <= max,
            _ => true,
        }
    }

    pub fn may_gt(&self, v: f64) -> bool {
        self.max_f64().map(|max| max > v).unwrap_or(true)
    }

    pub fn may_ge(&self, v: f64) -> bool {
        self.max_f64().map(|max| max >= v).unwrap_or(true)
    }

    pub fn may_lt(&self, v: f64) -> bool {
        self.min_f64().map(|min| min < v).unwrap_or(true)
    }

    pub fn may_le(&self, v: f64) -> bool {
        self.min_f64().map(|min| min <= v).unwrap_or(true)
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.data);
    }

    pub fn unmarshal(dtype: DataType, buf: &mut &[u8]) -> Result<Self> {
        if buf.len() < ZM_WIDTH {
            return Err(Error::InvalidObject("truncated zone map".to_string()));
        }
        let mut data = [0u8; ZM_WIDTH];
        data.copy_from_slice(&buf[..ZM_WIDTH]);
        *buf = &buf[ZM_WIDTH..];
        Ok(Self { dtype, data })
    }
}
