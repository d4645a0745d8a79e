//! Physical Data Types
//!
//! This module defines the closed set of physical column types the storage
//! and planning layers understand, together with `Datum`, a single scalar
//! value of any supported type.
//!
//! ## Design
//!
//! Every type carries a stable one-byte tag that is written into column
//! metadata on disk. Decoding an unknown tag is an error, never a panic.
//! `Any` is the "no information" tag: a column must never reach the object
//! writer with it (that is a programmer error and aborts the process), but
//! readers and estimators treat it as "unknown" and degrade gracefully.
//!
//! Several logical types share a physical representation (`Date` is an i32,
//! `Datetime`/`Timestamp` are i64 ticks); `StorageClass` names that physical
//! representation and is what the column containers and zone maps dispatch
//! on.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One-byte physical type tag, stored in column metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum DataType {
    /// No type information. Never valid for written data.
    #[default]
    Any = 0,
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    UInt8 = 6,
    UInt16 = 7,
    UInt32 = 8,
    UInt64 = 9,
    Float32 = 10,
    Float64 = 11,
    Date = 12,
    Datetime = 13,
    Timestamp = 14,
    Decimal64 = 15,
    Decimal128 = 16,
    Char = 17,
    Varchar = 18,
    Text = 19,
    Json = 20,
    Uuid = 21,
    /// Physical-address column type. Always the last column of a schema and
    /// excluded from statistics.
    RowId = 22,
}

/// The physical representation a `DataType` is stored and compared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    I128,
    Bytes,
    Fixed16,
}

impl DataType {
    pub fn try_from_u8(tag: u8) -> Result<Self> {
        use DataType::*;
        Ok(match tag {
            0 => Any,
            1 => Bool,
            2 => Int8,
            3 => Int16,
            4 => Int32,
            5 => Int64,
            6 => UInt8,
            7 => UInt16,
            8 => UInt32,
            9 => UInt64,
            10 => Float32,
            11 => Float64,
            12 => Date,
            13 => Datetime,
            14 => Timestamp,
            15 => Decimal64,
            16 => Decimal128,
            17 => Char,
            18 => Varchar,
            19 => Text,
            20 => Json,
            21 => Uuid,
            22 => RowId,
            other => return Err(Error::InvalidTypeTag(other)),
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn storage_class(self) -> StorageClass {
        use DataType::*;
        match self {
            Bool => StorageClass::Bool,
            Int8 => StorageClass::I8,
            Int16 => StorageClass::I16,
            Int32 | Date => StorageClass::I32,
            Int64 | Datetime | Timestamp | Decimal64 => StorageClass::I64,
            UInt8 => StorageClass::U8,
            UInt16 => StorageClass::U16,
            UInt32 => StorageClass::U32,
            UInt64 => StorageClass::U64,
            Float32 => StorageClass::F32,
            Float64 => StorageClass::F64,
            Decimal128 => StorageClass::I128,
            Char | Varchar | Text | Json => StorageClass::Bytes,
            Uuid | RowId => StorageClass::Fixed16,
            // Any has no representation; containers reject it before here.
            Any => StorageClass::Bytes,
        }
    }

    /// Fixed encoded width in bytes, `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self.storage_class() {
            StorageClass::Bool | StorageClass::I8 | StorageClass::U8 => Some(1),
            StorageClass::I16 | StorageClass::U16 => Some(2),
            StorageClass::I32 | StorageClass::U32 | StorageClass::F32 => Some(4),
            StorageClass::I64 | StorageClass::U64 | StorageClass::F64 => Some(8),
            StorageClass::I128 | StorageClass::Fixed16 => Some(16),
            StorageClass::Bytes => None,
        }
    }

    pub fn is_varlen(self) -> bool {
        matches!(self.storage_class(), StorageClass::Bytes)
    }

    /// Whether zone-map range arithmetic (`max - min`) is meaningful.
    ///
    /// Decimals are comparable but carry a scale this layer does not track,
    /// so they report unordered here and estimators fall back to
    /// "no information".
    pub fn is_ordered(self) -> bool {
        use DataType::*;
        matches!(
            self,
            Int8 | Int16
                | Int32
                | Int64
                | UInt8
                | UInt16
                | UInt32
                | UInt64
                | Float32
                | Float64
                | Date
                | Datetime
                | Timestamp
        )
    }
}

/// A single scalar value of any supported physical type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    I128(i128),
    Bytes(Vec<u8>),
    Fixed16([u8; 16]),
}

impl Datum {
    /// Total order within a single storage class. Panics on a cross-class
    /// comparison: that is a schema violation, not a data condition.
    pub fn cmp_total(&self, other: &Datum) -> std::cmp::Ordering {
        use Datum::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (I8(a), I8(b)) => a.cmp(b),
            (I16(a), I16(b)) => a.cmp(b),
            (I32(a), I32(b)) => a.cmp(b),
            (I64(a), I64(b)) => a.cmp(b),
            (U8(a), U8(b)) => a.cmp(b),
            (U16(a), U16(b)) => a.cmp(b),
            (U32(a), U32(b)) => a.cmp(b),
            (U64(a), U64(b)) => a.cmp(b),
            (F32(a), F32(b)) => a.total_cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (I128(a), I128(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Fixed16(a), Fixed16(b)) => a.cmp(b),
            (a, b) => panic!("cannot compare datums of different classes: {a:?} vs {b:?}"),
        }
    }

    /// Lossy numeric view, used by the estimators. `None` for non-numeric
    /// values.
    pub fn to_f64(&self) -> Option<f64> {
        use Datum::*;
        Some(match self {
            Bool(v) => u8::from(*v) as f64,
            I8(v) => *v as f64,
            I16(v) => *v as f64,
            I32(v) => *v as f64,
            I64(v) => *v as f64,
            U8(v) => *v as f64,
            U16(v) => *v as f64,
            U32(v) => *v as f64,
            U64(v) => *v as f64,
            F32(v) => *v as f64,
            F64(v) => *v,
            I128(_) | Bytes(_) | Fixed16(_) => return None,
        })
    }

    /// Encode the value's comparable little-endian byte form into `out`.
    /// Fixed-width classes append exactly their width; byte values append
    /// their full contents.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        use Datum::*;
        match self {
            Bool(v) => out.push(u8::from(*v)),
            I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            U8(v) => out.extend_from_slice(&v.to_le_bytes()),
            U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            I128(v) => out.extend_from_slice(&v.to_le_bytes()),
            Bytes(v) => out.extend_from_slice(v),
            Fixed16(v) => out.extend_from_slice(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip_all_types() {
        for tag in 0..=22u8 {
            let t = DataType::try_from_u8(tag).unwrap();
            assert_eq!(t.to_u8(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_is_error_not_panic() {
        assert!(DataType::try_from_u8(200).is_err());
    }

    #[test]
    fn test_fixed_widths() {
        assert_eq!(DataType::Int8.fixed_width(), Some(1));
        assert_eq!(DataType::Int64.fixed_width(), Some(8));
        assert_eq!(DataType::Date.fixed_width(), Some(4));
        assert_eq!(DataType::Decimal128.fixed_width(), Some(16));
        assert_eq!(DataType::Uuid.fixed_width(), Some(16));
        assert_eq!(DataType::Varchar.fixed_width(), None);
        assert_eq!(DataType::Json.fixed_width(), None);
    }

    #[test]
    fn test_ordered_types() {
        assert!(DataType::Int32.is_ordered());
        assert!(DataType::UInt64.is_ordered());
        assert!(DataType::Date.is_ordered());
        assert!(DataType::Timestamp.is_ordered());
        assert!(!DataType::Bool.is_ordered());
        assert!(!DataType::Varchar.is_ordered());
        assert!(!DataType::Decimal64.is_ordered());
        assert!(!DataType::Any.is_ordered());
    }

    #[test]
    fn test_shared_storage_classes() {
        assert_eq!(DataType::Date.storage_class(), StorageClass::I32);
        assert_eq!(DataType::Timestamp.storage_class(), StorageClass::I64);
        assert_eq!(DataType::Decimal64.storage_class(), StorageClass::I64);
        assert_eq!(DataType::RowId.storage_class(), StorageClass::Fixed16);
    }

    #[test]
    fn test_datum_ordering() {
        assert_eq!(
            Datum::I64(3).cmp_total(&Datum::I64(7)),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            Datum::Bytes(b"b".to_vec()).cmp_total(&Datum::Bytes(b"a".to_vec())),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            Datum::F64(1.5).cmp_total(&Datum::F64(1.5)),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    #[should_panic]
    fn test_datum_cross_class_compare_panics() {
        let _ = Datum::I64(1).cmp_total(&Datum::U64(1));
    }

    #[test]
    fn test_datum_to_f64() {
        assert_eq!(Datum::I32(-5).to_f64(), Some(-5.0));
        assert_eq!(Datum::U64(10).to_f64(), Some(10.0));
        assert_eq!(Datum::Bytes(vec![1]).to_f64(), None);
    }

    #[test]
    fn test_datum_encode_widths() {
        let mut buf = Vec::new();
        Datum::I64(1).encode_into(&mut buf);
        assert_eq!(buf.len(), 8);
        buf.clear();
        Datum::I32(1).encode_into(&mut buf);
        assert_eq!(buf.len(), 4);
        buf.clear();
        Datum::Bytes(b"abc".to_vec()).encode_into(&mut buf);
        assert_eq!(buf, b"abc");
    }
}
