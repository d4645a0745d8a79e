//! Object Names and Block Locations
//!
//! An object is addressed by a structured name: the segment id (a UUID), a
//! 16-bit numeric suffix, and a role tag. Normal data objects render as
//! `{uuid}_{num:05}`; special roles append a short suffix so operational
//! tooling can tell files apart at a glance.
//!
//! A `Location` addresses one block: the owning object's name, the object's
//! metadata extent, the block's row count and its index within the object.
//! Readers reach all of a block's metadata through its location in a single
//! metadata load.

use std::fmt;

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::codec::Extent;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ObjectRole {
    #[default]
    Normal = 0,
    Checkpoint = 1,
    QueryResult = 2,
    Gc = 3,
    Etl = 4,
}

impl ObjectRole {
    fn suffix(self) -> &'static str {
        match self {
            ObjectRole::Normal => "",
            ObjectRole::Checkpoint => ".ckp",
            ObjectRole::QueryResult => ".qr",
            ObjectRole::Gc => ".gc",
            ObjectRole::Etl => ".etl",
        }
    }

    pub fn try_from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ObjectRole::Normal),
            1 => Ok(ObjectRole::Checkpoint),
            2 => Ok(ObjectRole::QueryResult),
            3 => Ok(ObjectRole::Gc),
            4 => Ok(ObjectRole::Etl),
            other => Err(Error::InvalidObject(format!("unknown object role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectName {
    segment_id: Uuid,
    num: u16,
    role: ObjectRole,
}

impl ObjectName {
    pub fn new(segment_id: Uuid, num: u16) -> Self {
        Self {
            segment_id,
            num,
            role: ObjectRole::Normal,
        }
    }

    /// A fresh name for a special-role writer.
    pub fn with_role(role: ObjectRole) -> Self {
        Self {
            segment_id: Uuid::new_v4(),
            num: 0,
            role,
        }
    }

    pub fn segment_id(&self) -> Uuid {
        self.segment_id
    }

    pub fn num(&self) -> u16 {
        self.num
    }

    pub fn role(&self) -> ObjectRole {
        self.role
    }

    pub fn to_path(&self) -> object_store::path::Path {
        object_store::path::Path::from(self.to_string())
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.segment_id.as_bytes());
        buf.put_u16_le(self.num);
        buf.put_u8(self.role as u8);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < 19 {
            return Err(Error::InvalidObject("truncated object name".to_string()));
        }
        let mut id = [0u8; 16];
        buf.copy_to_slice(&mut id);
        let num = buf.get_u16_le();
        let role = ObjectRole::try_from_u8(buf.get_u8())?;
        Ok(Self {
            segment_id: Uuid::from_bytes(id),
            num,
            role,
        })
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:05}{}",
            self.segment_id,
            self.num,
            self.role.suffix()
        )
    }
}

/// The address of one block: object name, object metadata extent, the
/// block's row count and its index within the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub name: ObjectName,
    pub extent: Extent,
    pub rows: u32,
    pub id: u16,
}

impl Location {
    pub fn new(name: ObjectName, extent: Extent, rows: u32, id: u16) -> Self {
        Self {
            name,
            extent,
            rows,
            id,
        }
    }

    pub fn is_same_object(&self, other: &Location) -> bool {
        self.name == other.name
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        self.name.marshal(buf);
        self.extent.marshal(buf);
        buf.put_u32_le(self.rows);
        buf.put_u16_le(self.id);
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        let name = ObjectName::unmarshal(buf)?;
        let extent = Extent::unmarshal(buf)?;
        if buf.remaining() < 6 {
            return Err(Error::InvalidObject("truncated location".to_string()));
        }
        Ok(Self {
            name,
            extent,
            rows: buf.get_u32_le(),
            id: buf.get_u16_le(),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}:{}",
            self.name, self.extent.offset, self.extent.length, self.rows, self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;

    #[test]
    fn test_name_rendering() {
        let id = Uuid::new_v4();
        let name = ObjectName::new(id, 3);
        assert_eq!(name.to_string(), format!("{id}_00003"));
        assert_eq!(name.num(), 3);
        assert_eq!(name.segment_id(), id);
    }

    #[test]
    fn test_role_suffixes() {
        let ckp = ObjectName::with_role(ObjectRole::Checkpoint);
        assert!(ckp.to_string().ends_with(".ckp"));
        let etl = ObjectName::with_role(ObjectRole::Etl);
        assert!(etl.to_string().ends_with(".etl"));
        let normal = ObjectName::with_role(ObjectRole::Normal);
        assert!(!normal.to_string().contains('.'));
    }

    #[test]
    fn test_name_marshal_roundtrip() {
        let name = ObjectName::new(Uuid::new_v4(), 42);
        let mut buf = Vec::new();
        name.marshal(&mut buf);
        let restored = ObjectName::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(name, restored);
    }

    #[test]
    fn test_location_roundtrip_and_grouping() {
        let name = ObjectName::new(Uuid::new_v4(), 0);
        let a = Location::new(name, Extent::new(Compression::Lz4, 100, 50, 200), 8192, 0);
        let b = Location::new(name, Extent::new(Compression::Lz4, 100, 50, 200), 4000, 1);
        assert!(a.is_same_object(&b));

        let other = Location::new(
            ObjectName::new(Uuid::new_v4(), 0),
            Extent::new(Compression::Lz4, 100, 50, 200),
            10,
            0,
        );
        assert!(!a.is_same_object(&other));

        let mut buf = Vec::new();
        a.marshal(&mut buf);
        let restored = Location::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(a, restored);
    }
}
