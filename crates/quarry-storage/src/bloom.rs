//! Block Bloom Filters
//!
//! Probabilistic key-presence summaries attached to blocks, usually over
//! the primary-key column. The object writer treats the serialized bytes
//! as opaque: this module is the only place that knows their shape.
//!
//! If `might_contain(key)` returns `false` the key is definitely absent
//! from the block; `true` means it might be present (default 1% false
//! positive rate).

use bloomfilter::Bloom;

use crate::error::{Error, Result};

/// Default false positive rate (1%)
const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

const SERIAL_VERSION: u8 = 1;

pub struct BlockBloomFilter {
    bloom: Bloom<[u8]>,
    item_count: u64,
}

impl BlockBloomFilter {
    pub fn new(expected_items: usize) -> Self {
        let bloom = Bloom::new_for_fp_rate(expected_items.max(1), DEFAULT_FALSE_POSITIVE_RATE);
        Self {
            bloom,
            item_count: 0,
        }
    }

    pub fn add(&mut self, key: &[u8]) {
        self.bloom.set(key);
        self.item_count += 1;
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.bloom.check(key)
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    /// Serialize for storage inside an object's bloom-filter area.
    ///
    /// Format: version (1) ∥ item_count (8) ∥ num_bits (8) ∥
    /// num_hashes (4) ∥ sip keys (32) ∥ bitmap.
    pub fn to_bytes(&self) -> Vec<u8> {
        let bitmap = self.bloom.bitmap();
        let sip_keys = self.bloom.sip_keys();
        let mut out = Vec::with_capacity(1 + 8 + 8 + 4 + 32 + bitmap.len());
        out.push(SERIAL_VERSION);
        out.extend_from_slice(&self.item_count.to_le_bytes());
        out.extend_from_slice(&self.bloom.number_of_bits().to_le_bytes());
        out.extend_from_slice(&self.bloom.number_of_hash_functions().to_le_bytes());
        for (k0, k1) in sip_keys {
            out.extend_from_slice(&k0.to_le_bytes());
            out.extend_from_slice(&k1.to_le_bytes());
        }
        out.extend_from_slice(&bitmap);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 1 + 8 + 8 + 4 + 32 {
            return Err(Error::InvalidObject("truncated bloom filter".to_string()));
        }
        let version = data[0];
        if version != SERIAL_VERSION {
            return Err(Error::InvalidObject(format!(
                "unsupported bloom filter version: {version}"
            )));
        }
        let mut cursor = 1;
        let read_u64 = |data: &[u8], cursor: &mut usize| {
            let v = u64::from_le_bytes(data[*cursor..*cursor + 8].try_into().unwrap());
            *cursor += 8;
            v
        };
        let item_count = read_u64(data, &mut cursor);
        let num_bits = read_u64(data, &mut cursor);
        let num_hashes = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let sip_keys = [
            (read_u64(data, &mut cursor), read_u64(data, &mut cursor)),
            (read_u64(data, &mut cursor), read_u64(data, &mut cursor)),
        ];
        let bloom = Bloom::from_existing(&data[cursor..], num_bits, num_hashes, sip_keys);
        Ok(Self { bloom, item_count })
    }
}
