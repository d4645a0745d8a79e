//! Word-Packed Bitmaps
//!
//! Used for column null masks and block delete marks. Row positions are
//! `u32`; the bitmap grows on demand when bits are set.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter<I: IntoIterator<Item = u32>>(rows: I) -> Self {
        let mut bm = Self::new();
        for row in rows {
            bm.set(row);
        }
        bm
    }

    pub fn set(&mut self, row: u32) {
        let word = (row / 64) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (row % 64);
    }

    pub fn contains(&self, row: u32) -> bool {
        let word = (row / 64) as usize;
        match self.words.get(word) {
            Some(w) => (w >> (row % 64)) & 1 == 1,
            None => false,
        }
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, w)| {
            (0..64)
                .filter(move |bit| (w >> bit) & 1 == 1)
                .map(move |bit| wi as u32 * 64 + bit)
        })
    }

    pub fn union(&mut self, other: &Bitmap) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u32_le(self.words.len() as u32);
        for w in &self.words {
            buf.put_u64_le(*w);
        }
    }

    pub fn unmarshal(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::InvalidData("truncated bitmap length".to_string()));
        }
        let n = buf.get_u32_le() as usize;
        if buf.remaining() < n * 8 {
            return Err(Error::InvalidData("truncated bitmap words".to_string()));
        }
        let mut words = Vec::with_capacity(n);
        for _ in 0..n {
            words.push(buf.get_u64_le());
        }
        Ok(Self { words })
    }
}
