//! Bloom filter for SSTable point lookups
//!
//! Double hashing over one CRC32 hash of the key: probe `i` tests bit
//! `(h + i * delta) mod m` with `delta = h.rotate_right(17)`.

use crate::error::{KvError, Result};

/// Fewest bits a non-empty filter gets, so tiny tables still filter
const MIN_BITS: usize = 64;

/// Immutable bloom filter; an empty filter matches everything
#[derive(Debug, Clone, Default)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_probes: u32,
}

impl BloomFilter {
    /// Hash used for both building and probing
    pub fn hash(key: &[u8]) -> u32 {
        crc32fast::hash(key)
    }

    /// Build a filter over pre-computed key hashes
    ///
    /// `bits_per_key == 0` (or no keys) yields a disabled filter.
    pub fn build(hashes: &[u32], bits_per_key: usize) -> Self {
        if bits_per_key == 0 || hashes.is_empty() {
            return Self::default();
        }

        // k = bits_per_key * ln(2), rounded down, clamped
        let num_probes = ((bits_per_key as f64) * 0.69) as u32;
        let num_probes = num_probes.clamp(1, 30);

        let num_bits = (hashes.len() * bits_per_key).max(MIN_BITS);
        let num_bytes = num_bits.div_ceil(8);
        let num_bits = num_bytes * 8;
        let mut bits = vec![0u8; num_bytes];

        for &hash in hashes {
            let mut h = hash;
            let delta = h.rotate_right(17);
            for _ in 0..num_probes {
                let bit = (h as usize) % num_bits;
                bits[bit / 8] |= 1 << (bit % 8);
                h = h.wrapping_add(delta);
            }
        }

        Self { bits, num_probes }
    }

    /// False only if the key is definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        if self.bits.is_empty() {
            return true;
        }
        let num_bits = self.bits.len() * 8;
        let mut h = Self::hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..self.num_probes {
            let bit = (h as usize) % num_bits;
            if self.bits[bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }

    /// True when the filter rejects nothing
    pub fn is_disabled(&self) -> bool {
        self.bits.is_empty()
    }

    /// On-disk form: `[bits...][num_probes (1)]`, empty when disabled
    pub fn encode(&self) -> Vec<u8> {
        if self.bits.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(self.bits.len() + 1);
        out.extend_from_slice(&self.bits);
        out.push(self.num_probes as u8);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some((&num_probes, bits)) = bytes.split_last() else {
            return Ok(Self::default());
        };
        if num_probes == 0 || num_probes > 30 || bits.is_empty() {
            return Err(KvError::Corruption(format!(
                "invalid bloom filter: {} probes over {} bytes",
                num_probes,
                bits.len()
            )));
        }
        Ok(Self {
            bits: bits.to_vec(),
            num_probes: num_probes as u32,
        })
    }
}
