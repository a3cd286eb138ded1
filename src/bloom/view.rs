//! Bloom Filter Reader
//!
//! Zero-copy view over a serialized filter: the bit array is tested in place.

use tracing::warn;

use crate::codec::{read_f64, read_u32, slice};
use crate::error::{Result, ShardError};

use super::{bit_positions, HASH_XXH3_DOUBLE, HEADER_SIZE, MAGIC, MAX_HASHES};

/// Read-only bloom filter borrowing its bit array
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterRef<'a> {
    bits: &'a [u8],
    n_bits: u32,
    n_hashes: u32,
    seed: u32,
    n_elements: u32,
    n_inserted: u32,
    fp_rate: f64,
}

impl<'a> BloomFilterRef<'a> {
    /// Parse a serialized filter at the start of `bytes`
    ///
    /// Trailing bytes after the bit array are ignored, so a filter can be
    /// opened in place inside a larger structure.
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let magic = slice(bytes, 0, 8, "bloom filter magic")?;
        if magic != MAGIC {
            warn!(magic = ?magic, "Rejected bloom filter with bad magic");
            return Err(ShardError::format(format!(
                "Invalid bloom filter magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(magic)
            )));
        }

        let algo = read_u32(bytes, 8, "bloom filter hash algorithm")?;
        if algo != HASH_XXH3_DOUBLE {
            return Err(ShardError::format(format!(
                "Unsupported bloom filter hash algorithm: {}",
                algo
            )));
        }

        let seed = read_u32(bytes, 12, "bloom filter seed")?;
        let fp_rate = read_f64(bytes, 16, "bloom filter rate")?;
        let n_elements = read_u32(bytes, 24, "bloom filter capacity")?;
        let n_inserted = read_u32(bytes, 28, "bloom filter count")?;
        let n_bits = read_u32(bytes, 32, "bloom filter bit count")?;
        let n_hashes = read_u32(bytes, 36, "bloom filter hash count")?;

        if n_bits == 0 || n_bits % 32 != 0 {
            return Err(ShardError::format(format!(
                "Invalid bloom filter bit count: {}",
                n_bits
            )));
        }
        if n_hashes == 0 {
            return Err(ShardError::format("Bloom filter has zero hash functions"));
        }
        if n_hashes > MAX_HASHES {
            return Err(ShardError::format(format!(
                "Bloom filter declares {} hash functions (max {})",
                n_hashes, MAX_HASHES
            )));
        }

        let bits = slice(bytes, HEADER_SIZE, u64::from(n_bits / 8), "bloom filter bit array")?;

        Ok(Self::from_parts(bits, n_bits, n_hashes, seed, n_elements, n_inserted, fp_rate))
    }

    pub(crate) fn from_parts(
        bits: &'a [u8],
        n_bits: u32,
        n_hashes: u32,
        seed: u32,
        n_elements: u32,
        n_inserted: u32,
        fp_rate: f64,
    ) -> Self {
        Self {
            bits,
            n_bits,
            n_hashes,
            seed,
            n_elements,
            n_inserted,
            fp_rate,
        }
    }

    /// Test an item: `false` means definitely absent, `true` means maybe present
    pub fn contains(&self, item: &[u8]) -> bool {
        bit_positions(item, self.seed, self.n_bits, self.n_hashes)
            .all(|pos| self.bits[(pos / 8) as usize] & (1 << (pos % 8)) != 0)
    }

    /// Serialized length (header + bit array)
    pub fn encoded_len(&self) -> u64 {
        HEADER_SIZE + self.bits.len() as u64
    }

    pub fn bit_count(&self) -> u32 {
        self.n_bits
    }

    pub fn hash_count(&self) -> u32 {
        self.n_hashes
    }

    pub fn expected_item_count(&self) -> u32 {
        self.n_elements
    }

    pub fn inserted_count(&self) -> u32 {
        self.n_inserted
    }

    pub fn target_fp_rate(&self) -> f64 {
        self.fp_rate
    }

    pub fn is_over_capacity(&self) -> bool {
        self.n_inserted > self.n_elements
    }
}
