//! Bloom Filter Builder
//!
//! Owned, mutable filter: sized up front, filled with `add`, serialized with
//! `to_bytes`.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::{validate_fp_rate, DEFAULT_HASH_SEED};
use crate::error::Result;

use super::{bit_positions, optimal_params, BloomFilterRef, HASH_XXH3_DOUBLE, HEADER_SIZE, MAGIC};

/// In-memory bloom filter
#[derive(Debug, Clone)]
pub struct BloomFilter {
    fp_rate: f64,
    /// Designed capacity
    n_elements: u32,
    /// Items added so far
    n_inserted: u32,
    n_bits: u32,
    n_hashes: u32,
    seed: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Size a filter for `expected_item_count` items at `target_fp_rate`
    pub fn new_for_params(expected_item_count: usize, target_fp_rate: f64) -> Result<Self> {
        Self::with_seed(expected_item_count, target_fp_rate, DEFAULT_HASH_SEED as u32)
    }

    /// Same as `new_for_params`, with an explicit hash seed
    pub fn with_seed(expected_item_count: usize, target_fp_rate: f64, seed: u32) -> Result<Self> {
        validate_fp_rate(target_fp_rate)?;

        let n_elements = u32::try_from(expected_item_count).unwrap_or(u32::MAX);
        let (n_bits, n_hashes) = optimal_params(n_elements, target_fp_rate);

        debug!(
            expected = n_elements,
            fp_rate = target_fp_rate,
            bits = n_bits,
            hashes = n_hashes,
            "Sized bloom filter"
        );

        Ok(Self {
            fp_rate: target_fp_rate,
            n_elements,
            n_inserted: 0,
            n_bits,
            n_hashes,
            seed,
            bits: vec![0u8; (n_bits / 8) as usize],
        })
    }

    /// Add an item
    pub fn add(&mut self, item: &[u8]) {
        for pos in bit_positions(item, self.seed, self.n_bits, self.n_hashes) {
            self.bits[(pos / 8) as usize] |= 1 << (pos % 8);
        }

        self.n_inserted = self.n_inserted.saturating_add(1);
        if self.n_inserted == self.n_elements.saturating_add(1) {
            warn!(
                designed = self.n_elements,
                fp_rate = self.fp_rate,
                "Bloom filter loaded past its designed capacity; false positive rate will exceed target"
            );
        }
    }

    /// Test an item: `false` means definitely absent, `true` means maybe present
    pub fn contains(&self, item: &[u8]) -> bool {
        bit_positions(item, self.seed, self.n_bits, self.n_hashes)
            .all(|pos| self.bits[(pos / 8) as usize] & (1 << (pos % 8)) != 0)
    }

    /// True once more items were added than the filter was sized for
    pub fn is_over_capacity(&self) -> bool {
        self.n_inserted > self.n_elements
    }

    pub fn bit_count(&self) -> u32 {
        self.n_bits
    }

    pub fn hash_count(&self) -> u32 {
        self.n_hashes
    }

    pub fn inserted_count(&self) -> u32 {
        self.n_inserted
    }

    pub fn expected_item_count(&self) -> u32 {
        self.n_elements
    }

    pub fn target_fp_rate(&self) -> f64 {
        self.fp_rate
    }

    /// Serialize header + bit array
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize + self.bits.len());
        self.write_into(&mut buf);
        buf.freeze()
    }

    /// Append the serialized filter to `buf`
    pub(crate) fn write_into(&self, buf: &mut BytesMut) {
        buf.put_slice(MAGIC);
        buf.put_u32_le(HASH_XXH3_DOUBLE);
        buf.put_u32_le(self.seed);
        buf.put_f64_le(self.fp_rate);
        buf.put_u32_le(self.n_elements);
        buf.put_u32_le(self.n_inserted);
        buf.put_u32_le(self.n_bits);
        buf.put_u32_le(self.n_hashes);
        buf.put_slice(&self.bits);
    }

    /// Borrow this filter as a read-only view
    pub fn as_view(&self) -> BloomFilterRef<'_> {
        BloomFilterRef::from_parts(
            &self.bits,
            self.n_bits,
            self.n_hashes,
            self.seed,
            self.n_elements,
            self.n_inserted,
            self.fp_rate,
        )
    }
}
