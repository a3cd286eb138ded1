//! Alias Table Reader
//!
//! Probes the slot table in place; values are borrowed from the blob.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::bloom::BloomFilterRef;
use crate::codec::{read_u32, read_u64, slice};
use crate::error::{Result, ShardError};
use crate::shard::ShardFile;

use super::{
    slot_and_fingerprint, ALIAS_TABLE_RECORD_NAME, ENTRY_HEADER_SIZE, HASH_XXH3, HEADER_SIZE,
    MAGIC, SLOT_SIZE,
};

/// Zero-copy alias table view
#[derive(Debug, Clone)]
pub struct AliasTable<'a> {
    /// Slot array
    slots: &'a [u8],
    /// Data region
    data: &'a [u8],
    n_entries: u64,
    n_slots: u64,
    seed: u64,
    max_probe: u32,
    bloom: Option<BloomFilterRef<'a>>,
}

impl<'a> AliasTable<'a> {
    /// Open a serialized alias table
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let magic = slice(bytes, 0, MAGIC.len() as u64, "alias table magic")?;
        if magic != MAGIC {
            warn!(magic = ?magic, "Rejected alias table with bad magic");
            return Err(ShardError::format(format!(
                "Invalid alias table magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(magic)
            )));
        }

        let n_entries = read_u64(bytes, 8, "alias table entry count")?;
        let n_slots = read_u64(bytes, 16, "alias table slot count")?;
        let seed = read_u64(bytes, 24, "alias table seed")?;
        let max_probe = read_u32(bytes, 32, "alias table max probe")?;
        let algo = read_u32(bytes, 36, "alias table hash algorithm")?;
        let slots_offset = read_u64(bytes, 40, "alias table slots offset")?;
        let data_offset = read_u64(bytes, 48, "alias table data offset")?;
        let bloom_offset = read_u64(bytes, 56, "alias table bloom offset")?;

        if algo != HASH_XXH3 {
            return Err(ShardError::format(format!(
                "Unsupported alias table hash algorithm: {}",
                algo
            )));
        }
        if !n_slots.is_power_of_two() || n_entries > n_slots || u64::from(max_probe) >= n_slots {
            return Err(ShardError::format(format!(
                "Inconsistent alias table geometry: {} entries, {} slots, max probe {}",
                n_entries, n_slots, max_probe
            )));
        }
        if slots_offset < HEADER_SIZE {
            return Err(ShardError::format("Alias table slots overlap the header"));
        }

        let slots_len = n_slots
            .checked_mul(SLOT_SIZE)
            .ok_or_else(|| ShardError::format("Alias table slot count overflows"))?;
        let slots = slice(bytes, slots_offset, slots_len, "alias table slots")?;
        if data_offset < slots_offset + slots_len {
            return Err(ShardError::format("Alias table data overlaps the slots"));
        }

        let data_end = if bloom_offset == 0 {
            bytes.len() as u64
        } else {
            bloom_offset
        };
        let data = slice(
            bytes,
            data_offset,
            data_end.checked_sub(data_offset).ok_or_else(|| {
                ShardError::format("Alias table bloom filter overlaps the data region")
            })?,
            "alias table data",
        )?;

        let bloom = if bloom_offset == 0 {
            None
        } else {
            let rest = slice(
                bytes,
                bloom_offset,
                (bytes.len() as u64).saturating_sub(bloom_offset),
                "alias table bloom filter",
            )?;
            Some(BloomFilterRef::open(rest)?)
        };

        debug!(
            entries = n_entries,
            slots = n_slots,
            max_probe,
            bloom = bloom.is_some(),
            "Opened alias table"
        );

        Ok(Self {
            slots,
            data,
            n_entries,
            n_slots,
            seed,
            max_probe,
            bloom,
        })
    }

    /// Load the table that `AliasTableWriter::write_to_shard` stored in `shard`
    ///
    /// Returns `Ok(None)` if the shard holds no alias table record.
    pub fn new_from_shard(shard: &'a ShardFile) -> Result<Option<Self>> {
        let record = match shard.find_record_by_hex_name(ALIAS_TABLE_RECORD_NAME)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let blob = record.data().ok_or_else(|| {
            ShardError::Decode(format!(
                "alias table record {} has no data blob",
                ALIAS_TABLE_RECORD_NAME
            ))
        })?;
        blob.load_as_alias_table().map(Some)
    }

    /// Look up one key
    pub fn find_entry(&self, key: &[u8]) -> Result<Option<&'a [u8]>> {
        if let Some(bloom) = &self.bloom {
            if !bloom.contains(key) {
                return Ok(None);
            }
        }

        let mask = self.n_slots - 1;
        let (home, fingerprint) = slot_and_fingerprint(key, self.seed, mask);

        for distance in 0..=u64::from(self.max_probe) {
            let at = ((home + distance) & mask) * SLOT_SIZE;
            let entry_ref = read_u64(self.slots, at + 8, "alias table slot")?;
            if entry_ref == 0 {
                // Empty slot ends the probe sequence
                return Ok(None);
            }
            if read_u32(self.slots, at, "alias table slot")? != fingerprint {
                continue;
            }
            let (entry_key, value) = self.entry_at(entry_ref - 1)?;
            if entry_key == key {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Look up a batch of keys
    ///
    /// Keys that are not present are omitted from the result. Iteration order
    /// of the returned map is unspecified.
    pub fn find_entries<'k, I>(&self, keys: I) -> Result<HashMap<&'k [u8], &'a [u8]>>
    where
        I: IntoIterator<Item = &'k [u8]>,
    {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.find_entry(key)? {
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    /// Decode the entry at `offset` in the data region
    fn entry_at(&self, offset: u64) -> Result<(&'a [u8], &'a [u8])> {
        let key_len = read_u32(self.data, offset, "alias table key length")?;
        let value_len = read_u32(self.data, offset + 4, "alias table value length")?;
        let key_at = offset + ENTRY_HEADER_SIZE;
        let key = slice(self.data, key_at, u64::from(key_len), "alias table key")?;
        let value = slice(
            self.data,
            key_at + u64::from(key_len),
            u64::from(value_len),
            "alias table value",
        )?;
        Ok((key, value))
    }

    /// Number of entries
    pub fn len(&self) -> u64 {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    /// Number of slots (power of two)
    pub fn slot_count(&self) -> u64 {
        self.n_slots
    }

    /// Longest probe sequence any lookup will walk, minus one
    pub fn max_probe(&self) -> u32 {
        self.max_probe
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }
}
