//! Alias Table Builder
//!
//! Collects entries in any order and lays out the slot table in `finish`.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::shard::{BlobFlags, BlobKind, ShardWriter};

use super::{
    slot_and_fingerprint, ALIAS_TABLE_RECORD_NAME, HASH_XXH3, HEADER_SIZE, MAGIC, MEDIA_TYPE,
    SLOT_SIZE,
};

/// Builder for alias tables
pub struct AliasTableWriter {
    /// Entries in insertion order
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    seed: u64,
    max_load_factor: f64,
    bloom: Option<BloomFilter>,
}

/// Slot contents while building: (fingerprint, entry index)
type BuildSlot = Option<(u32, usize)>;

impl AliasTableWriter {
    /// Pre-size a table for `expected_entry_count` entries with the default
    /// configuration
    pub fn new(expected_entry_count: usize) -> Result<Self> {
        Self::with_config(expected_entry_count, &Config::default())
    }

    /// Pre-size a table for `expected_entry_count` entries
    pub fn with_config(expected_entry_count: usize, config: &Config) -> Result<Self> {
        config.validate()?;

        let bloom = match config.alias_bloom_fp_rate {
            Some(rate) => Some(BloomFilter::with_seed(
                expected_entry_count,
                rate,
                config.hash_seed as u32,
            )?),
            None => None,
        };

        Ok(Self {
            entries: Vec::with_capacity(expected_entry_count),
            seed: config.hash_seed,
            max_load_factor: config.alias_max_load_factor,
            bloom,
        })
    }

    /// Add a key-value pair (any order; duplicates are rejected by `finish`)
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if u32::try_from(key.len()).is_err() || u32::try_from(value.len()).is_err() {
            return Err(ShardError::InvalidEntry(format!(
                "alias table entry too large: key {} bytes, value {} bytes",
                key.len(),
                value.len()
            )));
        }

        if let Some(bloom) = &mut self.bloom {
            bloom.add(key);
        }
        self.entries.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Place every entry and serialize the table
    pub fn finish(self) -> Result<Bytes> {
        let n_entries = self.entries.len();
        let min_slots = ((n_entries as f64) / self.max_load_factor).ceil() as u64;
        let n_slots = min_slots.max(1).next_power_of_two();
        let mask = n_slots - 1;

        let (slots, max_probe) = self.place_entries(n_slots, mask)?;

        // Data region: entries in insertion order
        let mut data = BytesMut::new();
        let mut entry_offsets = Vec::with_capacity(n_entries);
        for (key, value) in &self.entries {
            entry_offsets.push(data.len() as u64);
            data.put_u32_le(key.len() as u32);
            data.put_u32_le(value.len() as u32);
            data.put_slice(key);
            data.put_slice(value);
        }

        let slots_offset = HEADER_SIZE;
        let data_offset = slots_offset + n_slots * SLOT_SIZE;
        let data_end = data_offset + data.len() as u64;
        let bloom_offset = if self.bloom.is_some() { data_end } else { 0 };

        let mut buf = BytesMut::with_capacity(data_end as usize);
        buf.put_slice(MAGIC);
        buf.put_u64_le(n_entries as u64);
        buf.put_u64_le(n_slots);
        buf.put_u64_le(self.seed);
        buf.put_u32_le(max_probe);
        buf.put_u32_le(HASH_XXH3);
        buf.put_u64_le(slots_offset);
        buf.put_u64_le(data_offset);
        buf.put_u64_le(bloom_offset);
        debug_assert_eq!(buf.len() as u64, HEADER_SIZE);

        for slot in &slots {
            match slot {
                Some((fingerprint, idx)) => {
                    buf.put_u32_le(*fingerprint);
                    buf.put_u32_le(0);
                    buf.put_u64_le(entry_offsets[*idx] + 1);
                }
                None => buf.put_bytes(0, SLOT_SIZE as usize),
            }
        }
        buf.put_slice(&data);

        if let Some(bloom) = &self.bloom {
            bloom.write_into(&mut buf);
        }

        debug!(
            entries = n_entries,
            slots = n_slots,
            max_probe,
            bytes = buf.len(),
            "Finished alias table"
        );

        Ok(buf.freeze())
    }

    /// Linear probing; returns the slot table and the longest probe distance
    fn place_entries(&self, n_slots: u64, mask: u64) -> Result<(Vec<BuildSlot>, u32)> {
        let mut slots: Vec<BuildSlot> = vec![None; n_slots as usize];
        let mut max_probe = 0u32;

        for (idx, (key, _)) in self.entries.iter().enumerate() {
            let (home, fingerprint) = slot_and_fingerprint(key, self.seed, mask);
            let mut distance = 0u64;
            loop {
                let pos = ((home + distance) & mask) as usize;
                let current = slots[pos];
                match current {
                    None => {
                        slots[pos] = Some((fingerprint, idx));
                        max_probe = max_probe.max(distance as u32);
                        break;
                    }
                    Some((fp, other)) if fp == fingerprint && self.entries[other].0 == *key => {
                        return Err(ShardError::DuplicateKey(key.clone()));
                    }
                    Some(_) => distance += 1,
                }
            }
        }

        Ok((slots, max_probe))
    }

    /// Finish the table and store it in `writer` under
    /// `ALIAS_TABLE_RECORD_NAME` as a single data blob
    pub fn write_to_shard(self, writer: &mut ShardWriter) -> Result<()> {
        let bytes = self.finish()?;
        writer.add_record(ALIAS_TABLE_RECORD_NAME)?;
        writer.add_blob(BlobKind::Data, bytes, MEDIA_TYPE, BlobFlags::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count_respects_load_factor() {
        let mut writer = AliasTableWriter::new(10).unwrap();
        for i in 0..10 {
            writer.add_entry(format!("k{}", i).as_bytes(), b"v").unwrap();
        }
        let bytes = writer.finish().unwrap();
        let n_slots = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        // 10 / 0.5 = 20 → 32
        assert_eq!(n_slots, 32);
        let n_entries = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(n_entries, 10);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut writer = AliasTableWriter::new(3).unwrap();
        writer.add_entry(b"cat", b"1").unwrap();
        writer.add_entry(b"dog", b"2").unwrap();
        writer.add_entry(b"cat", b"3").unwrap();
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, ShardError::DuplicateKey(ref k) if k == b"cat"));
        assert!(err.is_build_error());
    }

    #[test]
    fn test_empty_table_has_one_slot() {
        let writer = AliasTableWriter::new(0).unwrap();
        assert!(writer.is_empty());
        let bytes = writer.finish().unwrap();
        let n_slots = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        assert_eq!(n_slots, 1);
    }

    #[test]
    fn test_no_bloom_when_disabled() {
        let config = Config::builder().alias_bloom_fp_rate(None).build();
        let mut writer = AliasTableWriter::with_config(1, &config).unwrap();
        writer.add_entry(b"k", b"v").unwrap();
        let bytes = writer.finish().unwrap();
        let bloom_offset = u64::from_le_bytes(bytes[56..64].try_into().unwrap());
        assert_eq!(bloom_offset, 0);
    }
}
