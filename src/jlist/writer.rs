//! JList Builder
//!
//! Accumulates sorted entries into an in-memory buffer and seals them into a
//! JList blob.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::error::{Result, ShardError};

use super::{BLOOM_OFFSET_FIELD, HEADER_SIZE, INDEX_OFFSET_FIELD, MAGIC, TERMINATOR};

/// Builder for JLists from sorted entries
///
/// Keys must be added in strictly ascending byte order; equal keys are
/// rejected as duplicates.
pub struct JListWriter {
    /// Output buffer; header bytes are patched in `finish`
    buf: BytesMut,
    /// Entry count promised to `begin`
    expected: usize,
    /// Entries per chunk
    chunk_size: usize,
    /// Number of entries written
    entries_added: usize,
    /// Start offset of each chunk
    offsets: Vec<u64>,
    /// Last key written (ordering check)
    last_key: Option<Vec<u8>>,
    /// Optional embedded filter over the keys
    bloom: Option<BloomFilter>,
}

impl JListWriter {
    /// Start a JList of exactly `expected_entry_count` entries with the
    /// default configuration
    pub fn begin(expected_entry_count: usize) -> Result<Self> {
        Self::with_config(expected_entry_count, &Config::default())
    }

    /// Start a JList of exactly `expected_entry_count` entries
    pub fn with_config(expected_entry_count: usize, config: &Config) -> Result<Self> {
        config.validate()?;

        let chunk_size = config.chunk_sizing.chunk_size(expected_entry_count);
        let n_chunks = expected_entry_count.div_ceil(chunk_size);
        if n_chunks > usize::from(u16::MAX) {
            return Err(ShardError::TooManyChunks(n_chunks));
        }

        let bloom = match config.jlist_bloom_fp_rate {
            Some(rate) => Some(BloomFilter::with_seed(
                expected_entry_count,
                rate,
                config.hash_seed as u32,
            )?),
            None => None,
        };

        // Header placeholder: written for real once the index offset is known
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize + expected_entry_count * 16);
        buf.put_bytes(0, HEADER_SIZE as usize);

        Ok(Self {
            buf,
            expected: expected_entry_count,
            chunk_size,
            entries_added: 0,
            offsets: Vec::with_capacity(n_chunks + 1),
            last_key: None,
            bloom,
        })
    }

    /// Add a key-value pair (must be called in ascending key order)
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key < last.as_slice() {
                return Err(ShardError::OutOfOrder {
                    key: key.to_vec(),
                    previous: last.clone(),
                });
            }
            if key == last.as_slice() {
                return Err(ShardError::DuplicateKey(key.to_vec()));
            }
        }
        if key.contains(&TERMINATOR) {
            return Err(ShardError::InvalidEntry(format!(
                "JList key {:?} contains a NUL byte",
                key
            )));
        }
        if value.contains(&TERMINATOR) {
            return Err(ShardError::InvalidEntry(format!(
                "JList value for key {:?} contains a NUL byte",
                key
            )));
        }

        // First entry of each chunk records the chunk start
        if self.entries_added % self.chunk_size == 0 {
            self.offsets.push(self.buf.len() as u64);
        }

        self.buf.put_slice(key);
        self.buf.put_u8(TERMINATOR);
        self.buf.put_slice(value);
        self.buf.put_u8(TERMINATOR);

        if let Some(bloom) = &mut self.bloom {
            bloom.add(key);
        }

        self.entries_added += 1;
        self.last_key = Some(key.to_vec());
        Ok(())
    }

    /// Entries per chunk chosen at `begin`
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of entries added so far
    pub fn entries_added(&self) -> usize {
        self.entries_added
    }

    /// Seal the list: write the index table and optional bloom filter, then
    /// patch the header
    pub fn finish(mut self) -> Result<Bytes> {
        if self.entries_added != self.expected {
            return Err(ShardError::WrongEntryCount {
                expected: self.expected,
                actual: self.entries_added,
            });
        }

        let n_chunks = self.offsets.len();
        let n_chunks_u16 =
            u16::try_from(n_chunks).map_err(|_| ShardError::TooManyChunks(n_chunks))?;

        // Sentinel offset to compute the last chunk's length
        let index_offset = self.buf.len() as u64;
        self.offsets.push(index_offset);

        self.buf.put_u16_le(n_chunks_u16);
        for pair in self.offsets.windows(2) {
            self.buf.put_u64_le(pair[0]);
            self.buf.put_u64_le(pair[1] - pair[0]);
        }

        let bloom_offset = match &self.bloom {
            Some(bloom) => {
                let offset = self.buf.len() as u64;
                bloom.write_into(&mut self.buf);
                offset
            }
            None => 0,
        };

        self.buf[..MAGIC.len()].copy_from_slice(MAGIC);
        self.buf[INDEX_OFFSET_FIELD..INDEX_OFFSET_FIELD + 8]
            .copy_from_slice(&index_offset.to_le_bytes());
        self.buf[BLOOM_OFFSET_FIELD..BLOOM_OFFSET_FIELD + 8]
            .copy_from_slice(&bloom_offset.to_le_bytes());

        debug!(
            entries = self.entries_added,
            chunks = n_chunks,
            chunk_size = self.chunk_size,
            bytes = self.buf.len(),
            bloom = bloom_offset != 0,
            "Finished JList"
        );

        Ok(self.buf.freeze())
    }
}
