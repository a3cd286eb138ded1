//! JList Reader
//!
//! Validates the header and index table on open, then answers point lookups
//! directly against the borrowed bytes.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::bloom::BloomFilterRef;
use crate::codec::{read_cstr, read_u16, read_u64, slice};
use crate::error::{Result, ShardError};

use super::iterator::JListIter;
use super::{
    ChunkEntry, BLOOM_OFFSET_FIELD, CHUNK_ENTRY_SIZE, HEADER_SIZE, INDEX_OFFSET_FIELD, MAGIC,
    TERMINATOR,
};

/// Zero-copy JList view
#[derive(Debug, Clone)]
pub struct JList<'a> {
    /// Whole JList blob
    bytes: &'a [u8],
    /// Start of the index table (= end of the data region)
    index_offset: u64,
    /// Number of chunks
    chunk_count: u16,
    /// Embedded filter, if the writer stored one
    bloom: Option<BloomFilterRef<'a>>,
}

impl<'a> JList<'a> {
    /// Open a JList blob
    ///
    /// Checks the magic and that the chunk table tiles the data region.
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let magic = slice(bytes, 0, MAGIC.len() as u64, "JList magic")?;
        if magic != MAGIC {
            warn!(magic = ?magic, "Rejected JList with bad magic");
            return Err(ShardError::format(format!(
                "Invalid JList magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(magic)
            )));
        }

        let index_offset = read_u64(bytes, INDEX_OFFSET_FIELD as u64, "JList index offset")?;
        let bloom_offset = read_u64(bytes, BLOOM_OFFSET_FIELD as u64, "JList bloom offset")?;

        if index_offset < HEADER_SIZE {
            return Err(ShardError::format(format!(
                "JList index offset {} points into the header",
                index_offset
            )));
        }

        let chunk_count = read_u16(bytes, index_offset, "JList chunk count")?;
        let table_len = u64::from(chunk_count) * CHUNK_ENTRY_SIZE;
        slice(bytes, index_offset + 2, table_len, "JList index table")?;

        let jlist = Self {
            bytes,
            index_offset,
            chunk_count,
            bloom: None,
        };
        jlist.validate_chunks()?;

        let bloom = if bloom_offset == 0 {
            None
        } else {
            let index_end = index_offset + 2 + table_len;
            if bloom_offset < index_end {
                return Err(ShardError::format(format!(
                    "JList bloom filter offset {} overlaps the index table",
                    bloom_offset
                )));
            }
            let rest = slice(
                bytes,
                bloom_offset,
                (bytes.len() as u64).saturating_sub(bloom_offset),
                "JList bloom filter",
            )?;
            Some(BloomFilterRef::open(rest)?)
        };

        debug!(
            chunks = chunk_count,
            data_bytes = index_offset - HEADER_SIZE,
            bloom = bloom.is_some(),
            "Opened JList"
        );

        Ok(Self { bloom, ..jlist })
    }

    /// Chunks must start at the data region, follow each other without gaps,
    /// and ascend by first key
    fn validate_chunks(&self) -> Result<()> {
        let mut expected_offset = HEADER_SIZE;
        let mut prev_key: Option<&[u8]> = None;
        for i in 0..self.chunk_count {
            let chunk = self.chunk_unchecked(i)?;
            if chunk.offset != expected_offset || chunk.length == 0 {
                return Err(ShardError::format(format!(
                    "JList chunk {} at {}+{} does not follow previous chunk ending at {}",
                    i, chunk.offset, chunk.length, expected_offset
                )));
            }
            let first_key = self.chunk_first_key(chunk)?;
            if prev_key.is_some_and(|prev| prev >= first_key) {
                return Err(ShardError::format(format!(
                    "JList chunk {} is out of order",
                    i
                )));
            }
            prev_key = Some(first_key);
            expected_offset = chunk
                .offset
                .checked_add(chunk.length)
                .ok_or_else(|| ShardError::format("JList chunk length overflows"))?;
        }
        if expected_offset != self.index_offset {
            return Err(ShardError::format(format!(
                "JList chunks end at {} but index starts at {}",
                expected_offset, self.index_offset
            )));
        }
        Ok(())
    }

    fn chunk_unchecked(&self, i: u16) -> Result<ChunkEntry> {
        let at = self.index_offset + 2 + u64::from(i) * CHUNK_ENTRY_SIZE;
        Ok(ChunkEntry {
            offset: read_u64(self.bytes, at, "JList chunk offset")?,
            length: read_u64(self.bytes, at + 8, "JList chunk length")?,
        })
    }

    /// Look up a key
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found
    /// - `Ok(None)`: key not in this list
    /// - `Err(Format)`: the candidate chunk is corrupt
    pub fn lookup_key(&self, key: &[u8]) -> Result<Option<&'a [u8]>> {
        // A terminator inside the query can never match a stored key
        if key.contains(&TERMINATOR) {
            return Ok(None);
        }

        if let Some(bloom) = &self.bloom {
            if !bloom.contains(key) {
                return Ok(None);
            }
        }

        let chunk = match self.find_chunk(key)? {
            Some(chunk) => chunk,
            None => return Ok(None),
        };

        self.lookup_key_in_chunk(chunk, key)
    }

    /// Binary search for the last chunk whose first key is <= `key`
    fn find_chunk(&self, key: &[u8]) -> Result<Option<ChunkEntry>> {
        let (mut lo, mut hi) = (0u16, self.chunk_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let first = self.chunk_first_key(self.chunk_unchecked(mid)?)?;
            if first <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        // `lo` is the first chunk starting after `key`
        if lo == 0 {
            return Ok(None);
        }
        self.chunk_unchecked(lo - 1).map(Some)
    }

    /// Linear scan within one chunk
    fn lookup_key_in_chunk(&self, chunk: ChunkEntry, key: &[u8]) -> Result<Option<&'a [u8]>> {
        for entry in JListIter::new(self.bytes, chunk.offset, chunk.end()) {
            let (entry_key, value) = entry?;
            match entry_key.cmp(key) {
                Ordering::Equal => return Ok(Some(value)),
                // Sorted: once past the key it cannot appear later
                Ordering::Greater => return Ok(None),
                Ordering::Less => {}
            }
        }
        Ok(None)
    }

    /// First key of a chunk
    pub fn chunk_first_key(&self, chunk: ChunkEntry) -> Result<&'a [u8]> {
        read_cstr(self.bytes, chunk.offset, chunk.end(), "JList chunk key")
    }

    /// Number of chunks in the index table
    pub fn chunk_count(&self) -> usize {
        usize::from(self.chunk_count)
    }

    /// Index table entry `i`
    pub fn chunk(&self, i: usize) -> Option<ChunkEntry> {
        let i = u16::try_from(i).ok().filter(|&i| i < self.chunk_count)?;
        self.chunk_unchecked(i).ok()
    }

    /// All index table entries in order
    pub fn chunks(&self) -> impl Iterator<Item = ChunkEntry> + '_ {
        (0..self.chunk_count).filter_map(move |i| self.chunk_unchecked(i).ok())
    }

    /// Whether an embedded bloom filter guards lookups
    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    /// The embedded bloom filter, if any
    pub fn bloom_filter(&self) -> Option<&BloomFilterRef<'a>> {
        self.bloom.as_ref()
    }

    /// Size of the data region in bytes
    pub fn data_len(&self) -> u64 {
        self.index_offset - HEADER_SIZE
    }

    /// Iterate over all entries in key order
    pub fn iter(&self) -> JListIter<'a> {
        JListIter::new(self.bytes, HEADER_SIZE, self.index_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkSizing, Config};
    use crate::jlist::JListWriter;

    fn build(entries: &[(&str, &str)], config: &Config) -> bytes::Bytes {
        let mut writer = JListWriter::with_config(entries.len(), config).unwrap();
        for (k, v) in entries {
            writer.add_entry(k.as_bytes(), v.as_bytes()).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_lookup_every_key_across_chunk_sizes() {
        let entries: Vec<(String, String)> = (0..57)
            .map(|i| (format!("key{:03}", i), format!("value{}", i)))
            .collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        for sizing in [ChunkSizing::Sqrt, ChunkSizing::Fixed(1), ChunkSizing::Fixed(5), ChunkSizing::Fixed(100)] {
            let config = Config::builder().chunk_sizing(sizing).build();
            let bytes = build(&refs, &config);
            let jlist = JList::open(&bytes).unwrap();
            for (k, v) in &refs {
                assert_eq!(jlist.lookup_key(k.as_bytes()).unwrap(), Some(v.as_bytes()), "{:?}", sizing);
            }
            assert_eq!(jlist.lookup_key(b"key").unwrap(), None);
            assert_eq!(jlist.lookup_key(b"key0005").unwrap(), None);
            assert_eq!(jlist.lookup_key(b"zzz").unwrap(), None);
            assert_eq!(jlist.lookup_key(b"").unwrap(), None);
        }
    }

    #[test]
    fn test_before_first_key_not_found() {
        let bytes = build(&[("m", "1"), ("n", "2")], &Config::default());
        let jlist = JList::open(&bytes).unwrap();
        assert_eq!(jlist.lookup_key(b"a").unwrap(), None);
    }

    #[test]
    fn test_empty_list() {
        let bytes = build(&[], &Config::default());
        let jlist = JList::open(&bytes).unwrap();
        assert_eq!(jlist.chunk_count(), 0);
        assert_eq!(jlist.lookup_key(b"anything").unwrap(), None);
        assert_eq!(jlist.iter().count(), 0);
    }

    #[test]
    fn test_empty_key_and_value() {
        let bytes = build(&[("", "empty"), ("k", "")], &Config::default());
        let jlist = JList::open(&bytes).unwrap();
        assert_eq!(jlist.lookup_key(b"").unwrap(), Some(&b"empty"[..]));
        assert_eq!(jlist.lookup_key(b"k").unwrap(), Some(&b""[..]));
    }

    #[test]
    fn test_query_with_nul_not_found() {
        let bytes = build(&[("a", "1")], &Config::default());
        let jlist = JList::open(&bytes).unwrap();
        assert_eq!(jlist.lookup_key(b"a\0").unwrap(), None);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = build(&[("a", "1")], &Config::default()).to_vec();
        bytes[0] = b'X';
        assert!(JList::open(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_truncated_index() {
        let bytes = build(&[("a", "1"), ("b", "2"), ("c", "3")], &Config::default());
        let truncated = &bytes[..bytes.len() - 4];
        assert!(JList::open(truncated).unwrap_err().is_format_error());
    }

    #[test]
    fn test_index_offset_past_end() {
        let mut bytes = build(&[("a", "1")], &Config::default()).to_vec();
        bytes[8..16].copy_from_slice(&10_000u64.to_le_bytes());
        assert!(JList::open(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_gap_between_chunks_rejected() {
        let config = Config::builder().chunk_sizing(ChunkSizing::Fixed(1)).build();
        let mut bytes = build(&[("a", "1"), ("b", "2")], &config).to_vec();
        let index = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
        // Shorten chunk 0 by one byte
        let len_at = index + 2 + 8;
        let len = u64::from_le_bytes(bytes[len_at..len_at + 8].try_into().unwrap());
        bytes[len_at..len_at + 8].copy_from_slice(&(len - 1).to_le_bytes());
        assert!(JList::open(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_swapped_chunks_rejected() {
        let config = Config::builder().chunk_sizing(ChunkSizing::Fixed(1)).build();
        let mut bytes = build(&[("a", "1"), ("b", "2")], &config).to_vec();
        // Both entries are 4 bytes, so swapping them keeps the tiling intact
        bytes[32..40].copy_from_slice(b"b\02\0a\01\0");
        assert!(JList::open(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_missing_terminator_surfaces_on_lookup() {
        let bytes = build(&[("a", "1"), ("b", "2")], &Config::default()).to_vec();
        let mut corrupt = bytes.clone();
        // "a\01\0b\02\0": overwrite every terminator in the data region
        for b in &mut corrupt[0x20..0x28] {
            if *b == 0 {
                *b = b'x';
            }
        }
        let jlist = JList::open(&corrupt).unwrap();
        assert!(jlist.lookup_key(b"b").unwrap_err().is_format_error());
    }

    #[test]
    fn test_bloom_filter_guards_lookup() {
        let config = Config::builder().jlist_bloom_fp_rate(Some(0.01)).build();
        let bytes = build(&[("ant", "nag"), ("bear", "orne")], &config);
        let jlist = JList::open(&bytes).unwrap();
        assert!(jlist.has_bloom_filter());
        assert_eq!(jlist.lookup_key(b"bear").unwrap(), Some(&b"orne"[..]));
        assert_eq!(jlist.lookup_key(b"cat").unwrap(), None);
        assert!(jlist.bloom_filter().unwrap().contains(b"ant"));
    }

    #[test]
    fn test_chunk_accessors() {
        let config = Config::builder().chunk_sizing(ChunkSizing::Fixed(2)).build();
        let bytes = build(&[("a", "1"), ("b", "2"), ("c", "3")], &config);
        let jlist = JList::open(&bytes).unwrap();
        assert_eq!(jlist.chunk_count(), 2);
        let first_keys: Vec<&[u8]> = jlist
            .chunks()
            .map(|c| jlist.chunk_first_key(c).unwrap())
            .collect();
        assert_eq!(first_keys, vec![&b"a"[..], &b"c"[..]]);
        assert!(jlist.chunk(2).is_none());
        assert_eq!(jlist.chunk(0).unwrap().offset, 0x20);
        assert_eq!(jlist.data_len(), 12);
    }
}
