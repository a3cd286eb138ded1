//! JList Module
//!
//! Sorted key/value list with a sparse chunk index. Lookups binary-search the
//! first key of every chunk, then scan linearly inside one chunk:
//! O(log(chunks) + chunk_size), which is O(√n) with the default sizing.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (32 bytes)                                       │
//! │   Magic "JListV1 " (8) | IndexOffset: u64 (8)           │
//! │   BloomOffset: u64 (8, 0 = none) | Padding (8)          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Region (starts at 0x20)                            │
//! │   [Key][0x00][Value][0x00]                              │
//! │   ... repeated for each entry, keys ascending ...       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Table                                             │
//! │   ChunkCount: u16                                       │
//! │   [Offset: u64][Length: u64] × ChunkCount               │
//! ├─────────────────────────────────────────────────────────┤
//! │ Bloom Filter (optional, see `bloom`)                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys and values are NUL-terminated, so neither may contain a NUL byte.
//! Chunks tile the data region: chunk 0 starts at 0x20 and each chunk ends
//! where the next begins.

mod iterator;
mod reader;
mod writer;

pub use iterator::JListIter;
pub use reader::JList;
pub use writer::JListWriter;

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic bytes identifying a JList
pub(crate) const MAGIC: &[u8; 8] = b"JListV1 ";

/// Header size; the data region starts right after it
pub(crate) const HEADER_SIZE: u64 = 0x20;

/// Offset of the index-table pointer inside the header
pub(crate) const INDEX_OFFSET_FIELD: usize = 8;

/// Offset of the bloom-filter pointer inside the header
pub(crate) const BLOOM_OFFSET_FIELD: usize = 16;

/// Size of one index table entry: offset (8) + length (8)
pub(crate) const CHUNK_ENTRY_SIZE: u64 = 16;

/// Key/value terminator
pub(crate) const TERMINATOR: u8 = 0;

/// Media type of a JList blob
pub const MEDIA_TYPE: &str = "application/x-shard-jlist";

/// One index table entry: a run of consecutive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    /// Byte offset of the chunk's first key, relative to the JList start
    pub offset: u64,
    /// Byte length of the chunk
    pub length: u64,
}

impl ChunkEntry {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}
