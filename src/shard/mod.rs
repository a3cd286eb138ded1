//! Shard Container Module
//!
//! A shard is an immutable file holding named records. Each record carries at
//! most one blob per kind; a blob is an opaque byte payload tagged with a
//! media type and guarded by a SHA-256 checksum.
//!
//! ## Responsibilities
//! - Collect records and blobs in memory, then write the whole file atomically
//! - Memory-map a shard and resolve records by name with a binary search
//! - Hand out zero-copy views of blob payloads, decoded by media type
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes, little-endian)                            │
//! │   Magic "ShardV2 " (8) | Flags u16 | Version u16 | CRC32 u32│
//! │   RecordCount u64 | RecordTableOffset u64                   │
//! │   StringTableOffset u64 | StringTableLen u64 | Reserved (16)│
//! ├─────────────────────────────────────────────────────────────┤
//! │ Blobs (each aligned to `blob_alignment`)                    │
//! │   Kind u16 | Flags u16 | Reserved u32 | MediaTypeOffset u64 │
//! │   Size u64 | UncompressedSize u64 | DataOffset u64          │
//! │   SHA-256 (32) | ... stored bytes at DataOffset             │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Blob Tables: per record, u64 blob header offsets by kind    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record Table: sorted by raw name, 40 bytes each             │
//! │   RawName (20) | Flags u32 | BlobCount u8 | Reserved (7)    │
//! │   BlobTableOffset u64                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ String Table: NUL-terminated media types, deduplicated      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The header CRC32 covers the 64 header bytes with the CRC field zeroed.

mod file;
mod loader;
mod name;
mod record;
mod writer;

pub use file::{Records, ShardFile};
pub use loader::{BlobLoader, LoadedBlob};
pub use name::{hex_name, parse_hex_name, RAW_NAME_LEN};
pub use record::{Blob, Record};
pub use writer::{ShardSummary, ShardWriter};

use std::fmt;

// =============================================================================
// Shared Constants (used by writer and file)
// =============================================================================

/// Magic bytes identifying a shard file
pub(crate) const MAGIC: &[u8; 8] = b"ShardV2 ";

/// Current format version
pub(crate) const VERSION: u16 = 1;

/// Header size in bytes
pub(crate) const HEADER_SIZE: u64 = 64;

/// Offset of the header CRC field
pub(crate) const CRC_FIELD: usize = 12;

/// Blob header size in bytes
pub(crate) const BLOB_HEADER_SIZE: u64 = 72;

/// Record table entry size in bytes
pub(crate) const RECORD_ENTRY_SIZE: u64 = 40;

/// Longest media type the string table accepts
pub(crate) const MAX_MEDIA_TYPE_LEN: usize = 255;

/// Media type for payloads with no registered loader
pub const OCTET_STREAM: &str = "application/octet-stream";

/// CRC32 of a serialized header, computed with the CRC field zeroed
pub(crate) fn header_crc(header: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[..CRC_FIELD]);
    hasher.update(&[0u8; 4]);
    hasher.update(&header[CRC_FIELD + 4..HEADER_SIZE as usize]);
    hasher.finalize()
}

// =============================================================================
// Blob Kind / Flags
// =============================================================================

/// Role of a blob within its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum BlobKind {
    /// The record's primary payload
    Data = 0,
    /// Auxiliary description of the payload
    Metadata = 1,
}

impl BlobKind {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(BlobKind::Data),
            1 => Some(BlobKind::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Data => write!(f, "data"),
            BlobKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// Storage transforms applied to a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BlobFlags(u16);

impl BlobFlags {
    pub const NONE: BlobFlags = BlobFlags(0);

    /// Payload is stored as an LZ4 block
    pub const COMPRESSED_LZ4: BlobFlags = BlobFlags(1);

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Self {
        BlobFlags(bits)
    }

    pub fn contains(self, other: BlobFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_compressed(self) -> bool {
        self.contains(BlobFlags::COMPRESSED_LZ4)
    }
}

impl std::ops::BitOr for BlobFlags {
    type Output = BlobFlags;

    fn bitor(self, rhs: BlobFlags) -> BlobFlags {
        BlobFlags(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_kind_codes() {
        assert_eq!(BlobKind::Data.as_u16(), 0);
        assert_eq!(BlobKind::Metadata.as_u16(), 1);
        assert_eq!(BlobKind::from_u16(1), Some(BlobKind::Metadata));
        assert_eq!(BlobKind::from_u16(7), None);
        assert!(BlobKind::Data < BlobKind::Metadata);
    }

    #[test]
    fn test_flags() {
        assert!(!BlobFlags::NONE.is_compressed());
        assert!(BlobFlags::COMPRESSED_LZ4.is_compressed());
        assert!((BlobFlags::NONE | BlobFlags::COMPRESSED_LZ4).contains(BlobFlags::COMPRESSED_LZ4));
        assert!(BlobFlags::from_bits(3).is_compressed());
    }

    #[test]
    fn test_header_crc_ignores_crc_field() {
        let mut header = [7u8; HEADER_SIZE as usize];
        let crc = header_crc(&header);
        header[CRC_FIELD..CRC_FIELD + 4].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(header_crc(&header), crc);
        header[20] ^= 1;
        assert_ne!(header_crc(&header), crc);
    }
}
