//! Record and blob views borrowed from an open shard.

use std::borrow::Cow;
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::alias::AliasTable;
use crate::bloom::BloomFilterRef;
use crate::codec::{read_u16, read_u64, read_u8, read_cstr, slice};
use crate::error::{Result, ShardError};
use crate::jlist::JList;

use super::loader::{BlobLoader, LoadedBlob};
use super::name::{hex_name, RAW_NAME_LEN};
use super::{BlobFlags, BlobKind, BLOB_HEADER_SIZE, RECORD_ENTRY_SIZE};

/// A named record and its blobs
#[derive(Clone)]
pub struct Record<'a> {
    raw_name: &'a [u8; RAW_NAME_LEN],
    flags: u32,
    /// Sorted by kind
    blobs: Vec<Blob<'a>>,
}

/// A blob payload with its header fields
#[derive(Clone, Copy)]
pub struct Blob<'a> {
    kind: BlobKind,
    flags: BlobFlags,
    media_type: &'a str,
    uncompressed_size: u64,
    checksum: &'a [u8; 32],
    /// Stored bytes
    raw: &'a [u8],
}

impl<'a> Record<'a> {
    /// Decode the record table entry at `offset` and every blob it lists
    pub(super) fn parse(bytes: &'a [u8], strings: &'a [u8], offset: u64) -> Result<Self> {
        let entry = slice(bytes, offset, RECORD_ENTRY_SIZE, "record entry")?;
        let raw_name: &'a [u8; RAW_NAME_LEN] = entry[..RAW_NAME_LEN]
            .try_into()
            .map_err(|_| ShardError::format("record name truncated"))?;
        let flags = u32::from_le_bytes([entry[20], entry[21], entry[22], entry[23]]);
        let blob_count = read_u8(entry, 24, "record blob count")?;
        let table_start = read_u64(entry, 32, "record blob table offset")?;

        let mut blobs: Vec<Blob<'a>> = Vec::with_capacity(blob_count as usize);
        for i in 0..u64::from(blob_count) {
            let header_at = read_u64(bytes, table_start + 8 * i, "record blob table")?;
            let blob = Blob::parse(bytes, strings, header_at)?;
            if let Some(prev) = blobs.last() {
                if prev.kind >= blob.kind {
                    warn!(record = %hex_name(raw_name), "Rejected record with unsorted blob table");
                    return Err(ShardError::format(format!(
                        "blob table of record {} is not sorted by kind",
                        hex_name(raw_name)
                    )));
                }
            }
            blobs.push(blob);
        }

        Ok(Self {
            raw_name,
            flags,
            blobs,
        })
    }

    pub fn raw_name(&self) -> &'a [u8; RAW_NAME_LEN] {
        self.raw_name
    }

    /// Lowercase hex form of the name
    pub fn hex_name(&self) -> String {
        hex_name(self.raw_name)
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The blob of the given kind, if the record has one
    pub fn blob(&self, kind: BlobKind) -> Option<Blob<'a>> {
        self.blobs.iter().find(|b| b.kind == kind).copied()
    }

    pub fn data(&self) -> Option<Blob<'a>> {
        self.blob(BlobKind::Data)
    }

    pub fn metadata(&self) -> Option<Blob<'a>> {
        self.blob(BlobKind::Metadata)
    }

    /// All blobs, ordered by kind
    pub fn blobs(&self) -> &[Blob<'a>] {
        &self.blobs
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.hex_name())
            .field("flags", &self.flags)
            .field("blobs", &self.blobs)
            .finish()
    }
}

impl<'a> Blob<'a> {
    fn parse(bytes: &'a [u8], strings: &'a [u8], offset: u64) -> Result<Self> {
        let header = slice(bytes, offset, BLOB_HEADER_SIZE, "blob header")?;
        let kind_code = read_u16(header, 0, "blob kind")?;
        let kind = BlobKind::from_u16(kind_code)
            .ok_or_else(|| ShardError::format(format!("Unknown blob kind {}", kind_code)))?;
        let flags = BlobFlags::from_bits(read_u16(header, 2, "blob flags")?);
        let media_type_offset = read_u64(header, 8, "blob media type offset")?;
        let size = read_u64(header, 16, "blob size")?;
        let uncompressed_size = read_u64(header, 24, "blob uncompressed size")?;
        let data_start = read_u64(header, 32, "blob data offset")?;
        let checksum: &'a [u8; 32] = header[40..72]
            .try_into()
            .map_err(|_| ShardError::format("blob checksum truncated"))?;

        let media_type = read_cstr(
            strings,
            media_type_offset,
            strings.len() as u64,
            "blob media type",
        )?;
        let media_type = std::str::from_utf8(media_type)
            .map_err(|e| ShardError::format(format!("Media type is not UTF-8: {}", e)))?;
        let raw = slice(bytes, data_start, size, "blob data")?;

        if !flags.is_compressed() && uncompressed_size != size {
            return Err(ShardError::format(format!(
                "Uncompressed blob size mismatch: {} stored, {} declared",
                size, uncompressed_size
            )));
        }
        if flags.is_compressed() && uncompressed_size > max_lz4_expansion(size) {
            return Err(ShardError::format(format!(
                "Compressed blob declares {} bytes from {} stored",
                uncompressed_size, size
            )));
        }

        Ok(Self {
            kind,
            flags,
            media_type,
            uncompressed_size,
            checksum,
            raw,
        })
    }

    pub fn kind(&self) -> BlobKind {
        self.kind
    }

    pub fn media_type(&self) -> &'a str {
        self.media_type
    }

    pub fn flags(&self) -> BlobFlags {
        self.flags
    }

    /// Stored size in bytes
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Size after decompression
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// SHA-256 of the stored bytes
    pub fn checksum(&self) -> &'a [u8; 32] {
        self.checksum
    }

    /// Stored bytes, compressed if the blob is flagged so
    pub fn raw_bytes(&self) -> &'a [u8] {
        self.raw
    }

    /// Recompute the SHA-256 of the stored bytes and compare
    pub fn verify_checksum(&self) -> Result<()> {
        let actual: [u8; 32] = Sha256::digest(self.raw).into();
        if actual != *self.checksum {
            warn!(media_type = self.media_type, "Blob checksum mismatch");
            return Err(ShardError::ChecksumMismatch {
                expected: hex::encode(self.checksum),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    /// Verified payload, decompressed when needed
    ///
    /// Borrows from the shard unless the blob is compressed.
    pub fn load_contents(&self) -> Result<Cow<'a, [u8]>> {
        self.verify_checksum()?;
        if !self.flags.is_compressed() {
            return Ok(Cow::Borrowed(self.raw));
        }

        let expected = usize::try_from(self.uncompressed_size).map_err(|_| {
            ShardError::Decode(format!(
                "uncompressed size {} does not fit in memory",
                self.uncompressed_size
            ))
        })?;
        let data = lz4_flex::decompress(self.raw, expected)
            .map_err(|e| ShardError::Decode(format!("lz4 decompression failed: {}", e)))?;
        if data.len() != expected {
            return Err(ShardError::Decode(format!(
                "decompressed {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Cow::Owned(data))
    }

    /// Interpret the stored bytes as `T` without copying
    ///
    /// The media type must be `T::MEDIA_TYPE` and the blob must not be
    /// compressed. The checksum is not verified here; see `verify_checksum`.
    pub fn load_as<T: BlobLoader<'a>>(&self) -> Result<T> {
        if self.media_type != T::MEDIA_TYPE {
            return Err(ShardError::MediaTypeMismatch {
                expected: T::MEDIA_TYPE.to_string(),
                found: self.media_type.to_string(),
            });
        }
        if self.flags.is_compressed() {
            return Err(ShardError::Decode(format!(
                "{} blob is compressed and cannot be viewed in place",
                self.media_type
            )));
        }
        T::load(self.raw)
    }

    pub fn load_as_jlist(&self) -> Result<JList<'a>> {
        self.load_as()
    }

    pub fn load_as_alias_table(&self) -> Result<AliasTable<'a>> {
        self.load_as()
    }

    pub fn load_as_bloom_filter(&self) -> Result<BloomFilterRef<'a>> {
        self.load_as()
    }

    /// Decode by media type, falling back to the verified raw contents
    pub fn load(&self) -> Result<LoadedBlob<'a>> {
        LoadedBlob::from_blob(self)
    }
}

impl fmt::Debug for Blob<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("kind", &self.kind)
            .field("media_type", &self.media_type)
            .field("flags", &self.flags)
            .field("size", &self.raw.len())
            .field("uncompressed_size", &self.uncompressed_size)
            .finish()
    }
}

/// Upper bound on what LZ4 can expand `stored` bytes into
fn max_lz4_expansion(stored: u64) -> u64 {
    stored.saturating_mul(255).saturating_add(16)
}
