//! Shard Writer
//!
//! Buffers records and blobs in memory, then lays out and writes the whole
//! shard in one pass. The file only appears at its final path once it is
//! complete and synced.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::codec::align_up;
use crate::config::Config;
use crate::error::{Result, ShardError};

use super::name::{hex_name, parse_hex_name, RAW_NAME_LEN};
use super::{
    header_crc, BlobFlags, BlobKind, BLOB_HEADER_SIZE, CRC_FIELD, HEADER_SIZE, MAGIC,
    MAX_MEDIA_TYPE_LEN, RECORD_ENTRY_SIZE, VERSION,
};

/// Metadata about a shard written by `ShardWriter::write`
#[derive(Debug, Clone)]
pub struct ShardSummary {
    pub path: PathBuf,
    pub record_count: u64,
    pub blob_count: u64,
    pub file_size: u64,
}

/// A blob as it will be stored
struct PendingBlob {
    kind: BlobKind,
    flags: BlobFlags,
    media_type: String,
    /// Stored bytes (compressed when flagged)
    stored: Bytes,
    uncompressed_size: u64,
    checksum: [u8; 32],
}

/// File offsets computed before anything is written
struct Layout {
    /// Blob header offset per blob, in record then kind order
    blob_offsets: Vec<u64>,
    /// Blob table offset per record
    blob_table_offsets: Vec<u64>,
    records_start: u64,
    string_table: Vec<u8>,
    string_offsets: HashMap<String, u64>,
    string_table_start: u64,
    file_size: u64,
}

/// Builder for shard files
pub struct ShardWriter {
    config: Config,
    /// Records by raw name; blobs kept sorted by kind
    records: BTreeMap<[u8; RAW_NAME_LEN], Vec<PendingBlob>>,
    /// Record that `add_blob` attaches to
    current: Option<[u8; RAW_NAME_LEN]>,
}

impl Default for ShardWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardWriter {
    /// Create a writer with the default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            records: BTreeMap::new(),
            current: None,
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            records: BTreeMap::new(),
            current: None,
        })
    }

    /// Start a new record and make it current
    pub fn add_record(&mut self, name: &str) -> Result<()> {
        let raw = parse_hex_name(name)?;
        if self.records.contains_key(&raw) {
            return Err(ShardError::DuplicateRecord(hex_name(&raw)));
        }
        self.records.insert(raw, Vec::new());
        self.current = Some(raw);
        Ok(())
    }

    /// Attach a blob to the current record
    ///
    /// With `BlobFlags::COMPRESSED_LZ4` the payload is compressed here; the
    /// checksum always covers the bytes as stored.
    pub fn add_blob(
        &mut self,
        kind: BlobKind,
        data: impl Into<Bytes>,
        media_type: &str,
        flags: BlobFlags,
    ) -> Result<()> {
        let current = self.current.ok_or(ShardError::NoCurrentRecord)?;

        if media_type.len() > MAX_MEDIA_TYPE_LEN || media_type.as_bytes().contains(&0) {
            return Err(ShardError::InvalidEntry(format!(
                "media type must be at most {} bytes without NUL, got {:?}",
                MAX_MEDIA_TYPE_LEN, media_type
            )));
        }
        if flags.bits() & !BlobFlags::COMPRESSED_LZ4.bits() != 0 {
            return Err(ShardError::InvalidEntry(format!(
                "unknown blob flags {:#06x}",
                flags.bits()
            )));
        }

        let blobs = self
            .records
            .get_mut(&current)
            .ok_or(ShardError::NoCurrentRecord)?;
        if blobs.iter().any(|b| b.kind == kind) {
            return Err(ShardError::DuplicateBlob {
                record: hex_name(&current),
                kind: kind.to_string(),
            });
        }

        let data: Bytes = data.into();
        let uncompressed_size = data.len() as u64;
        let stored = if flags.is_compressed() {
            Bytes::from(lz4_flex::compress(&data))
        } else {
            data
        };
        let checksum: [u8; 32] = Sha256::digest(&stored).into();

        debug!(
            record = %hex_name(&current),
            kind = %kind,
            media_type,
            size = stored.len(),
            uncompressed_size,
            "Added blob"
        );

        let at = blobs.partition_point(|b| b.kind < kind);
        blobs.insert(
            at,
            PendingBlob {
                kind,
                flags,
                media_type: media_type.to_string(),
                stored,
                uncompressed_size,
                checksum,
            },
        );
        Ok(())
    }

    /// Number of records added so far
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    fn layout(&self) -> Layout {
        let align = self.config.blob_alignment;
        let mut string_table = Vec::new();
        let mut string_offsets: HashMap<String, u64> = HashMap::new();
        let mut blob_offsets = Vec::new();
        let mut pos = HEADER_SIZE;

        for blobs in self.records.values() {
            for blob in blobs {
                if !string_offsets.contains_key(&blob.media_type) {
                    string_offsets.insert(blob.media_type.clone(), string_table.len() as u64);
                    string_table.extend_from_slice(blob.media_type.as_bytes());
                    string_table.push(0);
                }
                let header_at = align_up(pos, align);
                blob_offsets.push(header_at);
                pos = header_at + BLOB_HEADER_SIZE + blob.stored.len() as u64;
            }
        }

        pos = align_up(pos, 8);
        let mut blob_table_offsets = Vec::with_capacity(self.records.len());
        for blobs in self.records.values() {
            blob_table_offsets.push(pos);
            pos += 8 * blobs.len() as u64;
        }

        let records_start = align_up(pos, 8);
        let string_table_start = records_start + RECORD_ENTRY_SIZE * self.records.len() as u64;
        let file_size = string_table_start + string_table.len() as u64;

        Layout {
            blob_offsets,
            blob_table_offsets,
            records_start,
            string_table,
            string_offsets,
            string_table_start,
            file_size,
        }
    }

    fn header(&self, layout: &Layout) -> [u8; HEADER_SIZE as usize] {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..10].copy_from_slice(&0u16.to_le_bytes());
        header[10..12].copy_from_slice(&VERSION.to_le_bytes());
        header[16..24].copy_from_slice(&(self.records.len() as u64).to_le_bytes());
        header[24..32].copy_from_slice(&layout.records_start.to_le_bytes());
        header[32..40].copy_from_slice(&layout.string_table_start.to_le_bytes());
        header[40..48].copy_from_slice(&(layout.string_table.len() as u64).to_le_bytes());
        let crc = header_crc(&header);
        header[CRC_FIELD..CRC_FIELD + 4].copy_from_slice(&crc.to_le_bytes());
        header
    }

    fn write_body<W: Write>(&self, out: &mut W, layout: &Layout) -> Result<()> {
        let mut pos = 0u64;
        out.write_all(&self.header(layout))?;
        pos += HEADER_SIZE;

        let blobs = self.records.values().flatten();
        for (blob, &header_at) in blobs.zip(&layout.blob_offsets) {
            pad_to(out, &mut pos, header_at)?;
            let media_type_offset = layout
                .string_offsets
                .get(&blob.media_type)
                .copied()
                .unwrap_or_default();
            out.write_all(&blob.kind.as_u16().to_le_bytes())?;
            out.write_all(&blob.flags.bits().to_le_bytes())?;
            out.write_all(&0u32.to_le_bytes())?;
            out.write_all(&media_type_offset.to_le_bytes())?;
            out.write_all(&(blob.stored.len() as u64).to_le_bytes())?;
            out.write_all(&blob.uncompressed_size.to_le_bytes())?;
            out.write_all(&(header_at + BLOB_HEADER_SIZE).to_le_bytes())?;
            out.write_all(&blob.checksum)?;
            out.write_all(&blob.stored)?;
            pos += BLOB_HEADER_SIZE + blob.stored.len() as u64;
        }

        // Blob tables, one per record
        let mut blob_offsets = layout.blob_offsets.iter();
        for (blobs, &table_at) in self.records.values().zip(&layout.blob_table_offsets) {
            pad_to(out, &mut pos, table_at)?;
            for offset in blob_offsets.by_ref().take(blobs.len()) {
                out.write_all(&offset.to_le_bytes())?;
                pos += 8;
            }
        }

        // Record table
        pad_to(out, &mut pos, layout.records_start)?;
        for ((name, blobs), &table_at) in self.records.iter().zip(&layout.blob_table_offsets) {
            out.write_all(name)?;
            out.write_all(&0u32.to_le_bytes())?;
            out.write_all(&[blobs.len() as u8])?;
            out.write_all(&[0u8; 7])?;
            out.write_all(&table_at.to_le_bytes())?;
            pos += RECORD_ENTRY_SIZE;
        }

        debug_assert_eq!(pos, layout.string_table_start);
        out.write_all(&layout.string_table)?;
        Ok(())
    }

    /// Write the shard to `path`, replacing any existing file atomically
    ///
    /// The bytes go to a temporary file in the destination directory, which is
    /// synced and then renamed over `path`. On error nothing is left behind.
    ///
    /// Every record must carry at least one blob.
    pub fn write(self, path: impl AsRef<Path>) -> Result<ShardSummary> {
        let path = path.as_ref();
        if let Some((name, _)) = self.records.iter().find(|(_, blobs)| blobs.is_empty()) {
            return Err(ShardError::InvalidEntry(format!(
                "record {} has no blobs",
                hex_name(name)
            )));
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let layout = self.layout();

        let tmp = tempfile::Builder::new()
            .prefix(".shard-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        let mut out = BufWriter::new(tmp);
        self.write_body(&mut out, &layout)?;
        out.flush()?;
        let tmp = out.into_inner().map_err(|e| ShardError::Io(e.into_error()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ShardError::Io(e.error))?;

        let summary = ShardSummary {
            path: path.to_path_buf(),
            record_count: self.records.len() as u64,
            blob_count: layout.blob_offsets.len() as u64,
            file_size: layout.file_size,
        };
        info!(
            path = %path.display(),
            records = summary.record_count,
            blobs = summary.blob_count,
            bytes = summary.file_size,
            "Wrote shard"
        );
        Ok(summary)
    }
}

/// Write zero bytes until `*pos` reaches `target`
fn pad_to<W: Write>(out: &mut W, pos: &mut u64, target: u64) -> Result<()> {
    const ZEROS: [u8; 64] = [0u8; 64];
    while *pos < target {
        let n = (target - *pos).min(ZEROS.len() as u64);
        out.write_all(&ZEROS[..n as usize])?;
        *pos += n;
    }
    Ok(())
}
