//! Shard Reader
//!
//! Memory-maps a shard and validates its header and tables up front. Blob
//! headers are decoded only when their record is looked up, so damage inside
//! one record does not prevent reading its siblings.

use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::codec::{read_u16, read_u32, read_u64, slice};
use crate::error::{Result, ShardError};

use super::name::{parse_hex_name, RAW_NAME_LEN};
use super::record::Record;
use super::{header_crc, CRC_FIELD, HEADER_SIZE, MAGIC, RECORD_ENTRY_SIZE, VERSION};

/// An open, read-only shard
pub struct ShardFile {
    path: PathBuf,
    mmap: Mmap,
    record_count: u64,
    records_start: u64,
    string_table_start: u64,
    string_table_len: u64,
}

impl ShardFile {
    /// Open and validate the shard at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE {
            warn!(path = %path.display(), len, "Rejected truncated shard");
            return Err(ShardError::format(format!(
                "Shard too small: {} bytes, header needs {}",
                len, HEADER_SIZE
            )));
        }

        // SAFETY: shards are immutable once persisted; the map is read-only.
        let mmap = unsafe { Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;

        let magic = slice(bytes, 0, MAGIC.len() as u64, "shard magic")?;
        if magic != MAGIC {
            warn!(path = %path.display(), "Rejected shard with bad magic");
            return Err(ShardError::format(format!(
                "Invalid shard magic: expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(magic)
            )));
        }

        let version = read_u16(bytes, 10, "shard version")?;
        if version != VERSION {
            return Err(ShardError::format(format!(
                "Unsupported shard version: {} (expected {})",
                version, VERSION
            )));
        }

        let stored_crc = read_u32(bytes, CRC_FIELD as u64, "shard header crc")?;
        let actual_crc = header_crc(&bytes[..HEADER_SIZE as usize]);
        if stored_crc != actual_crc {
            warn!(path = %path.display(), "Rejected shard with corrupt header");
            return Err(ShardError::ChecksumMismatch {
                expected: format!("{:08x}", stored_crc),
                actual: format!("{:08x}", actual_crc),
            });
        }

        let record_count = read_u64(bytes, 16, "shard record count")?;
        let records_start = read_u64(bytes, 24, "shard record table offset")?;
        let string_table_start = read_u64(bytes, 32, "shard string table offset")?;
        let string_table_len = read_u64(bytes, 40, "shard string table length")?;

        let records_len = record_count
            .checked_mul(RECORD_ENTRY_SIZE)
            .ok_or_else(|| ShardError::format("Shard record count overflows"))?;
        if records_start < HEADER_SIZE {
            return Err(ShardError::format("Shard record table overlaps the header"));
        }
        let records = slice(bytes, records_start, records_len, "shard record table")?;
        slice(bytes, string_table_start, string_table_len, "shard string table")?;

        // Binary search needs strictly ascending names
        for (prev, next) in records
            .chunks_exact(RECORD_ENTRY_SIZE as usize)
            .zip(records.chunks_exact(RECORD_ENTRY_SIZE as usize).skip(1))
        {
            if prev[..RAW_NAME_LEN] >= next[..RAW_NAME_LEN] {
                return Err(ShardError::format("Shard record table is not sorted"));
            }
        }

        debug!(
            path = %path.display(),
            records = record_count,
            bytes = len,
            "Opened shard"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            record_count,
            records_start,
            string_table_start,
            string_table_len,
        })
    }

    fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn strings(&self) -> Result<&[u8]> {
        slice(
            self.bytes(),
            self.string_table_start,
            self.string_table_len,
            "shard string table",
        )
    }

    fn entry_offset(&self, index: u64) -> u64 {
        self.records_start + index * RECORD_ENTRY_SIZE
    }

    fn raw_name_at(&self, index: u64) -> Result<&[u8]> {
        slice(
            self.bytes(),
            self.entry_offset(index),
            RAW_NAME_LEN as u64,
            "record name",
        )
    }

    fn record_at(&self, index: u64) -> Result<Record<'_>> {
        Record::parse(self.bytes(), self.strings()?, self.entry_offset(index))
    }

    /// Look up a record by its 40-character hex name
    pub fn find_record_by_hex_name(&self, name: &str) -> Result<Option<Record<'_>>> {
        let raw = parse_hex_name(name)?;
        self.find_record_by_raw_name(&raw)
    }

    /// Look up a record by its raw 20-byte name
    pub fn find_record_by_raw_name(&self, name: &[u8; RAW_NAME_LEN]) -> Result<Option<Record<'_>>> {
        let mut lo = 0u64;
        let mut hi = self.record_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.raw_name_at(mid)?.cmp(&name[..]) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return self.record_at(mid).map(Some),
            }
        }
        Ok(None)
    }

    /// All records in name order
    pub fn records(&self) -> Records<'_> {
        Records {
            file: self,
            next: 0,
        }
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the mapped file in bytes
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Unmap the file
    ///
    /// Consumes the shard, so it cannot be called while any record, blob, or
    /// loaded view still borrows from it.
    pub fn close(self) {
        debug!(path = %self.path.display(), "Closed shard");
    }
}

impl std::fmt::Debug for ShardFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardFile")
            .field("path", &self.path)
            .field("records", &self.record_count)
            .field("len", &self.mmap.len())
            .finish()
    }
}

/// Iterator over the records of a shard
pub struct Records<'a> {
    file: &'a ShardFile,
    next: u64,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.record_count {
            return None;
        }
        let record = self.file.record_at(self.next);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.file.record_count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::{BlobFlags, BlobKind, ShardWriter};
    use tempfile::TempDir;

    fn name(i: u8) -> String {
        format!("{:040x}", i)
    }

    fn write_shard(dir: &TempDir, n: u8) -> PathBuf {
        let path = dir.path().join("test.shard");
        let mut writer = ShardWriter::new();
        for i in (0..n).rev() {
            writer.add_record(&name(i)).unwrap();
            writer
                .add_blob(BlobKind::Data, vec![i; i as usize], "application/octet-stream", BlobFlags::NONE)
                .unwrap();
        }
        writer.write(&path).unwrap();
        path
    }

    #[test]
    fn test_find_every_record() {
        let dir = TempDir::new().unwrap();
        let path = write_shard(&dir, 20);
        let shard = ShardFile::open(&path).unwrap();
        assert_eq!(shard.record_count(), 20);
        for i in 0..20u8 {
            let record = shard.find_record_by_hex_name(&name(i)).unwrap().unwrap();
            assert_eq!(record.hex_name(), name(i));
            let blob = record.data().unwrap();
            assert_eq!(blob.raw_bytes(), vec![i; i as usize].as_slice());
            assert!(record.metadata().is_none());
        }
        assert!(shard.find_record_by_hex_name(&name(99)).unwrap().is_none());
    }

    #[test]
    fn test_records_in_name_order() {
        let dir = TempDir::new().unwrap();
        let path = write_shard(&dir, 5);
        let shard = ShardFile::open(&path).unwrap();
        let names: Vec<String> = shard
            .records()
            .map(|r| r.map(|r| r.hex_name()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names, (0..5).map(name).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_shard() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.shard");
        ShardWriter::new().write(&path).unwrap();
        let shard = ShardFile::open(&path).unwrap();
        assert!(shard.is_empty());
        assert_eq!(shard.records().count(), 0);
        assert!(shard.find_record_by_hex_name(&name(1)).unwrap().is_none());
        shard.close();
    }

    #[test]
    fn test_header_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let path = write_shard(&dir, 3);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[16] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();
        let err = ShardFile::open(&path).unwrap_err();
        assert!(matches!(err, ShardError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.shard");
        std::fs::write(&path, b"ShardV2 ").unwrap();
        assert!(ShardFile::open(&path).unwrap_err().is_format_error());
    }

    #[test]
    fn test_invalid_hex_name() {
        let dir = TempDir::new().unwrap();
        let path = write_shard(&dir, 1);
        let shard = ShardFile::open(&path).unwrap();
        let err = shard.find_record_by_hex_name("not-hex").unwrap_err();
        assert!(matches!(err, ShardError::InvalidName(_)));
    }
}
