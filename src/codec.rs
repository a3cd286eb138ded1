//! Bounds-checked little-endian decoding helpers
//!
//! Every on-disk structure is read straight out of a borrowed byte slice.
//! These helpers turn an out-of-range read into `ShardError::Format` instead
//! of a panic, naming the field that was being decoded.

use crate::error::{Result, ShardError};

/// Borrow `len` bytes at `offset`, or fail naming `what`
pub(crate) fn slice<'a>(bytes: &'a [u8], offset: u64, len: u64, what: &str) -> Result<&'a [u8]> {
    let start = usize::try_from(offset)
        .map_err(|_| ShardError::format(format!("{} offset {} too large", what, offset)))?;
    let len = usize::try_from(len)
        .map_err(|_| ShardError::format(format!("{} length {} too large", what, len)))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| ShardError::format(format!("{} range overflows", what)))?;
    bytes.get(start..end).ok_or_else(|| {
        ShardError::format(format!(
            "Truncated {}: need bytes {}..{}, have {}",
            what,
            start,
            end,
            bytes.len()
        ))
    })
}

pub(crate) fn read_u8(bytes: &[u8], offset: u64, what: &str) -> Result<u8> {
    Ok(slice(bytes, offset, 1, what)?[0])
}

pub(crate) fn read_u16(bytes: &[u8], offset: u64, what: &str) -> Result<u16> {
    let b = slice(bytes, offset, 2, what)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(bytes: &[u8], offset: u64, what: &str) -> Result<u32> {
    let b = slice(bytes, offset, 4, what)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_u64(bytes: &[u8], offset: u64, what: &str) -> Result<u64> {
    let b = slice(bytes, offset, 8, what)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(b);
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f64(bytes: &[u8], offset: u64, what: &str) -> Result<f64> {
    Ok(f64::from_bits(read_u64(bytes, offset, what)?))
}

/// Read a NUL-terminated string starting at `offset`, stopping before `end`.
///
/// Returns the bytes without the terminator.
pub(crate) fn read_cstr<'a>(bytes: &'a [u8], offset: u64, end: u64, what: &str) -> Result<&'a [u8]> {
    let region = slice(bytes, offset, end.saturating_sub(offset), what)?;
    match region.iter().position(|&b| b == 0) {
        Some(nul) => Ok(&region[..nul]),
        None => Err(ShardError::format(format!(
            "Unterminated {} at offset {}",
            what, offset
        ))),
    }
}

/// Round `n` up to the next multiple of `align` (a power of two)
pub(crate) fn align_up(n: u64, align: u64) -> u64 {
    (n + (align - 1)) & !(align - 1)
}
