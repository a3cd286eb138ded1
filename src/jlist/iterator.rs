//! JList Iterator
//!
//! Sequential iteration over terminator-delimited entries.

use crate::codec::read_cstr;
use crate::error::Result;

/// Iterator over JList entries in ascending key order
pub struct JListIter<'a> {
    bytes: &'a [u8],
    /// Next entry starts here
    pos: u64,
    /// Stop at this offset (end of chunk or start of index table)
    end: u64,
}

impl<'a> JListIter<'a> {
    pub(super) fn new(bytes: &'a [u8], start: u64, end: u64) -> Self {
        Self {
            bytes,
            pos: start,
            end,
        }
    }
}

impl<'a> Iterator for JListIter<'a> {
    /// (key, value) borrowed from the JList bytes
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }

        let entry = read_cstr(self.bytes, self.pos, self.end, "JList key").and_then(|key| {
            let value_pos = self.pos + key.len() as u64 + 1;
            let value = read_cstr(self.bytes, value_pos, self.end, "JList value")?;
            Ok((key, value))
        });

        match entry {
            Ok((key, value)) => {
                self.pos += key.len() as u64 + 1 + value.len() as u64 + 1;
                Some(Ok((key, value)))
            }
            Err(e) => {
                // Corrupt entry: nothing after it can be trusted
                self.pos = self.end;
                Some(Err(e))
            }
        }
    }
}
