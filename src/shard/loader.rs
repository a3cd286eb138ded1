//! Blob loaders: typed zero-copy views over blob payloads, keyed by media type.

use std::borrow::Cow;

use crate::alias::{self, AliasTable};
use crate::bloom::{self, BloomFilterRef};
use crate::error::Result;
use crate::jlist::{self, JList};

use super::record::Blob;

/// A structure that can be opened in place over a blob's bytes
pub trait BlobLoader<'a>: Sized {
    /// Media type a blob must carry to be loaded as `Self`
    const MEDIA_TYPE: &'static str;

    fn load(bytes: &'a [u8]) -> Result<Self>;
}

impl<'a> BlobLoader<'a> for JList<'a> {
    const MEDIA_TYPE: &'static str = jlist::MEDIA_TYPE;

    fn load(bytes: &'a [u8]) -> Result<Self> {
        JList::open(bytes)
    }
}

impl<'a> BlobLoader<'a> for AliasTable<'a> {
    const MEDIA_TYPE: &'static str = alias::MEDIA_TYPE;

    fn load(bytes: &'a [u8]) -> Result<Self> {
        AliasTable::open(bytes)
    }
}

impl<'a> BlobLoader<'a> for BloomFilterRef<'a> {
    const MEDIA_TYPE: &'static str = bloom::MEDIA_TYPE;

    fn load(bytes: &'a [u8]) -> Result<Self> {
        BloomFilterRef::open(bytes)
    }
}

/// A blob decoded according to its media type
#[derive(Debug)]
pub enum LoadedBlob<'a> {
    JList(JList<'a>),
    AliasTable(AliasTable<'a>),
    BloomFilter(BloomFilterRef<'a>),
    /// No registered loader; verified and decompressed contents
    Raw(Cow<'a, [u8]>),
}

impl<'a> LoadedBlob<'a> {
    pub(super) fn from_blob(blob: &Blob<'a>) -> Result<Self> {
        match blob.media_type() {
            jlist::MEDIA_TYPE => blob.load_as().map(LoadedBlob::JList),
            alias::MEDIA_TYPE => blob.load_as().map(LoadedBlob::AliasTable),
            bloom::MEDIA_TYPE => blob.load_as().map(LoadedBlob::BloomFilter),
            _ => blob.load_contents().map(LoadedBlob::Raw),
        }
    }

    /// Media type this variant was decoded from, if a loader handled it
    pub fn media_type(&self) -> Option<&'static str> {
        match self {
            LoadedBlob::JList(_) => Some(<JList<'a> as BlobLoader<'a>>::MEDIA_TYPE),
            LoadedBlob::AliasTable(_) => Some(<AliasTable<'a> as BlobLoader<'a>>::MEDIA_TYPE),
            LoadedBlob::BloomFilter(_) => Some(<BloomFilterRef<'a> as BlobLoader<'a>>::MEDIA_TYPE),
            LoadedBlob::Raw(_) => None,
        }
    }
}
