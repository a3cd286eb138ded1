//! Alias Table Module
//!
//! Static hash table for a fixed key set. Built once, then probed in place.
//!
//! ## Responsibilities
//! - Expected O(1) point lookups, independent of key order
//! - Bounded probing: the longest probe sequence seen at build time is
//!   recorded and no lookup ever probes further
//! - Fast negatives through an embedded bloom filter
//!
//! Slots use linear probing over a power-of-two table kept at most half full
//! by default. Each slot stores a 32-bit fingerprint (upper half of the key
//! hash) so that most non-matching slots are rejected without touching the
//! data region.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes, little-endian)                           │
//! │   Magic "ATblV1  " (8) | EntryCount u64 | SlotCount u64    │
//! │   Seed u64 | MaxProbe u32 | HashAlgo u32                   │
//! │   SlotsOffset u64 | DataOffset u64 | BloomOffset u64       │
//! ├────────────────────────────────────────────────────────────┤
//! │ Slots: [Fingerprint u32][Reserved u32][EntryRef u64]       │
//! │   EntryRef = offset into data region + 1, 0 = empty        │
//! ├────────────────────────────────────────────────────────────┤
//! │ Data: [KeyLen u32][ValLen u32][Key][Value] per entry       │
//! ├────────────────────────────────────────────────────────────┤
//! │ Bloom Filter (optional)                                    │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod table;
mod writer;

pub use table::AliasTable;
pub use writer::AliasTableWriter;

use xxhash_rust::xxh3::xxh3_64_with_seed;

// =============================================================================
// Shared Constants (used by writer and table)
// =============================================================================

/// Magic bytes identifying an alias table
pub(crate) const MAGIC: &[u8; 8] = b"ATblV1  ";

/// Header size in bytes
pub(crate) const HEADER_SIZE: u64 = 64;

/// Slot size: fingerprint (4) + reserved (4) + entry ref (8)
pub(crate) const SLOT_SIZE: u64 = 16;

/// Entry header size: key len (4) + value len (4)
pub(crate) const ENTRY_HEADER_SIZE: u64 = 8;

/// Hash algorithm id: seeded xxh3-64
pub(crate) const HASH_XXH3: u32 = 1;

/// Media type of an alias table blob
pub const MEDIA_TYPE: &str = "application/x-shard-alias-table";

/// Record name under which `write_to_shard` stores the table
pub const ALIAS_TABLE_RECORD_NAME: &str = "7ab1e5a11a5000000000000000000000000000a1";

/// Home slot and fingerprint for `key`
pub(crate) fn slot_and_fingerprint(key: &[u8], seed: u64, slot_mask: u64) -> (u64, u32) {
    let h = xxh3_64_with_seed(key, seed);
    (h & slot_mask, (h >> 32) as u32)
}
