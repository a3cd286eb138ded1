//! Bloom Filter Module
//!
//! Probabilistic set membership: no false negatives, tunable false-positive
//! rate. Used standalone and embedded in JLists and alias tables to answer
//! "definitely absent" without touching the data region.
//!
//! ## Sizing
//! For `n` expected items and target rate `p`:
//! - bits   `m = ceil(-n·ln(p) / ln(2)²)`, rounded up to a multiple of 32
//! - hashes `k = max(1, round((m/n)·ln(2)))`
//!
//! Loading more than `n` items is allowed; the false-positive rate then grows
//! past `p`. The builder warns once when that happens.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (40 bytes, little-endian)                         │
//! │   Magic "BloomV1 " (8) | HashAlgo u32 | Seed u32         │
//! │   FpRate f64 | Designed u32 | Inserted u32               │
//! │   Bits u32 (m) | Hashes u32 (k)                          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Bit array (m / 8 bytes): bit i = byte i/8, bit i%8       │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod filter;
mod view;

pub use filter::BloomFilter;
pub use view::BloomFilterRef;

use xxhash_rust::xxh3::xxh3_64_with_seed;

// =============================================================================
// Shared Constants (used by filter and view)
// =============================================================================

/// Magic bytes identifying a serialized bloom filter
pub(crate) const MAGIC: &[u8; 8] = b"BloomV1 ";

/// Header size in bytes
pub(crate) const HEADER_SIZE: u64 = 40;

/// Hash algorithm id: xxh3-64 digest split into two halves for double hashing
pub(crate) const HASH_XXH3_DOUBLE: u32 = 1;

/// Largest hash count a filter may declare
pub(crate) const MAX_HASHES: u32 = 64;

/// Media type of a standalone bloom filter blob
pub const MEDIA_TYPE: &str = "application/x-shard-bloom-filter";

/// Bit positions for `item`, derived from one seeded xxh3 digest
/// (Kirsch-Mitzenmacher: `h1 + i·h2 mod m`).
pub(crate) fn bit_positions(item: &[u8], seed: u32, n_bits: u32, n_hashes: u32) -> impl Iterator<Item = u32> {
    let digest = xxh3_64_with_seed(item, u64::from(seed));
    let h1 = digest & 0xFFFF_FFFF;
    // Odd step so consecutive probes never collapse onto one bit
    let h2 = (digest >> 32) | 1;
    let m = u64::from(n_bits);
    (0..u64::from(n_hashes)).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as u32)
}

/// Optimal `(n_bits, n_hashes)` for `n` items at false-positive rate `p`
pub(crate) fn optimal_params(n: u32, p: f64) -> (u32, u32) {
    let n = f64::from(n.max(1));
    let ln2 = std::f64::consts::LN_2;
    let optimal_bits = (-(n * p.ln()) / (ln2 * ln2)).ceil() as u64;
    let n_bits = ((optimal_bits / 32) + 1) * 32;
    let n_bits = n_bits.min(u64::from(u32::MAX) & !31) as u32;
    let n_hashes = ((f64::from(n_bits) / n) * ln2).round().max(1.0) as u32;
    let n_hashes = n_hashes.min(MAX_HASHES);
    (n_bits, n_hashes)
}
