//! # shardkv
//!
//! Write-once, read-many key-value lookup structures packed into immutable
//! shard files:
//! - JList: sorted list with a sparse chunk index (ordered keys, O(√n) scans)
//! - Alias Table: static hash table with bounded probing
//! - Bloom Filter: fast negative answers, standalone or embedded
//! - Shard: container of named records holding typed, checksummed blobs
//!
//! Every reader is a zero-copy view borrowing from the bytes it was opened
//! on, usually a memory-mapped `ShardFile`.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌─────────────┐  ┌──────────────────┐  ┌─────────────┐
//!   │ JListWriter │  │ AliasTableWriter │  │ BloomFilter │
//!   └──────┬──────┘  └────────┬─────────┘  └──────┬──────┘
//!          │   Bytes          │   Bytes           │   Bytes
//!          └─────────────┬────┴───────────────────┘
//!                        ▼
//!               ┌─────────────────┐   temp file + rename
//!               │   ShardWriter   │ ─────────────────────▶ shard file
//!               └─────────────────┘
//!
//!               ┌─────────────────┐   mmap
//!               │    ShardFile    │ ◀───────────────────── shard file
//!               └────────┬────────┘
//!                        │ Record<'a> → Blob<'a>
//!          ┌─────────────┼───────────────────┐
//!          ▼             ▼                   ▼
//!   ┌─────────────┐ ┌─────────────────┐ ┌────────────────────┐
//!   │  JList<'a>  │ │ AliasTable<'a>  │ │ BloomFilterRef<'a> │
//!   └─────────────┘ └─────────────────┘ └────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

mod codec;

pub mod bloom;
pub mod jlist;
pub mod alias;
pub mod shard;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ShardError};
pub use config::{ChunkSizing, Config};

pub use alias::{AliasTable, AliasTableWriter};
pub use bloom::{BloomFilter, BloomFilterRef};
pub use jlist::{JList, JListWriter};
pub use shard::{Blob, BlobFlags, BlobKind, BlobLoader, LoadedBlob, Record, ShardFile, ShardWriter};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
