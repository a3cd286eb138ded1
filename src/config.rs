//! Configuration for shardkv
//!
//! Centralized build-time tunables with sensible defaults. Readers need no
//! configuration: everything required to decode a structure is recorded in
//! its header.

use crate::error::{Result, ShardError};

/// Default seed for alias table and bloom filter hashing
pub const DEFAULT_HASH_SEED: u64 = 0x5348_4152_444B_5631; // "SHARDKV1"

/// Main configuration for building shard structures
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // JList Configuration
    // -------------------------------------------------------------------------
    /// How many entries go into each JList chunk
    pub chunk_sizing: ChunkSizing,

    /// Target false-positive rate of the bloom filter embedded in a JList.
    /// `None` writes no filter.
    pub jlist_bloom_fp_rate: Option<f64>,

    // -------------------------------------------------------------------------
    // Alias Table Configuration
    // -------------------------------------------------------------------------
    /// Target false-positive rate of the bloom filter embedded in an alias
    /// table. `None` writes no filter.
    pub alias_bloom_fp_rate: Option<f64>,

    /// Upper bound on entries / slots
    pub alias_max_load_factor: f64,

    // -------------------------------------------------------------------------
    // Hashing / Container Configuration
    // -------------------------------------------------------------------------
    /// Seed recorded in every hashed structure's header
    pub hash_seed: u64,

    /// Alignment of blob headers inside a shard file (power of two)
    pub blob_alignment: u64,
}

/// Chunk size strategy for JLists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSizing {
    /// `ceil(sqrt(n))` entries per chunk: as many chunks as entries per chunk
    Sqrt,

    /// Fixed number of entries per chunk (small = bigger index, shorter scans)
    Fixed(usize),
}

impl ChunkSizing {
    /// Entries per chunk for a list of `entry_count` entries (always >= 1)
    pub fn chunk_size(&self, entry_count: usize) -> usize {
        match *self {
            ChunkSizing::Sqrt => ((entry_count as f64).sqrt().ceil() as usize).max(1),
            ChunkSizing::Fixed(n) => n.max(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_sizing: ChunkSizing::Sqrt,
            jlist_bloom_fp_rate: None,
            alias_bloom_fp_rate: Some(0.01),
            alias_max_load_factor: 0.5,
            hash_seed: DEFAULT_HASH_SEED,
            blob_alignment: 0x20,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that every tunable is in range
    pub fn validate(&self) -> Result<()> {
        if let ChunkSizing::Fixed(0) = self.chunk_sizing {
            return Err(ShardError::Config("chunk size must be at least 1".into()));
        }
        for rate in [self.jlist_bloom_fp_rate, self.alias_bloom_fp_rate]
            .into_iter()
            .flatten()
        {
            validate_fp_rate(rate)?;
        }
        if !(self.alias_max_load_factor > 0.0 && self.alias_max_load_factor < 1.0) {
            return Err(ShardError::Config(format!(
                "alias table load factor must be in (0, 1), got {}",
                self.alias_max_load_factor
            )));
        }
        if !self.blob_alignment.is_power_of_two() {
            return Err(ShardError::Config(format!(
                "blob alignment must be a power of two, got {}",
                self.blob_alignment
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_fp_rate(rate: f64) -> Result<()> {
    if rate > 0.0 && rate < 1.0 {
        Ok(())
    } else {
        Err(ShardError::Config(format!(
            "false positive rate must be in (0, 1), got {}",
            rate
        )))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the JList chunk sizing strategy
    pub fn chunk_sizing(mut self, sizing: ChunkSizing) -> Self {
        self.config.chunk_sizing = sizing;
        self
    }

    /// Embed a bloom filter with this false-positive rate in JLists
    pub fn jlist_bloom_fp_rate(mut self, rate: Option<f64>) -> Self {
        self.config.jlist_bloom_fp_rate = rate;
        self
    }

    /// Embed a bloom filter with this false-positive rate in alias tables
    pub fn alias_bloom_fp_rate(mut self, rate: Option<f64>) -> Self {
        self.config.alias_bloom_fp_rate = rate;
        self
    }

    /// Set the alias table maximum load factor
    pub fn alias_max_load_factor(mut self, factor: f64) -> Self {
        self.config.alias_max_load_factor = factor;
        self
    }

    /// Set the hash seed
    pub fn hash_seed(mut self, seed: u64) -> Self {
        self.config.hash_seed = seed;
        self
    }

    /// Set the blob alignment (power of two)
    pub fn blob_alignment(mut self, alignment: u64) -> Self {
        self.config.blob_alignment = alignment;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_chunk_size() {
        assert_eq!(ChunkSizing::Sqrt.chunk_size(0), 1);
        assert_eq!(ChunkSizing::Sqrt.chunk_size(1), 1);
        assert_eq!(ChunkSizing::Sqrt.chunk_size(10), 4);
        assert_eq!(ChunkSizing::Sqrt.chunk_size(100), 10);
        assert_eq!(ChunkSizing::Sqrt.chunk_size(101), 11);
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_rate = Config::builder().jlist_bloom_fp_rate(Some(1.5)).build();
        assert!(matches!(bad_rate.validate(), Err(ShardError::Config(_))));

        let bad_chunk = Config::builder().chunk_sizing(ChunkSizing::Fixed(0)).build();
        assert!(matches!(bad_chunk.validate(), Err(ShardError::Config(_))));

        let bad_load = Config::builder().alias_max_load_factor(1.0).build();
        assert!(matches!(bad_load.validate(), Err(ShardError::Config(_))));

        let bad_align = Config::builder().blob_alignment(24).build();
        assert!(matches!(bad_align.validate(), Err(ShardError::Config(_))));
    }
}
