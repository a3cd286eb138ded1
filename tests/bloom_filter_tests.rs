//! Tests for bloom filters
//!
//! These tests verify:
//! - No false negatives
//! - Measured false positive rate near the configured target
//! - Serialized filters answer exactly like the in-memory filter
//! - Capacity tracking and parameter validation

use shardkv::{BloomFilter, BloomFilterRef, ShardError};

// =============================================================================
// Helper Functions
// =============================================================================

fn member(i: usize) -> Vec<u8> {
    format!("member-{}", i).into_bytes()
}

fn stranger(i: usize) -> Vec<u8> {
    format!("stranger-{}", i).into_bytes()
}

fn filled(n: usize, p: f64) -> BloomFilter {
    let mut filter = BloomFilter::new_for_params(n, p).unwrap();
    for i in 0..n {
        filter.add(&member(i));
    }
    filter
}

// =============================================================================
// Membership Tests
// =============================================================================

#[test]
fn test_no_false_negatives() {
    let filter = filled(10_000, 0.01);
    for i in 0..10_000 {
        assert!(filter.contains(&member(i)));
    }
}

#[test]
fn test_false_positive_rate_near_target() {
    for p in [0.1, 0.01] {
        let filter = filled(10_000, p);
        let trials = 50_000;
        let hits = (0..trials).filter(|&i| filter.contains(&stranger(i))).count();
        let measured = hits as f64 / trials as f64;
        assert!(measured < p * 2.0, "p={} measured={}", p, measured);
    }
}

#[test]
fn test_serialized_view_matches() {
    let filter = filled(2_000, 0.01);
    let bytes = filter.to_bytes();
    let view = BloomFilterRef::open(&bytes).unwrap();

    assert_eq!(view.bit_count(), filter.bit_count());
    assert_eq!(view.hash_count(), filter.hash_count());
    assert_eq!(view.inserted_count(), 2_000);
    assert_eq!(view.expected_item_count(), 2_000);
    assert_eq!(view.encoded_len(), bytes.len() as u64);
    for i in 0..5_000 {
        assert_eq!(view.contains(&member(i)), filter.contains(&member(i)));
        assert_eq!(view.contains(&stranger(i)), filter.contains(&stranger(i)));
    }
}

#[test]
fn test_bit_count_multiple_of_32() {
    for n in [1usize, 3, 100, 12_345] {
        let filter = BloomFilter::new_for_params(n, 0.05).unwrap();
        assert_eq!(filter.bit_count() % 32, 0);
        assert!(filter.hash_count() >= 1);
    }
}

// =============================================================================
// Capacity / Validation Tests
// =============================================================================

#[test]
fn test_over_capacity_flag() {
    let mut filter = filled(10, 0.01);
    assert!(!filter.is_over_capacity());
    filter.add(b"one too many");
    assert!(filter.is_over_capacity());
    assert!(filter.contains(b"one too many"));

    let view_bytes = filter.to_bytes();
    assert!(BloomFilterRef::open(&view_bytes).unwrap().is_over_capacity());
}

#[test]
fn test_invalid_fp_rate_rejected() {
    for p in [0.0, 1.0, -0.5, 2.0, f64::NAN] {
        let err = BloomFilter::new_for_params(10, p).unwrap_err();
        assert!(matches!(err, ShardError::Config(_)), "p={}", p);
    }
}

#[test]
fn test_corrupt_view_rejected() {
    let bytes = filled(100, 0.01).to_bytes();

    let mut bad_magic = bytes.to_vec();
    bad_magic[0] = b'X';
    assert!(BloomFilterRef::open(&bad_magic).unwrap_err().is_format_error());

    let truncated = &bytes[..bytes.len() - 1];
    assert!(BloomFilterRef::open(truncated).unwrap_err().is_format_error());

    assert!(BloomFilterRef::open(&bytes[..10]).unwrap_err().is_format_error());
}

#[test]
fn test_implausible_hash_count_rejected() {
    let mut bytes = filled(100, 0.01).to_bytes().to_vec();
    bytes[0x24..0x28].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(BloomFilterRef::open(&bytes).unwrap_err().is_format_error());

    bytes[0x24..0x28].copy_from_slice(&65u32.to_le_bytes());
    assert!(BloomFilterRef::open(&bytes).unwrap_err().is_format_error());

    bytes[0x24..0x28].copy_from_slice(&64u32.to_le_bytes());
    BloomFilterRef::open(&bytes).unwrap();
}
