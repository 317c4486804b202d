//! Chain verification with deterministic spot sampling.
//!
//! Sample positions are a pure function of the chain length, the difficulty,
//! and the first and last hashes. A prover cannot retry a submission hoping
//! for easier samples, and two verifiers always check the same positions.

use std::collections::BTreeSet;

use crate::beat::{sha256_hex, verify_beat, Beat};

/// Result of a chain verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// True when every linkage and every sampled beat checked out.
    pub valid: bool,

    /// Number of beats whose hash chains were recomputed.
    pub checked: usize,

    /// Indices that failed linkage or recomputation, ascending.
    pub failed: Vec<usize>,
}

/// Picks the set of beat indices to spot-check, ascending.
///
/// Index 0 and `n - 1` are always sampled; `n / 2` joins at `n >= 4`, and
/// `n / 4` with `3n / 4` at `n >= 8`. Further positions are drawn by
/// iterating `material = SHA-256(material)` from
/// `"{n}:{difficulty}:{first_hash}:{last_hash}"`, taking the first 32 bits of
/// each digest modulo `n`. The result never exceeds `n` distinct positions.
#[must_use]
pub fn sample_indices(
    n: usize,
    difficulty: u32,
    first_hash: &str,
    last_hash: &str,
    count: usize,
) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }

    let mut picked = BTreeSet::new();
    picked.insert(0);
    picked.insert(n - 1);
    if n >= 4 {
        picked.insert(n / 2);
    }
    if n >= 8 {
        picked.insert(n / 4);
        picked.insert(3 * n / 4);
    }

    let target = count.min(n);
    let mut material = format!("{n}:{difficulty}:{first_hash}:{last_hash}");
    while picked.len() < target {
        material = sha256_hex(material.as_bytes());
        // First 32 bits of the digest, i.e. the first 8 hex characters.
        let word = u32::from_str_radix(&material[..8], 16).unwrap_or(0);
        picked.insert(word as usize % n);
    }

    picked.into_iter().collect()
}

/// Verifies linkage across `beats` and recomputes a deterministic sample of
/// them at the given difficulty.
#[must_use]
pub fn verify_beat_chain(beats: &[Beat], difficulty: u32, spot_count: usize) -> ChainVerification {
    if beats.is_empty() {
        return ChainVerification {
            valid: false,
            checked: 0,
            failed: Vec::new(),
        };
    }

    let mut failed = BTreeSet::new();

    for i in 1..beats.len() {
        if beats[i].prev != beats[i - 1].hash {
            failed.insert(i);
        }
    }

    let samples = sample_indices(
        beats.len(),
        difficulty,
        &beats[0].hash,
        &beats[beats.len() - 1].hash,
        spot_count,
    );
    for &idx in &samples {
        if !verify_beat(&beats[idx], difficulty) {
            failed.insert(idx);
        }
    }

    ChainVerification {
        valid: failed.is_empty(),
        checked: samples.len(),
        failed: failed.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beat::compute_beat;

    const GENESIS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    fn make_chain(len: usize, difficulty: u32) -> Vec<Beat> {
        let mut beats = Vec::with_capacity(len);
        let mut prev = GENESIS.to_string();
        for i in 0..len {
            let beat = compute_beat(&prev, i as u64, difficulty, None, None);
            prev = beat.hash.clone();
            beats.push(beat);
        }
        beats
    }

    #[test]
    fn sampling_always_includes_endpoints() {
        for n in [1, 2, 3, 5, 100] {
            let samples = sample_indices(n, 10, "aa", "bb", 1);
            assert!(samples.contains(&0), "n={n}");
            assert!(samples.contains(&(n - 1)), "n={n}");
        }
    }

    #[test]
    fn sampling_adds_quartiles_with_size() {
        let samples = sample_indices(8, 10, "aa", "bb", 1);
        assert!(samples.contains(&4));
        assert!(samples.contains(&2));
        assert!(samples.contains(&6));
    }

    #[test]
    fn sampling_is_deterministic() {
        let a = sample_indices(100, 500, "first", "last", 12);
        let b = sample_indices(100, 500, "first", "last", 12);
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn sampling_varies_with_inputs() {
        let base = sample_indices(1000, 500, "first", "last", 25);
        assert_ne!(base, sample_indices(1000, 501, "first", "last", 25));
        assert_ne!(base, sample_indices(1000, 500, "other", "last", 25));
        assert_ne!(base, sample_indices(1000, 500, "first", "other", 25));
    }

    #[test]
    fn sampling_caps_at_chain_length() {
        let samples = sample_indices(5, 10, "aa", "bb", 100);
        assert_eq!(samples, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn valid_chain_verifies() {
        let beats = make_chain(5, 10);
        let result = verify_beat_chain(&beats, 10, 3);
        assert!(result.valid);
        assert!(result.checked >= 3);
        assert!(result.failed.is_empty());
    }

    #[test]
    fn broken_linkage_is_reported() {
        let mut beats = make_chain(5, 10);
        beats[3].prev = GENESIS.to_string();
        let result = verify_beat_chain(&beats, 10, 3);
        assert!(!result.valid);
        assert!(result.failed.contains(&3));
    }

    #[test]
    fn forged_sampled_beat_is_reported() {
        let mut beats = make_chain(9, 10);
        // Index 0 is always sampled.
        beats[0].hash = sha256_hex(b"forged");
        let result = verify_beat_chain(&beats, 10, 3);
        assert!(!result.valid);
        assert!(result.failed.contains(&0));
    }

    #[test]
    fn empty_chain_is_invalid() {
        let result = verify_beat_chain(&[], 10, 3);
        assert!(!result.valid);
        assert_eq!(result.checked, 0);
    }

    #[test]
    fn single_beat_chain() {
        let beats = make_chain(1, 10);
        let result = verify_beat_chain(&beats, 10, 3);
        assert!(result.valid);
        assert_eq!(result.checked, 1);
    }
}
