//! Global anchors: published beats that serve as the canonical clock.
//!
//! Two hash formulas co-exist on the chain:
//!
//! - **V1** (legacy, no entropy): the ordinary beat formula with the nonce
//!   `anchor:{utc}:{epoch}`, iterated `difficulty` times over hex.
//! - **V3** (with entropy): a single SHA-256 over a fixed 91-byte preimage
//!   `domain(19) || prev_hash(32) || beat_index_be(8) || entropy(32)`.
//!   No difficulty iteration; unpredictability comes from the external
//!   entropy, not from work.
//!
//! An anchor with `solana_entropy` set is a V3 anchor; without it, V1.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::beat::{beat_seed, is_hex_hash, iterate_hash, sha256_hex};
use crate::constants::{ANCHOR_V3_DOMAIN, GENESIS_SEED};

/// A published anchor as reconstructed from the ledger or produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAnchor {
    /// Height of this anchor on the anchor chain.
    pub beat_index: u64,

    /// Anchor hash (V1 or V3 formula depending on `solana_entropy`).
    pub hash: String,

    /// Hash of the previous anchor, or the genesis prev hash at height 0.
    pub prev_hash: String,

    /// Wall-clock milliseconds at creation time.
    pub utc: i64,

    /// Difficulty carried by this anchor (V1 iteration count).
    pub difficulty: u32,

    /// Opaque grouping counter, carried forward unchanged.
    pub epoch: u32,

    /// Base58-encoded 32-byte external entropy (V3 anchors only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solana_entropy: Option<String>,

    /// Ledger transaction that published this anchor, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Errors from anchor construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnchorError {
    /// Difficulty must be positive.
    #[error("difficulty must be greater than zero")]
    ZeroDifficulty,

    /// `prev_hash` is not a 64-character lowercase hex string.
    #[error("prev_hash is not a 32-byte hex hash")]
    MalformedPrevHash,

    /// The entropy string did not decode to exactly 32 bytes of base58.
    #[error("entropy is not base58-encoded 32 bytes")]
    MalformedEntropy,

    /// The anchor timestamp is negative.
    #[error("utc timestamp must be non-negative")]
    NegativeUtc,
}

/// The fixed `prev_hash` of the height-0 anchor.
#[must_use]
pub fn genesis_prev_hash() -> String {
    sha256_hex(GENESIS_SEED.as_bytes())
}

/// Nonce string used by the V1 anchor formula.
#[must_use]
pub fn anchor_nonce(utc: i64, epoch: u32) -> String {
    format!("anchor:{utc}:{epoch}")
}

/// V1 anchor hash: the beat formula with the anchor nonce.
#[must_use]
pub fn compute_anchor_hash_v1(
    prev_hash: &str,
    beat_index: u64,
    utc: i64,
    difficulty: u32,
    epoch: u32,
) -> String {
    let nonce = anchor_nonce(utc, epoch);
    let seed = beat_seed(prev_hash, beat_index, Some(&nonce), None);
    iterate_hash(&seed, difficulty)
}

/// V3 anchor hash: single SHA-256 over the 91-byte domain-separated preimage.
///
/// # Errors
///
/// Fails if `prev_hash` is not 64 hex characters or `entropy_base58` does not
/// decode to exactly 32 bytes.
pub fn compute_anchor_hash_v3(
    prev_hash: &str,
    beat_index: u64,
    entropy_base58: &str,
) -> Result<String, AnchorError> {
    if !is_hex_hash(prev_hash) {
        return Err(AnchorError::MalformedPrevHash);
    }
    let prev_bytes = hex::decode(prev_hash).map_err(|_| AnchorError::MalformedPrevHash)?;
    let entropy = bs58::decode(entropy_base58)
        .into_vec()
        .map_err(|_| AnchorError::MalformedEntropy)?;
    if entropy.len() != 32 {
        return Err(AnchorError::MalformedEntropy);
    }

    let mut preimage = Vec::with_capacity(19 + 32 + 8 + 32);
    preimage.extend_from_slice(ANCHOR_V3_DOMAIN);
    preimage.extend_from_slice(&prev_bytes);
    preimage.extend_from_slice(&beat_index.to_be_bytes());
    preimage.extend_from_slice(&entropy);
    debug_assert_eq!(preimage.len(), 91);

    Ok(hex::encode(Sha256::digest(&preimage)))
}

/// Creates the next anchor after `prev` (or the genesis anchor when `prev` is
/// `None`) at the given timestamp.
///
/// With `entropy` present the anchor uses the V3 formula, otherwise V1.
///
/// # Errors
///
/// Fails on zero difficulty, a negative timestamp, or malformed entropy.
pub fn create_global_anchor(
    prev: Option<&GlobalAnchor>,
    difficulty: u32,
    epoch: u32,
    entropy: Option<&str>,
    utc: i64,
) -> Result<GlobalAnchor, AnchorError> {
    if difficulty == 0 {
        return Err(AnchorError::ZeroDifficulty);
    }
    if utc < 0 {
        return Err(AnchorError::NegativeUtc);
    }

    let (beat_index, prev_hash) = match prev {
        Some(p) => (p.beat_index + 1, p.hash.clone()),
        None => (0, genesis_prev_hash()),
    };

    let hash = match entropy {
        Some(e) => compute_anchor_hash_v3(&prev_hash, beat_index, e)?,
        None => compute_anchor_hash_v1(&prev_hash, beat_index, utc, difficulty, epoch),
    };

    Ok(GlobalAnchor {
        beat_index,
        hash,
        prev_hash,
        utc,
        difficulty,
        epoch,
        solana_entropy: entropy.map(str::to_string),
        signature: None,
    })
}

/// Recomputes an anchor's hash with the applicable formula and compares.
#[must_use]
pub fn verify_global_anchor(anchor: &GlobalAnchor) -> bool {
    if anchor.difficulty == 0 || anchor.utc < 0 {
        return false;
    }
    if !is_hex_hash(&anchor.hash) || !is_hex_hash(&anchor.prev_hash) {
        return false;
    }

    let expected = match anchor.solana_entropy.as_deref() {
        Some(entropy) => {
            match compute_anchor_hash_v3(&anchor.prev_hash, anchor.beat_index, entropy) {
                Ok(h) => h,
                Err(_) => return false,
            }
        },
        None => compute_anchor_hash_v1(
            &anchor.prev_hash,
            anchor.beat_index,
            anchor.utc,
            anchor.difficulty,
            anchor.epoch,
        ),
    };
    expected == anchor.hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entropy() -> String {
        bs58::encode([7u8; 32]).into_string()
    }

    #[test]
    fn genesis_prev_hash_is_stable() {
        assert_eq!(genesis_prev_hash(), sha256_hex(b"provenonce:beat:genesis:v1:2026"));
        assert!(is_hex_hash(&genesis_prev_hash()));
    }

    #[test]
    fn v1_round_trip() {
        let genesis = create_global_anchor(None, 1000, 0, None, 1_700_000_000_000).unwrap();
        assert_eq!(genesis.beat_index, 0);
        assert_eq!(genesis.prev_hash, genesis_prev_hash());
        assert!(verify_global_anchor(&genesis));

        let next = create_global_anchor(Some(&genesis), 1000, 0, None, 1_700_000_060_000).unwrap();
        assert_eq!(next.beat_index, 1);
        assert_eq!(next.prev_hash, genesis.hash);
        assert!(verify_global_anchor(&next));
    }

    #[test]
    fn v3_round_trip() {
        let entropy = test_entropy();
        let genesis =
            create_global_anchor(None, 1000, 0, Some(&entropy), 1_700_000_000_000).unwrap();
        assert!(genesis.solana_entropy.is_some());
        assert!(verify_global_anchor(&genesis));

        let next = create_global_anchor(Some(&genesis), 1000, 0, Some(&entropy), 1_700_000_060_000)
            .unwrap();
        assert!(verify_global_anchor(&next));
    }

    #[test]
    fn v3_preimage_is_91_bytes_and_entropy_sensitive() {
        let prev = genesis_prev_hash();
        let base = compute_anchor_hash_v3(&prev, 5, &test_entropy()).unwrap();

        // Flip one bit of the entropy.
        let mut flipped = [7u8; 32];
        flipped[0] ^= 1;
        let other = compute_anchor_hash_v3(&prev, 5, &bs58::encode(flipped).into_string()).unwrap();
        assert_ne!(base, other);

        // Different index.
        assert_ne!(base, compute_anchor_hash_v3(&prev, 6, &test_entropy()).unwrap());

        // Different prev.
        let other_prev = sha256_hex(b"other");
        assert_ne!(
            base,
            compute_anchor_hash_v3(&other_prev, 5, &test_entropy()).unwrap()
        );
    }

    #[test]
    fn v3_ignores_difficulty() {
        let entropy = test_entropy();
        let a = create_global_anchor(None, 100, 0, Some(&entropy), 1).unwrap();
        let b = create_global_anchor(None, 9_999, 0, Some(&entropy), 1).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn v1_depends_on_utc_and_epoch() {
        let a = create_global_anchor(None, 100, 0, None, 1).unwrap();
        let b = create_global_anchor(None, 100, 0, None, 2).unwrap();
        let c = create_global_anchor(None, 100, 1, None, 1).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn tampered_anchor_fails_verification() {
        let mut anchor = create_global_anchor(None, 1000, 0, None, 1_700_000_000_000).unwrap();
        anchor.beat_index = 1;
        assert!(!verify_global_anchor(&anchor));
    }

    #[test]
    fn rejects_zero_difficulty() {
        assert_eq!(
            create_global_anchor(None, 0, 0, None, 1),
            Err(AnchorError::ZeroDifficulty)
        );
    }

    #[test]
    fn rejects_bad_entropy() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert_eq!(
            create_global_anchor(None, 100, 0, Some(&short), 1),
            Err(AnchorError::MalformedEntropy)
        );
        assert_eq!(
            create_global_anchor(None, 100, 0, Some("0OIl"), 1),
            Err(AnchorError::MalformedEntropy)
        );
    }

    #[test]
    fn verify_rejects_malformed_entropy_anchor() {
        let mut anchor = create_global_anchor(None, 1000, 0, None, 1).unwrap();
        anchor.solana_entropy = Some("not-base58-!!".to_string());
        assert!(!verify_global_anchor(&anchor));
    }
}
