//! Sequential-work hash chain primitive.
//!
//! A beat is one step of a chain of SHA-256 invocations. The chain is defined
//! over 64-character lowercase hex strings, not raw bytes: the seed string is
//! hashed once, and each further iteration hashes the UTF-8 bytes of the
//! previous digest's hex rendering. Implementations that internally work on
//! bytes must re-encode to lowercase hex between iterations or they will not
//! agree with this one.
//!
//! Seed layout:
//!
//! ```text
//! {prev}:{index}:{nonce-or-empty}[:{anchor_hash}]
//! ```
//!
//! The nonce segment is present (possibly empty) in every seed; the anchor
//! segment is appended only when the beat is bound to an anchor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One step of the sequential hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    /// Position of this beat in its chain.
    pub index: u64,

    /// Hex digest produced by iterating the seed hash `difficulty` times.
    pub hash: String,

    /// Hash of the previous beat (or an arbitrary starting hex string).
    pub prev: String,

    /// Optional caller-chosen nonce mixed into the seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Optional anchor hash binding this beat to a published anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_hash: Option<String>,
}

/// SHA-256 of arbitrary bytes, rendered as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns true for a 64-character lowercase hex string.
#[must_use]
pub fn is_hex_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hashes the seed once, then iterates SHA-256 over the hex rendering
/// `difficulty` more times.
#[must_use]
pub fn iterate_hash(seed: &str, difficulty: u32) -> String {
    let mut hash = sha256_hex(seed.as_bytes());
    for _ in 0..difficulty {
        hash = sha256_hex(hash.as_bytes());
    }
    hash
}

/// Builds the seed string for a beat.
#[must_use]
pub fn beat_seed(prev: &str, index: u64, nonce: Option<&str>, anchor_hash: Option<&str>) -> String {
    let mut seed = format!("{prev}:{index}:{}", nonce.unwrap_or(""));
    if let Some(anchor) = anchor_hash {
        seed.push(':');
        seed.push_str(anchor);
    }
    seed
}

/// Computes a beat at the given difficulty.
#[must_use]
pub fn compute_beat(
    prev: &str,
    index: u64,
    difficulty: u32,
    nonce: Option<&str>,
    anchor_hash: Option<&str>,
) -> Beat {
    let seed = beat_seed(prev, index, nonce, anchor_hash);
    Beat {
        index,
        hash: iterate_hash(&seed, difficulty),
        prev: prev.to_string(),
        nonce: nonce.map(str::to_string),
        anchor_hash: anchor_hash.map(str::to_string),
    }
}

/// Recomputes a beat's hash and compares it to the claimed one.
///
/// Malformed fields simply fail to reproduce the hash, so this never errors.
#[must_use]
pub fn verify_beat(beat: &Beat, difficulty: u32) -> bool {
    let seed = beat_seed(
        &beat.prev,
        beat.index,
        beat.nonce.as_deref(),
        beat.anchor_hash.as_deref(),
    );
    iterate_hash(&seed, difficulty) == beat.hash
}
