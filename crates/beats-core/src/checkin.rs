//! Check-in proof verification.
//!
//! A check-in proof claims "I computed the beats from `from_beat` to
//! `to_beat`" and exposes a handful of spot checks so a verifier can
//! recompute individual beats without replaying the whole range. Rejections
//! are ordinary values with human-readable reasons, not errors.

use serde::{Deserialize, Serialize};

use crate::beat::{is_hex_hash, verify_beat, Beat};

/// A single exposed beat a verifier can recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotCheck {
    /// Beat index within the claimed range.
    pub index: u64,

    /// Claimed hash at that index.
    pub hash: String,

    /// Hash of the preceding beat.
    pub prev: String,

    /// Nonce the prover mixed into this beat, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// A claimed range of sequential work with supporting spot checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinProof {
    /// First beat index of the claimed range (exclusive of the work).
    pub from_beat: u64,

    /// Last beat index of the claimed range.
    pub to_beat: u64,

    /// Chain hash at `from_beat`.
    pub from_hash: String,

    /// Chain hash at `to_beat`.
    pub to_hash: String,

    /// Claimed number of beats computed; derived from the range when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beats_computed: Option<u64>,

    /// Anchor hash every beat in the range was bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_hash: Option<String>,

    /// Exposed beats.
    pub spot_checks: Vec<SpotCheck>,
}

/// Outcome of check-in verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinOutcome {
    /// Whether the proof held up.
    pub valid: bool,

    /// Human-readable rejection reason when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of spot checks that were recomputed successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_checks_verified: Option<usize>,
}

impl CheckinOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            spot_checks_verified: None,
        }
    }
}

/// Verifies a check-in proof at the given difficulty.
///
/// Every spot check is recomputed with the proof's anchor hash (when bound);
/// the set must cover `to_beat` and contain at least `min(3, beats_computed)`
/// entries.
#[must_use]
pub fn verify_checkin_proof(proof: &CheckinProof, difficulty: u32) -> CheckinOutcome {
    // Signed arithmetic so a backwards range reads as a count mismatch when
    // an explicit count is supplied, matching legacy verifiers.
    let span = i128::from(proof.to_beat) - i128::from(proof.from_beat);
    if let Some(claimed) = proof.beats_computed {
        if i128::from(claimed) != span {
            return CheckinOutcome::rejected("Beat count mismatch");
        }
    }
    if proof.to_beat <= proof.from_beat {
        return CheckinOutcome::rejected("Beat range must be forward-moving");
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let beats_computed = span as u64;

    let required = beats_computed.min(3) as usize;
    if proof.spot_checks.len() < required {
        return CheckinOutcome::rejected(format!(
            "Insufficient spot checks: expected at least {required}"
        ));
    }

    if !proof.spot_checks.iter().any(|sc| sc.index == proof.to_beat) {
        return CheckinOutcome::rejected(format!(
            "Spot checks must include to_beat {}",
            proof.to_beat
        ));
    }

    for sc in &proof.spot_checks {
        if !is_hex_hash(&sc.prev) {
            return CheckinOutcome::rejected(format!(
                "Spot check at index {} is missing a valid prev hash",
                sc.index
            ));
        }
    }

    for sc in &proof.spot_checks {
        let beat = Beat {
            index: sc.index,
            hash: sc.hash.clone(),
            prev: sc.prev.clone(),
            nonce: sc.nonce.clone(),
            anchor_hash: proof.anchor_hash.clone(),
        };
        if !verify_beat(&beat, difficulty) {
            return CheckinOutcome::rejected(format!("Spot check failed at index {}", sc.index));
        }
    }

    CheckinOutcome {
        valid: true,
        reason: None,
        spot_checks_verified: Some(proof.spot_checks.len()),
    }
}
