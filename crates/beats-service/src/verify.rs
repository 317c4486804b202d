//! Verification flows: beat, chain, check-in proof, and work proof.
//!
//! The verify endpoint dispatches on a `mode` tag over three request shapes;
//! work proofs have their own endpoint and their own two-phase validation:
//! structural defects are HTTP 400s, domain-invalid submissions are HTTP 200
//! with `valid:false` and a stable reason token. The reason tokens are part
//! of the public contract; clients match on them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use beats_core::anchor::GlobalAnchor;
use beats_core::beat::{is_hex_hash, verify_beat, Beat};
use beats_core::chain::verify_beat_chain;
use beats_core::checkin::{verify_checkin_proof, CheckinOutcome, CheckinProof, SpotCheck};
use beats_core::constants::{
    ANCHOR_HASH_GRACE_WINDOW, DEFAULT_DIFFICULTY, MAX_CHAIN_BEATS, MIN_DIFFICULTY,
    PUBLIC_MAX_DIFFICULTY, PUBLIC_MAX_SPOT_CHECKS,
};
use beats_core::keys::ReceiptKey;

/// Stable reason token: difficulty below the credited minimum.
pub const REASON_INSUFFICIENT_DIFFICULTY: &str = "insufficient_difficulty";

/// Stable reason token: too few spot checks for the claimed range.
pub const REASON_INSUFFICIENT_SPOT_CHECKS: &str = "insufficient_spot_checks";

/// Stable reason token: spot-check indices span more than the claimed count.
pub const REASON_COUNT_MISMATCH: &str = "count_mismatch";

/// Stable reason token: referenced anchor is outside the grace window.
pub const REASON_STALE_ANCHOR: &str = "stale_anchor";

/// Stable reason token: a spot check failed recomputation.
pub const REASON_SPOT_CHECK_FAILED: &str = "spot_check_failed";

/// The three verify-endpoint request shapes, tagged by `mode`.
#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum VerifyRequest {
    /// Recompute a single beat.
    Beat {
        /// The beat to check.
        beat: Beat,
        /// Difficulty to verify at; clamped into the public band.
        difficulty: Option<u32>,
    },

    /// Check linkage and spot-samples over a submitted chain.
    Chain {
        /// The chain, oldest first.
        beats: Vec<Beat>,
        /// How many positions to sample.
        spot_checks: Option<usize>,
        /// Difficulty to verify at; clamped into the public band.
        difficulty: Option<u32>,
    },

    /// Verify a check-in proof.
    Proof {
        /// The claimed range and its spot checks.
        proof: CheckinProof,
        /// Difficulty to verify at; clamped into the public band.
        difficulty: Option<u32>,
    },
}

/// Clamps a caller-supplied difficulty into the public verification band.
///
/// Low difficulties stay verifiable; only work credit enforces the minimum.
#[must_use]
pub fn clamp_public_difficulty(difficulty: Option<u32>) -> u32 {
    difficulty
        .unwrap_or(DEFAULT_DIFFICULTY)
        .clamp(1, PUBLIC_MAX_DIFFICULTY)
}

/// Response for beat mode.
#[derive(Debug, Serialize)]
pub struct BeatVerifyResponse {
    /// Whether the beat recomputed.
    pub valid: bool,
    /// Index of the checked beat.
    pub beat_index: u64,
    /// Difficulty the check ran at.
    pub difficulty: u32,
}

/// Response for chain mode.
#[derive(Debug, Serialize)]
pub struct ChainVerifyResponse {
    /// Whether linkage and all samples held.
    pub valid: bool,
    /// Number of beats submitted.
    pub chain_length: usize,
    /// Number of beats recomputed.
    pub beats_checked: usize,
    /// Indices that failed, ascending.
    pub failed_indices: Vec<usize>,
}

/// Verifies a single beat at a clamped difficulty.
#[must_use]
pub fn run_beat_mode(beat: &Beat, difficulty: Option<u32>) -> BeatVerifyResponse {
    let difficulty = clamp_public_difficulty(difficulty);
    BeatVerifyResponse {
        valid: verify_beat(beat, difficulty),
        beat_index: beat.index,
        difficulty,
    }
}

/// Verifies a chain. Structural limits are the caller's to enforce first.
#[must_use]
pub fn run_chain_mode(
    beats: &[Beat],
    spot_checks: Option<usize>,
    difficulty: Option<u32>,
) -> ChainVerifyResponse {
    let difficulty = clamp_public_difficulty(difficulty);
    let spot_count = spot_checks.unwrap_or(5).clamp(1, PUBLIC_MAX_SPOT_CHECKS);
    let outcome = verify_beat_chain(beats, difficulty, spot_count);
    ChainVerifyResponse {
        valid: outcome.valid,
        chain_length: beats.len(),
        beats_checked: outcome.checked,
        failed_indices: outcome.failed,
    }
}

/// Verifies a check-in proof at a clamped difficulty.
#[must_use]
pub fn run_proof_mode(proof: &CheckinProof, difficulty: Option<u32>) -> CheckinOutcome {
    verify_checkin_proof(proof, clamp_public_difficulty(difficulty))
}

/// Structural bounds for a verify request; violations are HTTP 400s.
///
/// # Errors
///
/// Returns the reason text for the 400 response.
pub fn check_verify_structure(request: &VerifyRequest) -> Result<(), String> {
    match request {
        VerifyRequest::Beat { beat, .. } => {
            if !is_hex_hash(&beat.hash) {
                return Err("beat.hash must be 64 lowercase hex characters".to_string());
            }
            Ok(())
        },
        VerifyRequest::Chain { beats, .. } => {
            if beats.is_empty() {
                return Err("beats must not be empty".to_string());
            }
            if beats.len() > MAX_CHAIN_BEATS {
                return Err(format!("beats exceeds the {MAX_CHAIN_BEATS}-beat limit"));
            }
            Ok(())
        },
        VerifyRequest::Proof { proof, .. } => {
            if proof.spot_checks.len() > PUBLIC_MAX_SPOT_CHECKS {
                return Err(format!(
                    "spot_checks exceeds the {PUBLIC_MAX_SPOT_CHECKS}-check limit"
                ));
            }
            Ok(())
        },
    }
}

/// A work-proof submission: N sequential beats at difficulty D anchored to a
/// recent anchor.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkProofRequest {
    /// Chain hash the work started from.
    pub from_hash: String,

    /// Chain hash the work ended at.
    pub to_hash: String,

    /// Claimed number of beats computed.
    pub beats_computed: u64,

    /// Difficulty the work was done at.
    pub difficulty: u32,

    /// Height of the anchor the work is bound to.
    pub anchor_index: u64,

    /// Hash of that anchor, when the beats were seeded with it.
    #[serde(default)]
    pub anchor_hash: Option<String>,

    /// Exposed beats supporting the claim.
    pub spot_checks: Vec<SpotCheck>,
}

impl WorkProofRequest {
    /// Accepts either `{ "work_proof": {...} }` or the flat object.
    ///
    /// # Errors
    ///
    /// Returns the reason text for the 400 response.
    pub fn from_body(body: &Value) -> Result<Self, String> {
        let source = body.get("work_proof").unwrap_or(body);
        serde_json::from_value(source.clone()).map_err(|e| format!("malformed work proof: {e}"))
    }

    /// Structural validation; violations are HTTP 400s.
    ///
    /// # Errors
    ///
    /// Returns the reason text for the 400 response.
    pub fn check_structure(&self) -> Result<(), String> {
        if !is_hex_hash(&self.from_hash) {
            return Err("from_hash must be 64 lowercase hex characters".to_string());
        }
        if !is_hex_hash(&self.to_hash) {
            return Err("to_hash must be 64 lowercase hex characters".to_string());
        }
        if self.beats_computed < 1 {
            return Err("beats_computed must be at least 1".to_string());
        }
        if let Some(anchor_hash) = &self.anchor_hash {
            if !is_hex_hash(anchor_hash) {
                return Err("anchor_hash must be 64 lowercase hex characters".to_string());
            }
        }
        if self.spot_checks.is_empty() || self.spot_checks.len() > PUBLIC_MAX_SPOT_CHECKS {
            return Err(format!(
                "spot_checks must contain between 1 and {PUBLIC_MAX_SPOT_CHECKS} entries"
            ));
        }
        for check in &self.spot_checks {
            if !is_hex_hash(&check.hash) {
                return Err(format!(
                    "spot check at index {} has a malformed hash",
                    check.index
                ));
            }
            if !is_hex_hash(&check.prev) {
                return Err(format!(
                    "spot check at index {} has a malformed prev",
                    check.index
                ));
            }
        }
        Ok(())
    }
}

/// Result of the work-proof logic phase.
#[derive(Debug)]
pub enum WorkProofVerdict {
    /// Domain-invalid; reported as HTTP 200 `{valid:false, reason}`.
    Rejected {
        /// The stable reason token.
        reason: &'static str,
    },

    /// All checks passed.
    Accepted {
        /// The clamped difficulty that was actually verified.
        difficulty: u32,
        /// Number of spot checks recomputed.
        spot_checks_verified: usize,
    },
}

/// Runs the work-proof logic phase against the current tip.
///
/// Freshness is skipped when no tip is observable (cold start).
#[must_use]
pub fn evaluate_work_proof(
    request: &WorkProofRequest,
    tip: Option<&GlobalAnchor>,
) -> WorkProofVerdict {
    if request.difficulty < MIN_DIFFICULTY {
        return WorkProofVerdict::Rejected {
            reason: REASON_INSUFFICIENT_DIFFICULTY,
        };
    }
    let difficulty = request.difficulty.min(PUBLIC_MAX_DIFFICULTY);

    let required = request.beats_computed.min(3) as usize;
    if request.spot_checks.len() < required {
        return WorkProofVerdict::Rejected {
            reason: REASON_INSUFFICIENT_SPOT_CHECKS,
        };
    }

    let min_index = request.spot_checks.iter().map(|c| c.index).min();
    let max_index = request.spot_checks.iter().map(|c| c.index).max();
    if let (Some(lo), Some(hi)) = (min_index, max_index) {
        if hi - lo > request.beats_computed {
            return WorkProofVerdict::Rejected {
                reason: REASON_COUNT_MISMATCH,
            };
        }
    }

    if let Some(tip) = tip {
        let stale = request.anchor_index > tip.beat_index
            || tip.beat_index - request.anchor_index > ANCHOR_HASH_GRACE_WINDOW;
        if stale {
            return WorkProofVerdict::Rejected {
                reason: REASON_STALE_ANCHOR,
            };
        }
    }

    for check in &request.spot_checks {
        let beat = Beat {
            index: check.index,
            hash: check.hash.clone(),
            prev: check.prev.clone(),
            nonce: check.nonce.clone(),
            anchor_hash: request.anchor_hash.clone(),
        };
        if !verify_beat(&beat, difficulty) {
            return WorkProofVerdict::Rejected {
                reason: REASON_SPOT_CHECK_FAILED,
            };
        }
    }

    WorkProofVerdict::Accepted {
        difficulty,
        spot_checks_verified: request.spot_checks.len(),
    }
}

/// Builds and signs the work-proof receipt.
///
/// The receipt is the payload object plus a `signature` field, signed over
/// the object excluding `signature`; `difficulty` is the clamped value that
/// was actually verified so the receipt never attests to unchecked work.
#[must_use]
pub fn build_work_proof_receipt(
    request: &WorkProofRequest,
    difficulty: u32,
    spot_checks_verified: usize,
    utc: i64,
    key: &ReceiptKey,
) -> Value {
    let mut payload = Map::new();
    payload.insert("type".into(), json!("work_proof"));
    payload.insert("from_hash".into(), json!(request.from_hash));
    payload.insert("to_hash".into(), json!(request.to_hash));
    payload.insert("beats_computed".into(), json!(request.beats_computed));
    payload.insert("difficulty".into(), json!(difficulty));
    payload.insert("anchor_index".into(), json!(request.anchor_index));
    if let Some(anchor_hash) = &request.anchor_hash {
        payload.insert("anchor_hash".into(), json!(anchor_hash));
    }
    payload.insert("spot_checks_verified".into(), json!(spot_checks_verified));
    payload.insert("utc".into(), json!(utc));

    let signature = key.sign_value(&Value::Object(payload.clone()));
    payload.insert("signature".into(), json!(signature));
    Value::Object(payload)
}
