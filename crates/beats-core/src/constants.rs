//! Protocol constants.
//!
//! Every value in this module is interoperability-critical: independent
//! implementations must agree on these bytes and bounds to produce and verify
//! the same chains. Do not change them without a protocol version bump.

/// Seed string hashed once with SHA-256 to produce the genesis `prev_hash`.
pub const GENESIS_SEED: &str = "provenonce:beat:genesis:v1:2026";

/// Domain-separation prefix for the V3 anchor hash preimage (19 UTF-8 bytes).
pub const ANCHOR_V3_DOMAIN: &[u8; 19] = b"PROVENONCE_BEATS_V1";

/// Target spacing between anchors in milliseconds.
pub const ANCHOR_INTERVAL_MS: i64 = 60_000;

/// How many anchor intervals a proof's referenced anchor may lag the current
/// tip before it is rejected as stale.
pub const ANCHOR_HASH_GRACE_WINDOW: u64 = 5;

/// Lowest difficulty for which work is credited.
pub const MIN_DIFFICULTY: u32 = 100;

/// Hard upper bound on difficulty anywhere in the system.
pub const MAX_DIFFICULTY: u32 = 1_000_000;

/// Difficulty cap on the public verification endpoints.
pub const PUBLIC_MAX_DIFFICULTY: u32 = 5_000;

/// Spot-check cap on the public verification endpoints.
pub const PUBLIC_MAX_SPOT_CHECKS: usize = 25;

/// Difficulty used when no prior anchor dictates one.
pub const DEFAULT_DIFFICULTY: u32 = 1_000;

/// Maximum serialized size of an anchor memo in UTF-8 bytes.
pub const MAX_MEMO_BYTES: usize = 566;

/// Maximum number of beats accepted by a single chain verification.
pub const MAX_CHAIN_BEATS: usize = 1_000;

/// HKDF info string for the timestamp-receipt signing subkey.
pub const TIMESTAMP_RECEIPT_CONTEXT: &str = "provenonce:beats:timestamp-receipt:v1";

/// HKDF info string for the work-proof signing subkey.
pub const WORK_PROOF_CONTEXT: &str = "provenonce:beats:work-proof:v1";
