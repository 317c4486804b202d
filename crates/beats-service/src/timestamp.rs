//! Digest timestamping.
//!
//! Binds an opaque 32-byte digest to the current anchor, publishes the
//! binding as a ledger memo, and returns a signed receipt. The service never
//! sees the underlying document; only its hash travels.

use serde_json::{json, Value};
use thiserror::Error;

use beats_core::anchor::GlobalAnchor;
use beats_core::beat::is_hex_hash;
use beats_core::keys::ReceiptKey;
use beats_core::memo::{serialize_timestamp_memo, MemoError, TimestampMemo};

use crate::cache::AnchorCache;
use crate::config::Cluster;
use crate::ledger::{LedgerClient, LedgerError};

/// Minimum writer balance (minor units) required to publish.
pub const MIN_WRITER_BALANCE: u64 = 5_000;

/// Quota tier a timestamp request ran under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Default public quota.
    Free,
    /// Raised quota granted by the tier token.
    Pro,
}

impl Tier {
    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }
}

/// Failures of a timestamp request after input validation.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// No anchor is observable yet; the clock has not started.
    #[error("no anchor available yet")]
    NoAnchor,

    /// The writer cannot afford the publish fee.
    #[error("writer balance {balance} below the {MIN_WRITER_BALANCE} minimum")]
    LowBalance {
        /// Observed balance in minor units.
        balance: u64,
    },

    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The memo violated the wire constraints.
    #[error(transparent)]
    Memo(#[from] MemoError),
}

/// A completed timestamp: the signed payload plus publication details.
#[derive(Debug)]
pub struct TimestampReceipt {
    /// The signed payload fields.
    pub payload: Value,

    /// Hex Ed25519 signature over the canonical payload.
    pub signature: String,

    /// Transaction that carries the timestamp memo.
    pub tx_signature: String,

    /// Explorer link for that transaction.
    pub explorer_url: String,

    /// The anchor the digest was bound to.
    pub anchor: GlobalAnchor,
}

/// Returns true for a well-formed digest: 64 lowercase hex characters.
#[must_use]
pub fn is_valid_digest(hash: &str) -> bool {
    is_hex_hash(hash)
}

/// Binds `hash` to the current anchor and publishes the binding.
///
/// # Errors
///
/// Fails when no anchor exists yet, the writer balance is too low, or the
/// ledger rejects the publish. Input validation happens before this point.
pub async fn timestamp_digest(
    hash: &str,
    utc: i64,
    ledger: &dyn LedgerClient,
    cache: &AnchorCache,
    cluster: Cluster,
    key: &ReceiptKey,
) -> Result<TimestampReceipt, TimestampError> {
    let anchor = cache
        .latest(ledger)
        .await?
        .ok_or(TimestampError::NoAnchor)?;

    let balance = ledger.account_balance().await?;
    if balance < MIN_WRITER_BALANCE {
        tracing::warn!(balance, "refusing to timestamp on low writer balance");
        return Err(TimestampError::LowBalance { balance });
    }

    let memo = TimestampMemo {
        hash: hash.to_string(),
        anchor_index: anchor.beat_index,
        anchor_hash: anchor.hash.clone(),
        utc,
    };
    let serialized = serialize_timestamp_memo(&memo)?;
    let published = ledger.publish_memo(serialized.as_bytes()).await?;

    let payload = json!({
        "type": "timestamp",
        "hash": hash,
        "anchor_index": anchor.beat_index,
        "anchor_hash": anchor.hash,
        "utc": utc,
        "tx_signature": published.signature,
    });
    let signature = key.sign_value(&payload);

    tracing::info!(
        hash,
        anchor_index = anchor.beat_index,
        tx_signature = %published.signature,
        "digest timestamped"
    );

    Ok(TimestampReceipt {
        payload,
        signature,
        explorer_url: cluster.explorer_url(&published.signature),
        tx_signature: published.signature,
        anchor,
    })
}
