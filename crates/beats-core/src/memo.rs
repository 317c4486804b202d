//! Wire codec for anchor and timestamp memos.
//!
//! Memos are canonical JSON (sorted keys, no whitespace). On the wire the
//! anchor's previous hash is named `prev`; in memory it is `prev_hash`. Some
//! ledger layers prefix stored memos with `"[n] "`, which parsing strips.
//!
//! Anything that is not a well-formed anchor memo parses to `None` rather
//! than an error: the ledger carries arbitrary memos from arbitrary writers
//! and skipping foreign ones is the normal case, not a failure.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::anchor::GlobalAnchor;
use crate::beat::is_hex_hash;
use crate::constants::MAX_MEMO_BYTES;

/// Errors from memo serialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoError {
    /// The serialized memo exceeds the ledger's size cap.
    #[error("memo is {size} bytes, exceeding the {MAX_MEMO_BYTES}-byte cap")]
    TooLarge {
        /// Actual serialized size.
        size: usize,
    },
}

/// A timestamp record bound to an anchor, as written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampMemo {
    /// The opaque 32-byte digest being timestamped, hex-encoded.
    pub hash: String,

    /// Height of the anchor the digest is bound to.
    pub anchor_index: u64,

    /// Hash of that anchor.
    pub anchor_hash: String,

    /// Wall-clock milliseconds at binding time.
    pub utc: i64,
}

/// Strips a leading `"[n] "` ledger prefix, if present.
#[must_use]
pub fn strip_memo_prefix(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some(end) = rest.find("] ") {
            if rest[..end].bytes().all(|b| b.is_ascii_digit()) && end > 0 {
                return &rest[end + 2..];
            }
        }
    }
    raw
}

/// Parses a ledger memo as an anchor record.
///
/// Returns `None` for anything that is not a well-formed `v:1` anchor memo.
#[must_use]
pub fn parse_anchor_memo(raw: &str) -> Option<GlobalAnchor> {
    let body = strip_memo_prefix(raw.trim());
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;

    if obj.get("v")?.as_u64()? != 1 {
        return None;
    }
    if obj.get("type")?.as_str()? != "anchor" {
        return None;
    }

    let beat_index = obj.get("beat_index")?.as_u64()?;
    let hash = obj.get("hash")?.as_str()?;
    let prev = obj.get("prev")?.as_str()?;
    if !is_hex_hash(hash) || !is_hex_hash(prev) {
        return None;
    }

    let utc = obj.get("utc")?.as_i64()?;
    if utc < 0 {
        return None;
    }
    let difficulty = u32::try_from(obj.get("difficulty")?.as_u64()?).ok()?;
    if difficulty == 0 {
        return None;
    }
    let epoch = u32::try_from(obj.get("epoch")?.as_u64()?).ok()?;

    let solana_entropy = match obj.get("solana_entropy") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return None,
    };

    Some(GlobalAnchor {
        beat_index,
        hash: hash.to_string(),
        prev_hash: prev.to_string(),
        utc,
        difficulty,
        epoch,
        solana_entropy,
        signature: None,
    })
}

fn anchor_memo_value(anchor: &GlobalAnchor) -> Value {
    let mut obj = Map::new();
    obj.insert("v".into(), json!(1));
    obj.insert("type".into(), json!("anchor"));
    obj.insert("beat_index".into(), json!(anchor.beat_index));
    obj.insert("hash".into(), json!(anchor.hash));
    obj.insert("prev".into(), json!(anchor.prev_hash));
    obj.insert("utc".into(), json!(anchor.utc));
    obj.insert("difficulty".into(), json!(anchor.difficulty));
    obj.insert("epoch".into(), json!(anchor.epoch));
    if let Some(entropy) = &anchor.solana_entropy {
        obj.insert("solana_entropy".into(), json!(entropy));
    }
    Value::Object(obj)
}

/// Serializes an anchor to its canonical memo form.
///
/// # Errors
///
/// Fails if the result would exceed the 566-byte ledger cap.
pub fn serialize_anchor_memo(anchor: &GlobalAnchor) -> Result<String, MemoError> {
    let memo = crate::canonical::to_canonical_string(&anchor_memo_value(anchor));
    if memo.len() > MAX_MEMO_BYTES {
        return Err(MemoError::TooLarge { size: memo.len() });
    }
    Ok(memo)
}

/// Serializes a timestamp memo to its canonical form.
///
/// # Errors
///
/// Fails if the result would exceed the 566-byte ledger cap.
pub fn serialize_timestamp_memo(memo: &TimestampMemo) -> Result<String, MemoError> {
    let value = json!({
        "v": 1,
        "type": "timestamp",
        "hash": memo.hash,
        "anchor_index": memo.anchor_index,
        "anchor_hash": memo.anchor_hash,
        "utc": memo.utc,
    });
    let serialized = crate::canonical::to_canonical_string(&value);
    if serialized.len() > MAX_MEMO_BYTES {
        return Err(MemoError::TooLarge {
            size: serialized.len(),
        });
    }
    Ok(serialized)
}
