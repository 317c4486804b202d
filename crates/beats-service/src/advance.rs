//! Anchor advancement.
//!
//! An external scheduler hits the cron endpoint roughly once a minute; this
//! module is the state machine behind it: read the tip, gate on freshness,
//! fetch entropy, compute the successor, publish. Nothing is persisted
//! locally, so a crashed run leaves no state to repair; the next invocation
//! re-reads the ledger and continues.
//!
//! The machine fails closed: without entropy the head does not advance, and
//! a publish failure is surfaced rather than retried, since the scheduler
//! will be back within a minute anyway.

use std::time::Instant;

use thiserror::Error;

use beats_core::anchor::{create_global_anchor, AnchorError};
use beats_core::constants::{ANCHOR_INTERVAL_MS, DEFAULT_DIFFICULTY};
use beats_core::memo::{serialize_anchor_memo, MemoError};

use crate::cache::read_latest_anchor;
use crate::ledger::{LedgerClient, LedgerError};

/// Result of one advancement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The tip is still inside the anchor interval; nothing was published.
    Skipped {
        /// Height of the still-fresh tip.
        beat_index: u64,
        /// Earliest time the next anchor is due, epoch milliseconds.
        next_at: i64,
    },

    /// A new anchor was published and finalized.
    Generated {
        /// Height of the new anchor.
        beat_index: u64,
        /// Hash of the new anchor.
        hash: String,
        /// Transaction that carries it.
        tx_signature: String,
        /// Wall time the whole attempt took.
        elapsed_ms: u64,
    },
}

/// Failures of an advancement attempt.
#[derive(Debug, Error)]
pub enum AdvanceError {
    /// External entropy was unavailable; the head must not advance.
    #[error("external entropy unavailable")]
    MissingEntropy,

    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The successor anchor could not be constructed.
    #[error(transparent)]
    Anchor(#[from] AnchorError),

    /// The successor memo violated the wire constraints.
    #[error(transparent)]
    Memo(#[from] MemoError),
}

/// Runs one advancement attempt at wall time `now_ms`.
///
/// # Errors
///
/// See [`AdvanceError`]; entropy unavailability and ledger failures both
/// leave the chain untouched.
pub async fn advance_anchor(
    ledger: &dyn LedgerClient,
    now_ms: i64,
) -> Result<AdvanceOutcome, AdvanceError> {
    let started = Instant::now();

    let tip = read_latest_anchor(ledger).await?;

    if let Some(tip) = &tip {
        if now_ms - tip.utc <= ANCHOR_INTERVAL_MS {
            tracing::info!(
                beat_index = tip.beat_index,
                age_ms = now_ms - tip.utc,
                "anchor still fresh, skipping"
            );
            return Ok(AdvanceOutcome::Skipped {
                beat_index: tip.beat_index,
                next_at: tip.utc + ANCHOR_INTERVAL_MS,
            });
        }
    }

    let entropy = match ledger.external_entropy().await {
        Ok(Some(entropy)) => entropy,
        Ok(None) => return Err(AdvanceError::MissingEntropy),
        Err(error) => {
            tracing::warn!(%error, "entropy fetch failed, refusing to advance");
            return Err(AdvanceError::MissingEntropy);
        },
    };

    let difficulty = tip.as_ref().map_or(DEFAULT_DIFFICULTY, |t| t.difficulty);
    let epoch = tip.as_ref().map_or(0, |t| t.epoch);
    let next = create_global_anchor(tip.as_ref(), difficulty, epoch, Some(&entropy), now_ms)?;

    let memo = serialize_anchor_memo(&next)?;
    let published = ledger.publish_memo(memo.as_bytes()).await?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        beat_index = next.beat_index,
        hash = %next.hash,
        tx_signature = %published.signature,
        elapsed_ms,
        "anchor advanced"
    );

    Ok(AdvanceOutcome::Generated {
        beat_index: next.beat_index,
        hash: next.hash,
        tx_signature: published.signature,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use beats_core::anchor::{create_global_anchor, genesis_prev_hash};
    use beats_core::memo::{parse_anchor_memo, serialize_anchor_memo};

    use super::*;
    use crate::ledger::MemoryLedger;

    const T0: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn bootstraps_genesis_on_empty_ledger() {
        let ledger = MemoryLedger::new();
        let outcome = advance_anchor(&ledger, T0).await.unwrap();

        let AdvanceOutcome::Generated {
            beat_index, hash, ..
        } = outcome
        else {
            panic!("expected a generated anchor");
        };
        assert_eq!(beat_index, 0);

        let memo = ledger.last_memo().unwrap();
        let parsed = parse_anchor_memo(&memo).unwrap();
        assert_eq!(parsed.hash, hash);
        assert_eq!(parsed.prev_hash, genesis_prev_hash());
        assert_eq!(parsed.difficulty, DEFAULT_DIFFICULTY);
        assert!(parsed.solana_entropy.is_some());
    }

    #[tokio::test]
    async fn skips_inside_the_interval() {
        let ledger = MemoryLedger::new();
        advance_anchor(&ledger, T0).await.unwrap();

        let outcome = advance_anchor(&ledger, T0 + 30_000).await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Skipped {
                beat_index: 0,
                next_at: T0 + ANCHOR_INTERVAL_MS,
            }
        );
        assert_eq!(ledger.memo_count(), 1);
    }

    #[tokio::test]
    async fn advances_past_the_interval() {
        let ledger = MemoryLedger::new();
        advance_anchor(&ledger, T0).await.unwrap();

        let outcome = advance_anchor(&ledger, T0 + 61_000).await.unwrap();
        let AdvanceOutcome::Generated { beat_index, .. } = outcome else {
            panic!("expected a generated anchor");
        };
        assert_eq!(beat_index, 1);
        assert_eq!(ledger.memo_count(), 2);

        // The new tip links to the old one.
        let parsed = parse_anchor_memo(&ledger.last_memo().unwrap()).unwrap();
        let previous = parse_anchor_memo(
            &ledger.recent_memos(50).await.unwrap()[1].memo.clone().unwrap(),
        )
        .unwrap();
        assert_eq!(parsed.prev_hash, previous.hash);
    }

    #[tokio::test]
    async fn fails_closed_without_entropy() {
        let ledger = MemoryLedger::new();
        advance_anchor(&ledger, T0).await.unwrap();
        ledger.set_entropy(None);

        let error = advance_anchor(&ledger, T0 + 61_000).await.unwrap_err();
        assert!(matches!(error, AdvanceError::MissingEntropy));
        // The head did not move.
        assert_eq!(ledger.memo_count(), 1);
        let tip = read_latest_anchor(&ledger).await.unwrap().unwrap();
        assert_eq!(tip.beat_index, 0);
    }

    #[tokio::test]
    async fn publish_failure_is_surfaced() {
        let ledger = MemoryLedger::new();
        advance_anchor(&ledger, T0).await.unwrap();
        ledger.fail_next_publishes(true);

        let error = advance_anchor(&ledger, T0 + 61_000).await.unwrap_err();
        assert!(matches!(error, AdvanceError::Ledger(_)));
        assert_eq!(ledger.memo_count(), 1);
    }

    #[tokio::test]
    async fn carries_difficulty_and_epoch_forward() {
        let ledger = MemoryLedger::new();
        let seeded =
            create_global_anchor(None, 2_500, 4, None, T0 - 120_000).unwrap();
        ledger.seed_memo(&serialize_anchor_memo(&seeded).unwrap());

        advance_anchor(&ledger, T0).await.unwrap();
        let parsed = parse_anchor_memo(&ledger.last_memo().unwrap()).unwrap();
        assert_eq!(parsed.difficulty, 2_500);
        assert_eq!(parsed.epoch, 4);
        assert_eq!(parsed.beat_index, 1);
    }
}
