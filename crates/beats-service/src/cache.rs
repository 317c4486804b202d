//! Read-through cache for the canonical anchor tip.
//!
//! A single slot with a short TTL sits in front of the ledger scan. Every
//! reader observes a consistent snapshot; when the slot expires, the next
//! caller refreshes it. Concurrent refreshes on expiry are acceptable and
//! both writers install equivalent snapshots, so no stampede guard is needed.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use beats_core::anchor::GlobalAnchor;
use beats_core::memo::parse_anchor_memo;
use beats_core::select::select_canonical_anchor;

use crate::ledger::{LedgerClient, LedgerError};

/// Default slot lifetime.
pub const ANCHOR_CACHE_TTL: Duration = Duration::from_secs(10);

/// How many recent transactions each refresh scans.
const SCAN_LIMIT: usize = 50;

#[derive(Clone)]
struct Snapshot {
    fetched_at: Instant,
    tip: Option<GlobalAnchor>,
}

/// Single-slot TTL cache over `select_canonical_anchor`.
pub struct AnchorCache {
    slot: RwLock<Option<Snapshot>>,
    ttl: Duration,
}

impl AnchorCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    /// The canonical tip, served from the slot when fresh.
    ///
    /// `Ok(None)` means the ledger was reachable but holds no anchor yet.
    ///
    /// # Errors
    ///
    /// Propagates ledger read failures; the stale slot is left in place so a
    /// later call can retry.
    pub async fn latest(
        &self,
        ledger: &dyn LedgerClient,
    ) -> Result<Option<GlobalAnchor>, LedgerError> {
        {
            let slot = self
                .slot
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(snapshot) = slot.as_ref() {
                if snapshot.fetched_at.elapsed() < self.ttl {
                    return Ok(snapshot.tip.clone());
                }
            }
        }

        let tip = read_latest_anchor(ledger).await?;

        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(Snapshot {
            fetched_at: Instant::now(),
            tip: tip.clone(),
        });
        Ok(tip)
    }

    /// Drops the slot so the next read refreshes.
    pub fn invalidate(&self) {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = None;
    }
}

/// Uncached ledger scan: recent memos, parsed and fork-chosen.
///
/// The winning anchor carries the transaction signature of the memo it was
/// reconstructed from.
///
/// # Errors
///
/// Propagates ledger read failures.
pub async fn read_latest_anchor(
    ledger: &dyn LedgerClient,
) -> Result<Option<GlobalAnchor>, LedgerError> {
    let records = ledger.recent_memos(SCAN_LIMIT).await?;
    let candidates: Vec<GlobalAnchor> = records
        .iter()
        .filter_map(|record| {
            let memo = record.memo.as_deref()?;
            let mut anchor = parse_anchor_memo(memo)?;
            anchor.signature = Some(record.signature.clone());
            Some(anchor)
        })
        .collect();
    Ok(select_canonical_anchor(&candidates))
}
