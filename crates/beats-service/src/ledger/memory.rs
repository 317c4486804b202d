//! In-memory ledger for tests.
//!
//! Stores published memos in a vector and serves them back newest-first the
//! way the real ledger does, prefixing each with the `"[n] "` display
//! artifact so parsers get exercised against it. Entropy, balance, and
//! publish failures are all configurable per test.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{BoxFuture, LedgerClient, LedgerError, MemoRecord, PublishResult};

/// A configurable fake ledger.
pub struct MemoryLedger {
    memos: Mutex<Vec<MemoRecord>>,
    entropy: Mutex<Option<String>>,
    balance: AtomicU64,
    fail_publish: AtomicBool,
    sequence: AtomicU64,
    writer: String,
}

impl MemoryLedger {
    /// An empty ledger with entropy available and a comfortable balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memos: Mutex::new(Vec::new()),
            entropy: Mutex::new(Some(bs58::encode([11u8; 32]).into_string())),
            balance: AtomicU64::new(1_000_000_000),
            fail_publish: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            writer: bs58::encode([1u8; 32]).into_string(),
        }
    }

    /// Replaces the entropy source; `None` simulates an outage.
    pub fn set_entropy(&self, entropy: Option<String>) {
        *self.entropy.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = entropy;
    }

    /// Sets the writer balance in minor units.
    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::Relaxed);
    }

    /// Makes subsequent publishes fail with an RPC error.
    pub fn fail_next_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// Seeds a memo as if it had been published earlier.
    pub fn seed_memo(&self, memo: &str) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.memos
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(MemoRecord {
                signature: format!("memsig{seq}"),
                confirmation_status: "finalized".to_string(),
                memo: Some(format!("[{}] {memo}", memo.len())),
            });
    }

    /// Number of memos the ledger holds.
    #[must_use]
    pub fn memo_count(&self) -> usize {
        self.memos
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// The most recently published memo body, prefix included.
    #[must_use]
    pub fn last_memo(&self) -> Option<String> {
        self.memos
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .last()
            .and_then(|r| r.memo.clone())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerClient for MemoryLedger {
    fn recent_memos(&self, limit: usize) -> BoxFuture<'_, Result<Vec<MemoRecord>, LedgerError>> {
        Box::pin(async move {
            let memos = self
                .memos
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(memos.iter().rev().take(limit).cloned().collect())
        })
    }

    fn publish_memo<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<PublishResult, LedgerError>> {
        Box::pin(async move {
            if self.fail_publish.load(Ordering::Relaxed) {
                return Err(LedgerError::Rpc("simulated publish outage".to_string()));
            }
            let text = String::from_utf8(payload.to_vec())
                .map_err(|_| LedgerError::Rpc("memo payload is not UTF-8".to_string()))?;
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let signature = format!("memsig{seq}");
            self.memos
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(MemoRecord {
                    signature: signature.clone(),
                    confirmation_status: "finalized".to_string(),
                    memo: Some(format!("[{}] {text}", text.len())),
                });
            Ok(PublishResult {
                signature,
                slot: seq + 1,
            })
        })
    }

    fn external_entropy(&self) -> BoxFuture<'_, Result<Option<String>, LedgerError>> {
        Box::pin(async move {
            Ok(self
                .entropy
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone())
        })
    }

    fn account_balance(&self) -> BoxFuture<'_, Result<u64, LedgerError>> {
        Box::pin(async move { Ok(self.balance.load(Ordering::Relaxed)) })
    }

    fn writer_address(&self) -> String {
        self.writer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_read_round_trips() {
        let ledger = MemoryLedger::new();
        ledger.publish_memo(b"{\"v\":1}").await.unwrap();
        ledger.publish_memo(b"second").await.unwrap();

        let memos = ledger.recent_memos(50).await.unwrap();
        assert_eq!(memos.len(), 2);
        // Newest first, with the display prefix attached.
        assert_eq!(memos[0].memo.as_deref(), Some("[6] second"));
        assert_eq!(memos[1].memo.as_deref(), Some("[7] {\"v\":1}"));
    }

    #[tokio::test]
    async fn simulated_outage_fails_publish() {
        let ledger = MemoryLedger::new();
        ledger.fail_next_publishes(true);
        assert!(ledger.publish_memo(b"x").await.is_err());
        assert_eq!(ledger.memo_count(), 0);
    }

    #[tokio::test]
    async fn entropy_outage_is_observable() {
        let ledger = MemoryLedger::new();
        assert!(ledger.external_entropy().await.unwrap().is_some());
        ledger.set_entropy(None);
        assert!(ledger.external_entropy().await.unwrap().is_none());
    }
}
