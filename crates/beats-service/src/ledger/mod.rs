//! Ledger interface.
//!
//! Beats keeps no local state; the public ledger is both its clock
//! persistence and its publication channel. This module defines the small
//! capability surface the service consumes, abstracted behind an object-safe
//! trait so the HTTP suites can run against an in-memory fake.
//!
//! All methods are I/O-bound and must be bounded by explicit deadlines in
//! their implementations; callers never add their own unbounded awaits.

pub mod memory;
pub mod rpc;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One memo-bearing transaction observed for the writer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoRecord {
    /// Ledger transaction signature.
    pub signature: String,

    /// Confirmation level reported by the ledger.
    pub confirmation_status: String,

    /// The memo text, when the transaction carried one.
    pub memo: Option<String>,
}

/// Result of a finalized memo publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Transaction signature of the published memo.
    pub signature: String,

    /// Slot the transaction landed in.
    pub slot: u64,
}

/// Errors from ledger interactions.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport or RPC-level failure.
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    /// The ledger reported the transaction as failed.
    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed {
        /// Signature of the failed transaction.
        signature: String,
        /// Failure detail from the ledger.
        reason: String,
    },

    /// The transaction did not reach `finalized` within the deadline.
    #[error("transaction {signature} not finalized within {timeout_secs}s")]
    FinalizationTimeout {
        /// Signature still awaiting finalization.
        signature: String,
        /// The deadline that elapsed.
        timeout_secs: u64,
    },
}

/// Capabilities consumed from the external append-only ledger.
///
/// Implementations hold the writer identity; every call is implicitly scoped
/// to that address.
pub trait LedgerClient: Send + Sync {
    /// Recent memo-bearing transactions for the writer, newest first.
    fn recent_memos(&self, limit: usize) -> BoxFuture<'_, Result<Vec<MemoRecord>, LedgerError>>;

    /// Publishes a memo and waits for `finalized` confirmation by polling.
    fn publish_memo<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<PublishResult, LedgerError>>;

    /// External entropy at `finalized` commitment, base58-encoded 32 bytes.
    ///
    /// `None` means the source is currently unavailable; callers that anchor
    /// to entropy must fail closed on it.
    fn external_entropy(&self) -> BoxFuture<'_, Result<Option<String>, LedgerError>>;

    /// Writer balance in the ledger's minor units.
    fn account_balance(&self) -> BoxFuture<'_, Result<u64, LedgerError>>;

    /// The writer address this client publishes from.
    fn writer_address(&self) -> String;
}
