//! Solana JSON-RPC ledger client.
//!
//! Talks to a single RPC endpoint over HTTP. All reads and status checks use
//! `finalized` commitment. Publication is deliberately subscription-free: the
//! transaction is sent, then its signature status is polled every two seconds
//! for up to sixty, which works in serverless-style deployments where no
//! websocket can be held open. Responses on the publish path are requested
//! with caching disabled so a stale proxy can never report a phantom
//! confirmation.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use tokio::time::sleep;

use super::{BoxFuture, LedgerClient, LedgerError, MemoRecord, PublishResult};

/// SPL memo program address.
const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// Per-request transport deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Total time to wait for `finalized` after sending a transaction.
const FINALIZATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between signature-status polls.
const FINALIZATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A ledger client bound to one RPC endpoint and one writer keypair.
pub struct RpcLedger {
    http: reqwest::Client,
    url: String,
    writer: SigningKey,
    writer_address: String,
}

impl RpcLedger {
    /// Creates a client for the given endpoint and writer key.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, writer: SigningKey) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        let writer_address = bs58::encode(writer.verifying_key().to_bytes()).into_string();
        Ok(Self {
            http,
            url: url.into(),
            writer,
            writer_address,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.url)
            .header("cache-control", "no-store")
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method}: {e}")))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method}: {e}")))?;
        if let Some(err) = payload.get("error") {
            return Err(LedgerError::Rpc(format!("{method}: {err}")));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Rpc(format!("{method}: missing result")))
    }

    async fn latest_blockhash(&self) -> Result<String, LedgerError> {
        let result = self
            .rpc_call(
                "getLatestBlockhash",
                json!([{ "commitment": "finalized" }]),
            )
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LedgerError::Rpc("getLatestBlockhash: missing blockhash".into()))
    }

    /// Builds, signs, and base64-encodes a legacy memo transaction.
    fn build_memo_transaction(&self, payload: &[u8], blockhash: &str) -> Result<String, LedgerError> {
        let program_id = bs58::decode(MEMO_PROGRAM_ID)
            .into_vec()
            .map_err(|e| LedgerError::Rpc(format!("memo program id: {e}")))?;
        let blockhash_bytes = bs58::decode(blockhash)
            .into_vec()
            .map_err(|e| LedgerError::Rpc(format!("blockhash: {e}")))?;
        if blockhash_bytes.len() != 32 {
            return Err(LedgerError::Rpc("blockhash is not 32 bytes".into()));
        }

        // Legacy message: header, account keys, blockhash, instructions.
        let mut message = Vec::with_capacity(128 + payload.len());
        message.push(1); // required signatures
        message.push(0); // read-only signed accounts
        message.push(1); // read-only unsigned accounts (the program)
        push_shortvec_len(&mut message, 2);
        message.extend_from_slice(&self.writer.verifying_key().to_bytes());
        message.extend_from_slice(&program_id);
        message.extend_from_slice(&blockhash_bytes);
        push_shortvec_len(&mut message, 1);
        message.push(1); // program id index
        push_shortvec_len(&mut message, 0); // no instruction accounts
        push_shortvec_len(&mut message, payload.len());
        message.extend_from_slice(payload);

        let signature = self.writer.sign(&message);
        let mut transaction = Vec::with_capacity(1 + 64 + message.len());
        push_shortvec_len(&mut transaction, 1);
        transaction.extend_from_slice(&signature.to_bytes());
        transaction.extend_from_slice(&message);

        Ok(BASE64.encode(transaction))
    }

    /// Polls signature status until `finalized`, a reported failure, or the
    /// deadline.
    async fn await_finalization(&self, signature: &str) -> Result<u64, LedgerError> {
        let deadline = tokio::time::Instant::now() + FINALIZATION_TIMEOUT;
        loop {
            let result = self
                .rpc_call(
                    "getSignatureStatuses",
                    json!([[signature], { "searchTransactionHistory": true }]),
                )
                .await?;
            let status = result.pointer("/value/0").cloned().unwrap_or(Value::Null);
            if !status.is_null() {
                if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                    return Err(LedgerError::TransactionFailed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                if status
                    .get("confirmationStatus")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s == "finalized")
                {
                    return Ok(status.get("slot").and_then(Value::as_u64).unwrap_or(0));
                }
            }
            if tokio::time::Instant::now() + FINALIZATION_POLL_INTERVAL > deadline {
                return Err(LedgerError::FinalizationTimeout {
                    signature: signature.to_string(),
                    timeout_secs: FINALIZATION_TIMEOUT.as_secs(),
                });
            }
            sleep(FINALIZATION_POLL_INTERVAL).await;
        }
    }
}

impl LedgerClient for RpcLedger {
    fn recent_memos(&self, limit: usize) -> BoxFuture<'_, Result<Vec<MemoRecord>, LedgerError>> {
        Box::pin(async move {
            let result = self
                .rpc_call(
                    "getSignaturesForAddress",
                    json!([
                        self.writer_address,
                        { "limit": limit, "commitment": "finalized" }
                    ]),
                )
                .await?;
            let entries = result
                .as_array()
                .ok_or_else(|| LedgerError::Rpc("getSignaturesForAddress: not an array".into()))?;

            let records = entries
                .iter()
                .filter_map(|entry| {
                    let signature = entry.get("signature")?.as_str()?.to_string();
                    Some(MemoRecord {
                        signature,
                        confirmation_status: entry
                            .get("confirmationStatus")
                            .and_then(Value::as_str)
                            .unwrap_or("finalized")
                            .to_string(),
                        memo: entry
                            .get("memo")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect();
            Ok(records)
        })
    }

    fn publish_memo<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<PublishResult, LedgerError>> {
        Box::pin(async move {
            let blockhash = self.latest_blockhash().await?;
            let transaction = self.build_memo_transaction(payload, &blockhash)?;
            let result = self
                .rpc_call(
                    "sendTransaction",
                    json!([
                        transaction,
                        { "encoding": "base64", "preflightCommitment": "finalized" }
                    ]),
                )
                .await?;
            let signature = result
                .as_str()
                .ok_or_else(|| LedgerError::Rpc("sendTransaction: missing signature".into()))?
                .to_string();

            tracing::debug!(signature = %signature, "memo sent, awaiting finalization");
            let slot = self.await_finalization(&signature).await?;
            Ok(PublishResult { signature, slot })
        })
    }

    fn external_entropy(&self) -> BoxFuture<'_, Result<Option<String>, LedgerError>> {
        Box::pin(async move {
            let result = self
                .rpc_call(
                    "getLatestBlockhash",
                    json!([{ "commitment": "finalized" }]),
                )
                .await?;
            Ok(result
                .pointer("/value/blockhash")
                .and_then(Value::as_str)
                .map(str::to_string))
        })
    }

    fn account_balance(&self) -> BoxFuture<'_, Result<u64, LedgerError>> {
        Box::pin(async move {
            let result = self
                .rpc_call(
                    "getBalance",
                    json!([self.writer_address, { "commitment": "finalized" }]),
                )
                .await?;
            result
                .pointer("/value")
                .and_then(Value::as_u64)
                .ok_or_else(|| LedgerError::Rpc("getBalance: missing value".into()))
        })
    }

    fn writer_address(&self) -> String {
        self.writer_address.clone()
    }
}

/// Appends a Solana compact-u16 ("shortvec") length.
fn push_shortvec_len(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}
