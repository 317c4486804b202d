//! Shared harness for the HTTP suites: a router over the in-memory ledger
//! and small request helpers.

// Each suite uses a different slice of the harness.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use beats_core::anchor::{create_global_anchor, GlobalAnchor};
use beats_core::keys::AnchorSecret;
use beats_core::memo::serialize_anchor_memo;
use beats_service::config::{Cluster, Config};
use beats_service::ledger::MemoryLedger;
use beats_service::{build_router, AppState};

/// Cron credential used by the suites.
pub const CRON_SECRET: &str = "test-cron-secret";

/// Pro-tier token used by the suites.
pub const PRO_TOKEN: &str = "test-pro-token";

/// Seed for the test signer; suites re-derive the keys from it to verify
/// receipts independently.
pub const SIGNER_SEED: [u8; 32] = [7u8; 32];

pub fn test_config(with_cron_secret: bool) -> Config {
    Config {
        rpc_url: "https://api.devnet.solana.com".to_string(),
        cluster: Cluster::Devnet,
        cron_secret: with_cron_secret.then(|| SecretString::from(CRON_SECRET)),
        pro_tier_token: Some(SecretString::from(PRO_TOKEN)),
    }
}

/// Builds a router and keeps a handle on its ledger.
pub fn test_app(with_cron_secret: bool) -> (Router, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let config = test_config(with_cron_secret);
    let signer = AnchorSecret::from_seed(SIGNER_SEED).receipt_signer();
    let state = Arc::new(AppState::new(config, signer, ledger.clone()));
    (build_router(state), ledger)
}

/// Seeds a linked anchor chain of the given length; returns the tip.
pub fn seed_anchor_chain(ledger: &MemoryLedger, len: usize) -> GlobalAnchor {
    let mut prev: Option<GlobalAnchor> = None;
    for i in 0..len {
        let anchor =
            create_global_anchor(prev.as_ref(), 1000, 0, None, 1_700_000_000_000 + i as i64)
                .unwrap();
        ledger.seed_memo(&serialize_anchor_memo(&anchor).unwrap());
        prev = Some(anchor);
    }
    prev.expect("non-empty chain")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// POSTs a JSON body and returns status plus parsed response.
pub async fn post_json(router: &Router, path: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

/// POSTs a JSON body with extra headers.
pub async fn post_json_with_headers(
    router: &Router,
    path: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    send(router, request).await
}

/// GETs a path and returns status plus parsed response.
pub async fn get_json(router: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

/// GETs a path with headers and returns status plus parsed response.
pub async fn get_json_with_headers(
    router: &Router,
    path: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();
    send(router, request).await
}
