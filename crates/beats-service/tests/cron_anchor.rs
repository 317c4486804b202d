//! End-to-end coverage of the cron anchor-advancement endpoint.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use beats_core::anchor::create_global_anchor;
use beats_core::memo::{parse_anchor_memo, serialize_anchor_memo};
use common::{get_json, get_json_with_headers, test_app, CRON_SECRET};

const CRON: &str = "/api/cron/anchor";

fn auth_header() -> (&'static str, String) {
    ("authorization", format!("Bearer {CRON_SECRET}"))
}

#[tokio::test]
async fn refuses_without_configured_secret() {
    let (router, _ledger) = test_app(false);
    let (status, body) = get_json(&router, CRON).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("cron secret"));
}

#[tokio::test]
async fn rejects_wrong_bearer() {
    let (router, ledger) = test_app(true);

    let (status, _body) = get_json(&router, CRON).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _body) =
        get_json_with_headers(&router, CRON, &[("authorization", "Bearer wrong")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ledger.memo_count(), 0);
}

#[tokio::test]
async fn bootstraps_the_genesis_anchor() {
    let (router, ledger) = test_app(true);
    let (name, value) = auth_header();

    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("generated"));
    assert_eq!(body["beat_index"], json!(0));
    assert!(body["tx_signature"].is_string());
    assert!(body["elapsed_ms"].is_u64());

    let parsed = parse_anchor_memo(&ledger.last_memo().unwrap()).unwrap();
    assert_eq!(parsed.hash, body["hash"].as_str().unwrap());
    assert!(parsed.solana_entropy.is_some());

    // A second call inside the same interval is a no-op: two invocations
    // produce at most one on-chain memo.
    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("skipped"));
    assert_eq!(ledger.memo_count(), 1);
}

#[tokio::test]
async fn second_call_within_the_interval_skips() {
    let (router, ledger) = test_app(true);
    let (name, value) = auth_header();

    // Seed a tip stamped "now" so the freshness gate engages.
    let fresh = create_global_anchor(None, 1000, 0, None, chrono::Utc::now().timestamp_millis())
        .unwrap();
    ledger.seed_memo(&serialize_anchor_memo(&fresh).unwrap());

    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("skipped"));
    assert_eq!(body["reason"], json!("anchor_still_fresh"));
    assert_eq!(body["next_at"], json!(fresh.utc + 60_000));

    // At most one memo on chain: the seeded tip.
    assert_eq!(ledger.memo_count(), 1);
}

#[tokio::test]
async fn fails_closed_when_entropy_is_unavailable() {
    let (router, ledger) = test_app(true);
    let (name, value) = auth_header();
    ledger.set_entropy(None);

    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("entropy"));

    // No memo was published; the tip is unchanged on the next read.
    assert_eq!(ledger.memo_count(), 0);

    ledger.set_entropy(Some(bs58::encode([5u8; 32]).into_string()));
    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["beat_index"], json!(0));
}

#[tokio::test]
async fn publish_failure_is_a_500() {
    let (router, ledger) = test_app(true);
    let (name, value) = auth_header();
    ledger.fail_next_publishes(true);

    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert!(body["elapsed_ms"].is_u64());
    assert_eq!(ledger.memo_count(), 0);
}

#[tokio::test]
async fn extends_an_aged_chain() {
    let (router, ledger) = test_app(true);
    let (name, value) = auth_header();

    // A tip older than the interval.
    let aged = create_global_anchor(
        None,
        1000,
        0,
        None,
        chrono::Utc::now().timestamp_millis() - 120_000,
    )
    .unwrap();
    ledger.seed_memo(&serialize_anchor_memo(&aged).unwrap());

    let (status, body) = get_json_with_headers(&router, CRON, &[(name, &value)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("generated"));
    assert_eq!(body["beat_index"], json!(1));

    let parsed = parse_anchor_memo(&ledger.last_memo().unwrap()).unwrap();
    assert_eq!(parsed.prev_hash, aged.hash);
}
