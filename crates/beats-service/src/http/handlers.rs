//! Endpoint handlers.
//!
//! Every handler is auth-free (except cron), idempotent from the caller's
//! point of view, and returns domain-invalid outcomes as 200s with
//! `valid:false`. Transport problems map through [`super::error::ApiError`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use beats_core::constants::{
    ANCHOR_HASH_GRACE_WINDOW, ANCHOR_INTERVAL_MS, DEFAULT_DIFFICULTY, MAX_CHAIN_BEATS,
    MIN_DIFFICULTY, PUBLIC_MAX_DIFFICULTY, PUBLIC_MAX_SPOT_CHECKS,
};

use super::error::ApiError;
use super::{
    bearer_matches, client_ip, is_json_content_type, AppState, TIMESTAMP_BODY_LIMIT,
};
use crate::advance::{advance_anchor, AdvanceError, AdvanceOutcome};
use crate::cache::ANCHOR_CACHE_TTL;
use crate::config::TIER_TOKEN_HEADER;
use crate::rate_limit::FixedWindowLimiter;
use crate::timestamp::{is_valid_digest, timestamp_digest, Tier, TimestampError};
use crate::verify::{
    build_work_proof_receipt, check_verify_structure, evaluate_work_proof, run_beat_mode,
    run_chain_mode, run_proof_mode, VerifyRequest, WorkProofRequest, WorkProofVerdict,
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn check_rate(limiter: &FixedWindowLimiter, key: &str) -> Result<(), ApiError> {
    let decision = limiter.check(key);
    if decision.allowed {
        Ok(())
    } else {
        Err(ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        })
    }
}

fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, ApiError> {
    if !is_json_content_type(headers) {
        return Err(ApiError::UnsupportedMediaType);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (status, anchor) = match state.cache.latest(&*state.ledger).await {
        Ok(Some(tip)) => (
            "ok",
            Some(json!({
                "beat_index": tip.beat_index,
                "hash": tip.hash,
                "utc": tip.utc,
                "epoch": tip.epoch,
            })),
        ),
        Ok(None) => ("degraded", None),
        Err(error) => {
            tracing::warn!(%error, "health probe could not read the ledger");
            ("degraded", None)
        },
    };

    Json(json!({
        "service": "beats",
        "status": status,
        "timestamp": now_ms(),
        "anchor": anchor,
        "anchor_signer": state.writer_address,
        "timing": {
            "anchor_interval_ms": ANCHOR_INTERVAL_MS,
            "grace_window": ANCHOR_HASH_GRACE_WINDOW,
            "anchor_cache_ttl_ms": ANCHOR_CACHE_TTL.as_millis() as u64,
        },
        "operations": [
            "GET /api/health",
            "GET /api/v1/beat/anchor",
            "GET /api/v1/beat/key",
            "GET|POST /api/v1/beat/verify",
            "POST /api/v1/beat/timestamp",
            "POST /api/v1/beat/work-proof",
        ],
    }))
}

/// `GET /api/v1/beat/anchor` — canonical tip plus a signed observation
/// receipt.
pub async fn anchor_tip(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let tip = state
        .cache
        .latest(&*state.ledger)
        .await
        .map_err(|e| ApiError::Unavailable(format!("ledger unavailable: {e}")))?
        .ok_or_else(|| ApiError::Unavailable("no anchor available yet".to_string()))?;

    let payload = json!({
        "type": "anchor",
        "beat_index": tip.beat_index,
        "hash": tip.hash,
        "prev_hash": tip.prev_hash,
        "utc": tip.utc,
        "difficulty": tip.difficulty,
        "epoch": tip.epoch,
    });
    let signature = state.signer.timestamp.sign_value(&payload);

    Ok(Json(json!({
        "anchor": tip,
        "receipt": {
            "payload": payload,
            "signature": signature,
            "public_key": state.signer.timestamp.public_key_hex(),
        },
    })))
}

/// `GET /api/v1/beat/key` — the receipt verification keys.
pub async fn signing_keys(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "algorithm": "Ed25519",
        "keys": {
            "timestamp": {
                "public_key_hex": state.signer.timestamp.public_key_hex(),
                "public_key_base58": state.signer.timestamp.public_key_base58(),
                "signing_context": state.signer.timestamp.context(),
            },
            "work_proof": {
                "public_key_hex": state.signer.work_proof.public_key_hex(),
                "public_key_base58": state.signer.work_proof.public_key_base58(),
                "signing_context": state.signer.work_proof.context(),
            },
        },
    }))
}

/// `GET /api/v1/beat/verify` — capability metadata.
pub async fn verify_metadata() -> Json<Value> {
    Json(json!({
        "modes": ["beat", "chain", "proof"],
        "difficulty": {
            "default": DEFAULT_DIFFICULTY,
            "max": PUBLIC_MAX_DIFFICULTY,
            "work_proof_min": MIN_DIFFICULTY,
        },
        "limits": {
            "max_beats": MAX_CHAIN_BEATS,
            "max_spot_checks": PUBLIC_MAX_SPOT_CHECKS,
        },
    }))
}

/// `POST /api/v1/beat/verify` — beat, chain, or proof mode.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_rate(&state.limiters.verify, &client_ip(&headers))?;

    let value = parse_json_body(&headers, &body)?;
    let request: VerifyRequest = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("invalid verify request: {e}")))?;
    check_verify_structure(&request).map_err(ApiError::BadRequest)?;

    let response = match &request {
        VerifyRequest::Beat { beat, difficulty } => {
            let outcome = run_beat_mode(beat, *difficulty);
            tracing::debug!(mode = "beat", valid = outcome.valid, "verify request");
            serde_json::to_value(outcome)
        },
        VerifyRequest::Chain {
            beats,
            spot_checks,
            difficulty,
        } => {
            let outcome = run_chain_mode(beats, *spot_checks, *difficulty);
            tracing::debug!(
                mode = "chain",
                valid = outcome.valid,
                chain_length = outcome.chain_length,
                "verify request"
            );
            serde_json::to_value(outcome)
        },
        VerifyRequest::Proof { proof, difficulty } => {
            let outcome = run_proof_mode(proof, *difficulty);
            tracing::debug!(
                mode = "proof",
                valid = outcome.valid,
                reason = outcome.reason.as_deref().unwrap_or(""),
                "verify request"
            );
            serde_json::to_value(outcome)
        },
    };

    response
        .map(Json)
        .map_err(|e| ApiError::Internal(format!("response encoding failed: {e}")))
}

#[derive(Debug, Deserialize)]
struct TimestampRequest {
    hash: String,
}

/// `POST /api/v1/beat/timestamp`
pub async fn timestamp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !is_json_content_type(&headers) {
        return Err(ApiError::UnsupportedMediaType);
    }
    if body.len() > TIMESTAMP_BODY_LIMIT {
        return Err(ApiError::PayloadTooLarge);
    }

    let request: TimestampRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;
    if !is_valid_digest(&request.hash) {
        return Err(ApiError::BadRequest(
            "hash must be 64 lowercase hex characters".to_string(),
        ));
    }

    let tier = resolve_tier(&state, &headers);
    let ip = client_ip(&headers);
    let (minute, day) = match tier {
        Tier::Pro => (&state.limiters.pro_minute, &state.limiters.pro_day),
        Tier::Free => (&state.limiters.timestamp_minute, &state.limiters.timestamp_day),
    };
    check_rate(minute, &ip)?;
    check_rate(day, &ip)?;

    let receipt = timestamp_digest(
        &request.hash,
        now_ms(),
        &*state.ledger,
        &state.cache,
        state.cluster,
        &state.signer.timestamp,
    )
    .await
    .map_err(|error| match &error {
        TimestampError::NoAnchor | TimestampError::LowBalance { .. } => {
            ApiError::Unavailable(error.to_string())
        },
        TimestampError::Ledger(_) | TimestampError::Memo(_) => {
            ApiError::Internal(error.to_string())
        },
    })?;

    Ok(Json(json!({
        "timestamp": receipt.payload,
        "on_chain": {
            "tx_signature": receipt.tx_signature,
            "explorer_url": receipt.explorer_url,
        },
        "receipt": {
            "signature": receipt.signature,
            "public_key": state.signer.timestamp.public_key_hex(),
        },
        "tier": tier.as_str(),
    })))
}

fn resolve_tier(state: &AppState, headers: &HeaderMap) -> Tier {
    let Some(expected) = &state.pro_tier_token else {
        return Tier::Free;
    };
    let Some(provided) = headers.get(TIER_TOKEN_HEADER).and_then(|v| v.to_str().ok()) else {
        return Tier::Free;
    };
    if super::constant_time_eq(provided, expected.expose_secret()) {
        Tier::Pro
    } else {
        Tier::Free
    }
}

/// `POST /api/v1/beat/work-proof`
pub async fn work_proof(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_rate(&state.limiters.verify, &client_ip(&headers))?;

    let value = parse_json_body(&headers, &body)?;
    let request = WorkProofRequest::from_body(&value).map_err(ApiError::BadRequest)?;
    request.check_structure().map_err(ApiError::BadRequest)?;

    // Freshness binds to the cached tip; an unreadable ledger degrades to the
    // cold-start path rather than failing the submission.
    let tip = match state.cache.latest(&*state.ledger).await {
        Ok(tip) => tip,
        Err(error) => {
            tracing::warn!(%error, "tip unavailable, skipping freshness check");
            None
        },
    };

    match evaluate_work_proof(&request, tip.as_ref()) {
        WorkProofVerdict::Rejected { reason } => {
            tracing::info!(reason, "work proof rejected");
            Ok(Json(json!({ "valid": false, "reason": reason })))
        },
        WorkProofVerdict::Accepted {
            difficulty,
            spot_checks_verified,
        } => {
            let receipt = build_work_proof_receipt(
                &request,
                difficulty,
                spot_checks_verified,
                now_ms(),
                &state.signer.work_proof,
            );
            tracing::info!(
                beats_computed = request.beats_computed,
                difficulty,
                spot_checks_verified,
                "work proof accepted"
            );
            Ok(Json(json!({
                "valid": true,
                "receipt": receipt,
                "public_key": state.signer.work_proof.public_key_hex(),
            })))
        },
    }
}

/// `GET /api/cron/anchor` — scheduler-driven anchor advancement.
pub async fn cron_anchor(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(secret) = &state.cron_secret else {
        return ApiError::Unavailable("cron secret not configured".to_string()).into_response();
    };
    if !bearer_matches(&headers, secret) {
        return ApiError::Unauthorized.into_response();
    }

    let started = std::time::Instant::now();
    match advance_anchor(&*state.ledger, now_ms()).await {
        Ok(AdvanceOutcome::Skipped { beat_index, next_at }) => Json(json!({
            "status": "skipped",
            "reason": "anchor_still_fresh",
            "beat_index": beat_index,
            "next_at": next_at,
        }))
        .into_response(),
        Ok(AdvanceOutcome::Generated {
            beat_index,
            hash,
            tx_signature,
            elapsed_ms,
        }) => {
            state.cache.invalidate();
            Json(json!({
                "status": "generated",
                "beat_index": beat_index,
                "hash": hash,
                "tx_signature": tx_signature,
                "elapsed_ms": elapsed_ms,
            }))
            .into_response()
        },
        Err(AdvanceError::MissingEntropy) => {
            let error = ApiError::Unavailable("external entropy unavailable".to_string());
            error.into_response()
        },
        Err(error) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::error!(%error, elapsed_ms, "anchor advancement failed");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string(), "elapsed_ms": elapsed_ms })),
            )
                .into_response()
        },
    }
}
