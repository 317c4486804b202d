//! HTTP request shell.
//!
//! Builds the axum router, wires shared state, injects CORS on the public
//! surface (the cron route is exempt), resolves client IPs behind proxies,
//! and enforces body-size caps. Handlers live in [`handlers`]; status-code
//! mapping in [`error`].

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use beats_core::keys::ReceiptSigner;

use crate::cache::{AnchorCache, ANCHOR_CACHE_TTL};
use crate::config::{Cluster, Config};
use crate::ledger::LedgerClient;
use crate::rate_limit::{spawn_sweeper, FixedWindowLimiter, DEFAULT_MAX_KEYS};

/// Body cap for the verification endpoints: a full 1000-beat chain with
/// generous per-beat overhead.
const VERIFY_BODY_LIMIT: usize = 512 * 1024;

/// Body cap for a timestamp request.
pub const TIMESTAMP_BODY_LIMIT: usize = 256;

/// Per-key quota on the verification endpoints.
const VERIFY_RATE_PER_MINUTE: u32 = 60;

/// The rate limiters of the public surface.
pub struct Limiters {
    /// Shared quota for verify and work-proof.
    pub verify: Arc<FixedWindowLimiter>,

    /// Free-tier timestamp quota, per minute.
    pub timestamp_minute: Arc<FixedWindowLimiter>,

    /// Free-tier timestamp quota, per day.
    pub timestamp_day: Arc<FixedWindowLimiter>,

    /// Pro-tier timestamp quota, per minute.
    pub pro_minute: Arc<FixedWindowLimiter>,

    /// Pro-tier timestamp quota, per day.
    pub pro_day: Arc<FixedWindowLimiter>,
}

impl Limiters {
    /// Creates the limiter set at the public quotas.
    #[must_use]
    pub fn new() -> Self {
        let minute = Duration::from_secs(60);
        let day = Duration::from_secs(24 * 60 * 60);
        Self {
            verify: Arc::new(FixedWindowLimiter::new(
                VERIFY_RATE_PER_MINUTE,
                minute,
                DEFAULT_MAX_KEYS,
            )),
            timestamp_minute: Arc::new(FixedWindowLimiter::new(5, minute, DEFAULT_MAX_KEYS)),
            timestamp_day: Arc::new(FixedWindowLimiter::new(10, day, DEFAULT_MAX_KEYS)),
            pro_minute: Arc::new(FixedWindowLimiter::new(30, minute, DEFAULT_MAX_KEYS)),
            pro_day: Arc::new(FixedWindowLimiter::new(500, day, DEFAULT_MAX_KEYS)),
        }
    }

    fn all(&self) -> Vec<Arc<FixedWindowLimiter>> {
        vec![
            Arc::clone(&self.verify),
            Arc::clone(&self.timestamp_minute),
            Arc::clone(&self.timestamp_day),
            Arc::clone(&self.pro_minute),
            Arc::clone(&self.pro_day),
        ]
    }
}

impl Default for Limiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state behind every handler.
pub struct AppState {
    /// Cluster for explorer links.
    pub cluster: Cluster,

    /// Cron bearer credential, when configured.
    pub cron_secret: Option<SecretString>,

    /// Pro-tier token, when configured.
    pub pro_tier_token: Option<SecretString>,

    /// Receipt signing hierarchy.
    pub signer: ReceiptSigner,

    /// The ledger writer address.
    pub writer_address: String,

    /// Ledger client.
    pub ledger: Arc<dyn LedgerClient>,

    /// Read-through anchor cache.
    pub cache: AnchorCache,

    /// Public-surface rate limiters.
    pub limiters: Limiters,
}

impl AppState {
    /// Assembles state from configuration, the signer, and a ledger client.
    #[must_use]
    pub fn new(config: Config, signer: ReceiptSigner, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            cluster: config.cluster,
            cron_secret: config.cron_secret,
            pro_tier_token: config.pro_tier_token,
            signer,
            writer_address: ledger.writer_address(),
            ledger,
            cache: AnchorCache::new(ANCHOR_CACHE_TTL),
            limiters: Limiters::new(),
        }
    }
}

/// Builds the full router and starts the limiter sweeps.
pub fn build_router(state: Arc<AppState>) -> Router {
    spawn_sweeper(state.limiters.all());

    let public = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/v1/beat/anchor", get(handlers::anchor_tip))
        .route("/api/v1/beat/key", get(handlers::signing_keys))
        .route(
            "/api/v1/beat/verify",
            get(handlers::verify_metadata).post(handlers::verify),
        )
        .route("/api/v1/beat/timestamp", post(handlers::timestamp))
        .route("/api/v1/beat/work-proof", post(handlers::work_proof))
        .layer(middleware::from_fn(cors))
        .layer(DefaultBodyLimit::max(VERIFY_BODY_LIMIT));

    // The cron route is scheduler-facing; no CORS injection.
    let cron = Router::new().route("/api/cron/anchor", get(handlers::cron_anchor));

    public.merge(cron).with_state(state)
}

/// CORS injection for the public surface; answers preflights with 204.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type, Authorization, X-Beats-Tier-Token"),
    );
}

/// Resolves the caller's IP from proxy headers.
///
/// Priority mirrors the deployment stack: the platform's forwarded header
/// first, then the common reverse-proxy ones, then the last hop of
/// `x-forwarded-for`, else loopback.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    for name in ["x-vercel-forwarded-for", "x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(last) = value.split(',').next_back() {
            let trimmed = last.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    "127.0.0.1".to_string()
}

/// Timing-safe string comparison for bearer credentials.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whether the request's content type is JSON.
#[must_use]
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            let essence = v.split(';').next().unwrap_or("").trim();
            essence.eq_ignore_ascii_case("application/json")
        })
}

/// Checks a bearer `Authorization` header against an expected secret in
/// constant time.
#[must_use]
pub fn bearer_matches(headers: &HeaderMap, expected: &SecretString) -> bool {
    let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    constant_time_eq(value, &format!("Bearer {}", expected.expose_secret()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn client_ip_priority() {
        let headers = headers_with(&[
            ("x-forwarded-for", "1.1.1.1, 2.2.2.2"),
            ("cf-connecting-ip", "3.3.3.3"),
            ("x-real-ip", "4.4.4.4"),
            ("x-vercel-forwarded-for", "5.5.5.5"),
        ]);
        assert_eq!(client_ip(&headers), "5.5.5.5");

        let headers = headers_with(&[
            ("x-forwarded-for", "1.1.1.1, 2.2.2.2"),
            ("cf-connecting-ip", "3.3.3.3"),
        ]);
        assert_eq!(client_ip(&headers), "3.3.3.3");

        let headers = headers_with(&[("x-forwarded-for", "1.1.1.1, 2.2.2.2")]);
        assert_eq!(client_ip(&headers), "2.2.2.2");

        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }

    #[test]
    fn content_type_check() {
        assert!(is_json_content_type(&headers_with(&[(
            "content-type",
            "application/json"
        )])));
        assert!(is_json_content_type(&headers_with(&[(
            "content-type",
            "application/json; charset=utf-8"
        )])));
        assert!(!is_json_content_type(&headers_with(&[(
            "content-type",
            "text/plain"
        )])));
        assert!(!is_json_content_type(&HeaderMap::new()));
    }

    #[test]
    fn bearer_comparison() {
        let secret = SecretString::from("cron-secret");
        let good = headers_with(&[("authorization", "Bearer cron-secret")]);
        assert!(bearer_matches(&good, &secret));

        let bad = headers_with(&[("authorization", "Bearer wrong")]);
        assert!(!bearer_matches(&bad, &secret));

        assert!(!bearer_matches(&HeaderMap::new(), &secret));
    }

    #[test]
    fn constant_time_eq_behaves() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
