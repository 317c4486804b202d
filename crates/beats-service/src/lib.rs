//! # beats-service
//!
//! The Beats time authentication service: publishes an append-only chain of
//! anchors to a public ledger and verifies sequential SHA-256 work against
//! it over a small JSON HTTP surface.
//!
//! The cryptographic engine lives in `beats-core`; this crate adds the
//! operational shell:
//!
//! - **Ledger client** ([`ledger`]): memo reads, finalized publication by
//!   polling, external entropy, balance checks.
//! - **Anchor cache** ([`cache`]): a single-slot TTL cache over the
//!   continuity-aware tip selection.
//! - **Advancer** ([`advance`]): the cron-driven, fail-closed state machine
//!   that extends the anchor chain.
//! - **Verifier and timestamper** ([`verify`], [`timestamp`]): the public
//!   flows with cost guards and signed receipts.
//! - **Request shell** ([`http`], [`rate_limit`]): axum router, CORS, client
//!   IP resolution, fixed-window quotas.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod advance;
pub mod cache;
pub mod config;
pub mod http;
pub mod ledger;
pub mod rate_limit;
pub mod timestamp;
pub mod verify;

pub use http::{build_router, AppState};
