//! # beats-core
//!
//! Cryptographic engine and protocol types for Beats, a public time
//! authentication service built on a sequential SHA-256 hash chain.
//!
//! This crate is pure: no I/O, no clock, no async. It provides:
//!
//! - **Beats**: the sequential-work primitive ([`beat::compute_beat`],
//!   [`beat::verify_beat`]) defined over lowercase hex strings.
//! - **Anchors**: the published clock ticks, with the legacy V1 formula and
//!   the entropy-mixing V3 formula ([`anchor`]).
//! - **Memos**: the canonical-JSON wire codec for anchors and timestamps
//!   ([`memo`]).
//! - **Fork choice**: continuity-aware selection of the canonical tip from
//!   ledger observations ([`select`]).
//! - **Verification**: deterministic spot sampling over chains ([`chain`])
//!   and check-in proofs ([`checkin`]).
//! - **Receipts**: the HKDF subkey hierarchy and canonical-JSON Ed25519
//!   signing ([`keys`]).
//!
//! ## Example
//!
//! ```rust
//! use beats_core::beat::{compute_beat, verify_beat};
//!
//! let prev = "0".repeat(64);
//! let beat = compute_beat(&prev, 1, 100, None, None);
//! assert!(verify_beat(&beat, 100));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod anchor;
pub mod beat;
pub mod canonical;
pub mod chain;
pub mod checkin;
pub mod constants;
pub mod keys;
pub mod memo;
pub mod select;

pub use anchor::{create_global_anchor, verify_global_anchor, GlobalAnchor};
pub use beat::{compute_beat, verify_beat, Beat};
pub use chain::verify_beat_chain;
pub use checkin::{verify_checkin_proof, CheckinProof, SpotCheck};
pub use keys::{AnchorSecret, ReceiptSigner};
pub use select::{is_continuous_next_anchor, select_canonical_anchor};
