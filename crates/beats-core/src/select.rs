//! Continuity-aware fork choice over observed anchor candidates.
//!
//! A ledger scan can surface several claimed tips: stale anchors, duplicates
//! from retried publishes, or forged records from other writers. The selector
//! prefers tips whose `prev_hash` links resolve into the observed candidate
//! set (or that are proper genesis anchors) over unlinked tips of any height,
//! then takes the highest, deepest, lexicographically-smallest survivor. The
//! result is invariant under input order.

use std::collections::{HashMap, HashSet};

use crate::anchor::{genesis_prev_hash, GlobalAnchor};
use crate::beat::is_hex_hash;

/// Candidate tip together with its resolved link depth.
#[derive(Debug, Clone)]
struct RankedTip {
    anchor: GlobalAnchor,
    depth: usize,
    linked: bool,
}

fn dedup_key(a: &GlobalAnchor) -> (u64, String, String, i64, u32, u32) {
    (
        a.beat_index,
        a.hash.clone(),
        a.prev_hash.clone(),
        a.utc,
        a.difficulty,
        a.epoch,
    )
}

fn well_formed(a: &GlobalAnchor) -> bool {
    is_hex_hash(&a.hash) && is_hex_hash(&a.prev_hash) && a.difficulty > 0 && a.utc >= 0
}

/// Number of candidates reachable from `tip` by following `prev_hash` links,
/// including the tip itself.
fn link_depth(tip: &GlobalAnchor, by_hash: &HashMap<&str, &GlobalAnchor>) -> usize {
    let mut depth = 1;
    let mut visited = HashSet::new();
    visited.insert(tip.hash.as_str());

    let mut current = tip;
    while let Some(parent) = by_hash.get(current.prev_hash.as_str()) {
        if !visited.insert(parent.hash.as_str()) {
            break; // cycle among forged candidates
        }
        depth += 1;
        current = parent;
    }
    depth
}

/// Picks the canonical tip from a set of observed candidates.
///
/// Returns `None` when no well-formed candidate exists.
#[must_use]
pub fn select_canonical_anchor(candidates: &[GlobalAnchor]) -> Option<GlobalAnchor> {
    let mut seen = HashSet::new();
    let mut pool: Vec<GlobalAnchor> = Vec::new();
    for candidate in candidates {
        if !well_formed(candidate) {
            continue;
        }
        if seen.insert(dedup_key(candidate)) {
            pool.push(candidate.clone());
        }
    }
    if pool.is_empty() {
        return None;
    }

    let by_hash: HashMap<&str, &GlobalAnchor> =
        pool.iter().map(|a| (a.hash.as_str(), a)).collect();
    let genesis_prev = genesis_prev_hash();

    let mut ranked: Vec<RankedTip> = pool
        .iter()
        .map(|anchor| {
            let depth = link_depth(anchor, &by_hash);
            let is_genesis = anchor.beat_index == 0 && anchor.prev_hash == genesis_prev;
            RankedTip {
                anchor: anchor.clone(),
                depth,
                linked: is_genesis || depth > 1,
            }
        })
        .collect();

    if ranked.iter().any(|t| t.linked) {
        ranked.retain(|t| t.linked);
    }

    ranked.sort_by(|a, b| {
        b.anchor
            .beat_index
            .cmp(&a.anchor.beat_index)
            .then(b.depth.cmp(&a.depth))
            .then(a.anchor.hash.cmp(&b.anchor.hash))
            .then(a.anchor.utc.cmp(&b.anchor.utc))
            .then(a.anchor.epoch.cmp(&b.anchor.epoch))
    });

    ranked.into_iter().next().map(|t| t.anchor)
}

/// Whether `incoming` is the unique legal successor of `latest`.
///
/// With no prior anchor, only a height-0 anchor rooted at the genesis prev
/// hash qualifies. Same-index replays and index jumps are rejected.
#[must_use]
pub fn is_continuous_next_anchor(latest: Option<&GlobalAnchor>, incoming: &GlobalAnchor) -> bool {
    if !well_formed(incoming) {
        return false;
    }
    match latest {
        None => incoming.beat_index == 0 && incoming.prev_hash == genesis_prev_hash(),
        Some(tip) => {
            incoming.beat_index == tip.beat_index + 1 && incoming.prev_hash == tip.hash
        },
    }
}
