//! Fixed-window rate limiting keyed by client identity.
//!
//! Each key holds `{count, reset_at}`; a request increments the count, and
//! the window resets lazily once `reset_at` passes. A background sweep prunes
//! expired entries every minute, and a hard cap on distinct keys (evicted
//! FIFO) bounds memory no matter how many identities an attacker spoofs.
//!
//! # Thread safety
//!
//! All state sits behind one mutex; handlers run concurrently and contention
//! on a single increment is negligible next to the hash work they guard.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Floor on the distinct-key cap.
const MIN_TRACKED_KEYS: usize = 100;

/// Default distinct-key cap.
pub const DEFAULT_MAX_KEYS: usize = 20_000;

/// Interval between background sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request is within quota.
    pub allowed: bool,

    /// Requests left in the current window after this one.
    pub remaining: u32,

    /// Seconds until the window resets, rounded up.
    pub retry_after_secs: u64,
}

struct Entry {
    count: u32,
    reset_at: Instant,
}

struct LimiterState {
    entries: HashMap<String, Entry>,
    // Insertion order for FIFO eviction at the cap.
    order: VecDeque<String>,
}

/// A fixed-window limiter.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    max_keys: usize,
    state: Mutex<LimiterState>,
}

impl FixedWindowLimiter {
    /// Creates a limiter allowing `max_requests` per `window` per key.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration, max_keys: usize) -> Self {
        Self {
            max_requests,
            window,
            max_keys: max_keys.max(MIN_TRACKED_KEYS),
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Records a request for `key` and reports whether it is allowed.
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !state.entries.contains_key(key) {
            while state.entries.len() >= self.max_keys {
                match state.order.pop_front() {
                    Some(oldest) => {
                        state.entries.remove(&oldest);
                    },
                    None => break,
                }
            }
            state.entries.insert(
                key.to_string(),
                Entry {
                    count: 0,
                    reset_at: now + self.window,
                },
            );
            state.order.push_back(key.to_string());
        }

        let window = self.window;
        let max_requests = self.max_requests;
        let entry = state
            .entries
            .get_mut(key)
            .expect("entry inserted above");

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        let retry_after_secs = entry
            .reset_at
            .saturating_duration_since(now)
            .as_secs_f64()
            .ceil() as u64;

        if entry.count >= max_requests {
            tracing::warn!(key, count = entry.count, max = max_requests, "rate limit exceeded");
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: max_requests - entry.count,
            retry_after_secs,
        }
    }

    /// Removes entries whose window has fully elapsed.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let LimiterState { entries, order } = &mut *state;
        entries.retain(|_, entry| now < entry.reset_at);
        order.retain(|key| entries.contains_key(key));
    }

    /// Number of currently tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .len()
    }
}

/// Spawns the periodic sweep for a set of limiters.
///
/// The task lives on the runtime and dies with it; it never holds the
/// process open on its own.
pub fn spawn_sweeper(limiters: Vec<Arc<FixedWindowLimiter>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for limiter in &limiters {
                limiter.sweep();
            }
        }
    });
}
