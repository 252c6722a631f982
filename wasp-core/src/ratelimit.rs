// src/ratelimit.rs
//! Sliding-window rate limiter over arbitrary string keys.
//!
//! A window restarts once its start plus `window_ms` has elapsed. Stale
//! entries are swept opportunistically while the map lock is already held,
//! at most once per window, so no background thread touches the request
//! path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::config::RateLimitConfig;

/// Windows older than this many window-lengths are dropped by the sweep.
const SWEEP_AGE_WINDOWS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Milliseconds until the current window resets.
    pub reset_ms: u64,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
struct Counters {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<Counters>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Count one request against `key`. Within one window at most
    /// `cfg.max_requests` calls see `allowed = true`.
    pub fn check(&self, key: &str, cfg: &RateLimitConfig) -> RateDecision {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        self.maybe_sweep(&mut state, cfg, now);

        let window = state
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        let elapsed_ms = now.duration_since(window.started).as_millis() as u64;
        if elapsed_ms >= cfg.window_ms {
            window.started = now;
            window.count = 0;
        }

        let reset_ms = cfg
            .window_ms
            .saturating_sub(now.duration_since(window.started).as_millis() as u64);

        if window.count >= cfg.max_requests {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_ms,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            remaining: cfg.max_requests - window.count,
            reset_ms,
        }
    }

    /// Drop entries whose window started more than five windows ago. Runs
    /// at most once per window length.
    fn maybe_sweep(&self, state: &mut Counters, cfg: &RateLimitConfig, now: Instant) {
        let since_sweep = now.duration_since(state.last_sweep).as_millis() as u64;
        if since_sweep < cfg.window_ms {
            return;
        }
        let horizon_ms = cfg.window_ms.saturating_mul(SWEEP_AGE_WINDOWS);
        state.windows.retain(|_, w| {
            (now.duration_since(w.started).as_millis() as u64) < horizon_ms
        });
        state.last_sweep = now;
    }

    /// Number of live keys. Diagnostic only.
    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
