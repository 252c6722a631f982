// src/session.rs
//! Per-session turn state: the binding between an inbound sender and the
//! tool-call decisions its turn triggers.
//!
//! The original shape of this component was a pair of process globals; that
//! breaks under concurrent sessions, because a tool call must observe the
//! turn that scheduled it. State is therefore a map keyed by the host's
//! session key. Operations on distinct keys are disjoint; operations on one
//! key are linearizable through the map lock.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Platform, TrustLevel, TurnState};

/// Session key used when the host supplies none. All keyless calls share
/// this bucket, so genuinely different conversations collapse into one
/// turn state; hosts that need isolation must propagate real keys.
pub const DEFAULT_SESSION_KEY: &str = "__default__";

#[derive(Debug, Default)]
pub struct SessionMap {
    inner: RwLock<HashMap<String, TurnState>>,
}

fn resolve(key: Option<&str>) -> &str {
    match key {
        Some(k) if !k.is_empty() => k,
        _ => DEFAULT_SESSION_KEY,
    }
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the session to the given trust label and sender. `trust = None`
    /// records an unknown sender; the binding still matters so tool calls
    /// in this turn are attributed to the right identifier.
    pub fn set_turn(
        &self,
        key: Option<&str>,
        trust: Option<TrustLevel>,
        sender: &str,
        platform: Platform,
    ) {
        let state = TurnState {
            trust,
            sender: Some(sender.to_string()),
            platform: Some(platform),
        };
        // Lock poisoning only happens if a writer panicked; the map holds
        // plain data, so the previous value is still consistent.
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(resolve(key).to_string(), state);
    }

    /// Current turn state for the session; empty when no inbound has been
    /// processed since the last `clear_turn`.
    pub fn get_turn(&self, key: Option<&str>) -> TurnState {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(resolve(key)).cloned().unwrap_or_default()
    }

    /// Drop the session's turn state (turn end). Unknown keys are a no-op.
    pub fn clear_turn(&self, key: Option<&str>) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(resolve(key));
    }

    /// Number of sessions currently bound. Diagnostic only.
    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
