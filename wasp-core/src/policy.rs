// src/policy.rs
//! Tool access policy: dangerous / safe / unlisted decision bound to the
//! current turn's trust label.
//!
//! The engine is pure configuration plus input; it holds no mutable state,
//! so two identical inputs always produce identical outputs.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::PolicyConfig;
use crate::types::TrustLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ToolDecision {
    Allow,
    Block { reason: String },
}

impl ToolDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ToolDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct ToolPolicy {
    dangerous: HashSet<String>,
    safe: HashSet<String>,
    default_deny: bool,
}

impl ToolPolicy {
    pub fn from_config(cfg: &PolicyConfig) -> Self {
        Self {
            dangerous: cfg.dangerous_tools.iter().cloned().collect(),
            safe: cfg.safe_tools.iter().cloned().collect(),
            default_deny: cfg.default_deny,
        }
    }

    /// Decide whether `tool` may run for a turn bound to `trust`.
    ///
    /// Trusted and sovereign turns are allowed with no further checks.
    /// For limited or unknown turns the safe list allows, the dangerous
    /// list blocks, and unlisted tools default to allow (or block under
    /// the `default_deny` posture). A tool in both lists is dangerous:
    /// overlap can only tighten a configuration, never loosen it.
    pub fn decide(&self, tool: &str, trust: Option<TrustLevel>) -> ToolDecision {
        if trust.map(|t| t.can_act()).unwrap_or(false) {
            return ToolDecision::Allow;
        }
        // Dangerous wins over safe, so check it first.
        if self.dangerous.contains(tool) {
            return ToolDecision::Block {
                reason: format!("tool {tool} blocked for untrusted sender"),
            };
        }
        if self.safe.contains(tool) {
            return ToolDecision::Allow;
        }
        if self.default_deny {
            return ToolDecision::Block {
                reason: format!("tool {tool} not classified; default-deny posture"),
            };
        }
        // Known softness: new host tools must be classified explicitly or
        // they arrive here and pass.
        ToolDecision::Allow
    }
}
