// src/signature.rs
//! Outbound signature guard: agent-authored messages on configured
//! channels must carry the configured identity marker.
//!
//! Pass-through when the guard is disabled, the channel is not enumerated,
//! or the message is not from the agent. Otherwise a missing marker is
//! either appended or blocks the send, depending on the configured action.

use serde::Serialize;

use crate::config::{SignatureAction, SignatureConfig};
use crate::errors::Result;

/// What the caller should do with the outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum OutboundDecision {
    /// Send unchanged.
    Pass,
    /// Send this content instead.
    Rewrite { content: String },
    /// Refuse the send.
    Block { reason: String },
}

#[derive(Debug, Clone)]
pub struct SignatureGuard {
    cfg: SignatureConfig,
}

impl SignatureGuard {
    /// Build a guard from validated configuration. Validation happens at
    /// process start via [`SignatureConfig::validate`]; constructing from
    /// an unvalidated config re-checks to keep the invariant local.
    pub fn new(cfg: SignatureConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Inspect one outbound message.
    pub fn inspect(&self, content: &str, channel: &str, from_agent: bool) -> OutboundDecision {
        if !self.cfg.enabled || !from_agent {
            return OutboundDecision::Pass;
        }
        if !self.cfg.channels.iter().any(|c| c == channel) {
            return OutboundDecision::Pass;
        }
        if content.contains(&self.cfg.signature) {
            // Already signed; a second pass must not stack markers.
            return OutboundDecision::Pass;
        }
        match self.cfg.action {
            SignatureAction::Append => {
                let mut out = String::with_capacity(
                    content.len() + self.cfg.signature.len() + 8,
                );
                out.push_str(content);
                out.push_str("\n\n");
                if let Some(prefix) = &self.cfg.signature_prefix {
                    out.push_str(prefix);
                }
                out.push_str(&self.cfg.signature);
                OutboundDecision::Rewrite { content: out }
            }
            SignatureAction::Block => OutboundDecision::Block {
                reason: "missing signature".to_string(),
            },
        }
    }
}
