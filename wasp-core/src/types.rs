// src/types.rs
//! Domain types shared across the core: platforms, trust labels, decision
//! outcomes, and the persisted row shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

// ----------- Platforms -----------

/// The closed set of message channels a contact can live on.
///
/// Unknown platform strings are rejected with `InvalidInput`; accepting
/// ad-hoc channel names would silently split one person across rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Whatsapp,
    Telegram,
    Email,
    Discord,
    Slack,
    Signal,
    Webchat,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Whatsapp => "whatsapp",
            Platform::Telegram => "telegram",
            Platform::Email => "email",
            Platform::Discord => "discord",
            Platform::Slack => "slack",
            Platform::Signal => "signal",
            Platform::Webchat => "webchat",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Platform::Whatsapp),
            "telegram" => Ok(Platform::Telegram),
            "email" => Ok(Platform::Email),
            "discord" => Ok(Platform::Discord),
            "slack" => Ok(Platform::Slack),
            "signal" => Ok(Platform::Signal),
            "webchat" => Ok(Platform::Webchat),
            other => Err(Error::InvalidInput(format!("unknown platform: {other:?}"))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------- Trust labels -----------

/// Capability label attached to a whitelisted contact.
///
/// Not a numeric rank: `sovereign` and `trusted` carry the same tool
/// capability today, and both strictly exceed `limited`. The absence of a
/// contact row is the implicit fourth state, "unknown", with the lowest
/// capability; it is modeled as `Option<TrustLevel>::None` throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Sovereign,
    Trusted,
    Limited,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Sovereign => "sovereign",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Limited => "limited",
        }
    }

    /// True for the labels that unlock unrestricted tool access.
    pub fn can_act(&self) -> bool {
        matches!(self, TrustLevel::Sovereign | TrustLevel::Trusted)
    }
}

impl FromStr for TrustLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sovereign" => Ok(TrustLevel::Sovereign),
            "trusted" => Ok(TrustLevel::Trusted),
            "limited" => Ok(TrustLevel::Limited),
            other => Err(Error::InvalidInput(format!("unknown trust level: {other:?}"))),
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------- Decisions -----------

/// Outcome recorded in the audit log for one decision event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    Limited,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::Limited => "limited",
        }
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Decision::Allow),
            "deny" => Ok(Decision::Deny),
            "limited" => Ok(Decision::Limited),
            other => Err(Error::InvalidInput(format!("unknown decision: {other:?}"))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------- Persisted rows -----------

/// One whitelist row, unique by (identifier, platform).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub identifier: String,
    pub platform: Platform,
    pub trust: TrustLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

/// Result of the whitelist `check` operation.
///
/// `allowed = true` means the message may reach the model; it says nothing
/// about tool capability, which is a separate per-turn decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub trust: Option<TrustLevel>,
    pub reason: String,
}

/// One immutable audit row. `platform` is stored as plain text because tool
/// decisions are attributed from turn state, which may have no channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub identifier: String,
    pub platform: String,
    pub decision: Decision,
    pub reason: String,
}

/// A blocked inbound message held for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedMessage {
    pub id: i64,
    pub identifier: String,
    pub platform: Platform,
    pub preview: String,
    pub body: String,
    pub created_at: String,
    pub reviewed: bool,
}

/// One persisted injection-heuristic telemetry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryHit {
    pub id: i64,
    pub identifier: String,
    pub platform: Platform,
    pub score: f64,
    pub patterns: Vec<String>,
    pub verbs: Vec<String>,
    pub preview: String,
    pub timestamp: String,
}

// ----------- Ephemeral turn state -----------

/// Per-session binding between the inbound sender and subsequent tool-call
/// decisions. `trust = None` covers both "unknown sender" and "no inbound
/// processed yet"; the policy engine treats them identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnState {
    pub trust: Option<TrustLevel>,
    pub sender: Option<String>,
    pub platform: Option<Platform>,
}

impl TurnState {
    pub fn is_empty(&self) -> bool {
        self.trust.is_none() && self.sender.is_none()
    }
}
