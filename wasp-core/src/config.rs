// src/config.rs
//! Configuration for the enforcement core, loaded once at startup from
//! `config.toml` inside the data root and never mutated afterwards.
//!
//! The data root defaults to `~/.wasp`; the `WASP_ROOT` environment
//! variable overrides it (tests, containers). Configuration is a value
//! handed to the gateway and façade at initialization; nothing here reads
//! or writes process environment after startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Error, Result};

/// File name of the embedded database inside the data root.
pub const DB_FILE: &str = "wasp.db";
/// File name of the configuration file inside the data root.
pub const CONFIG_FILE: &str = "config.toml";
/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "WASP_ROOT";
/// Environment variable carrying the admin API token.
pub const API_TOKEN_ENV: &str = "WASP_API_TOKEN";

/// Resolve the data root: `$WASP_ROOT` if set, else `~/.wasp`, else `./.wasp`
/// when no home directory can be determined (containers).
pub fn data_root() -> PathBuf {
    if let Some(root) = std::env::var_os(ROOT_ENV) {
        return PathBuf::from(root);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".wasp"),
        None => PathBuf::from(".wasp"),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub canary: CanaryConfig,
    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl CoreConfig {
    /// Load `config.toml` from the data root, falling back to defaults when
    /// the file does not exist. The result is validated before use.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let cfg = if path.exists() {
            let text = fs::read_to_string(&path)?;
            toml::from_str::<CoreConfig>(&text)
                .map_err(|e| Error::Misconfigured(format!("parsing {CONFIG_FILE}: {e}")))?
        } else {
            tracing::debug!("no {CONFIG_FILE} in data root, using defaults");
            CoreConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the whole configuration. Called at process start so that a
    /// broken config fails before any request is accepted, never at first use.
    pub fn validate(&self) -> Result<()> {
        self.signature.validate()?;
        if self.ratelimit.max_requests == 0 {
            return Err(Error::Misconfigured(
                "ratelimit.max_requests must be at least 1".into(),
            ));
        }
        if self.ratelimit.window_ms == 0 {
            return Err(Error::Misconfigured(
                "ratelimit.window_ms must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.canary.threshold) {
            return Err(Error::Misconfigured(
                "canary.threshold must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

// ----------- Tool policy -----------

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Tools blocked for limited/unknown senders. Overridable; dangerous
    /// always wins when a name appears in both lists.
    #[serde(default = "PolicyConfig::default_dangerous_tools")]
    pub dangerous_tools: Vec<String>,
    /// Tools allowed for everyone.
    #[serde(default = "PolicyConfig::default_safe_tools")]
    pub safe_tools: Vec<String>,
    /// Hardened posture: block unlisted tools for limited/unknown senders
    /// instead of the documented default-allow.
    #[serde(default)]
    pub default_deny: bool,
}

impl PolicyConfig {
    fn default_dangerous_tools() -> Vec<String> {
        ["exec", "write", "message", "gateway", "Edit", "Write"]
            .map(String::from)
            .to_vec()
    }

    fn default_safe_tools() -> Vec<String> {
        ["web_search", "memory_search", "Read", "session_status"]
            .map(String::from)
            .to_vec()
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            dangerous_tools: Self::default_dangerous_tools(),
            safe_tools: Self::default_safe_tools(),
            default_deny: false,
        }
    }
}

// ----------- Rate limiting -----------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "RateLimitConfig::default_max_requests")]
    pub max_requests: u32,
}

impl RateLimitConfig {
    fn default_window_ms() -> u64 {
        60_000
    }

    fn default_max_requests() -> u32 {
        100
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: Self::default_window_ms(),
            max_requests: Self::default_max_requests(),
        }
    }
}

// ----------- Quarantine -----------

#[derive(Debug, Clone, Deserialize)]
pub struct QuarantineConfig {
    /// When true, blocked inbound messages are retained for review instead
    /// of being dropped.
    #[serde(default = "QuarantineConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "QuarantineConfig::default_preview_len")]
    pub preview_len: usize,
}

impl QuarantineConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_preview_len() -> usize {
        100
    }
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            preview_len: Self::default_preview_len(),
        }
    }
}

// ----------- Canary (injection heuristic) -----------

#[derive(Debug, Clone, Deserialize)]
pub struct CanaryConfig {
    #[serde(default = "CanaryConfig::default_enabled")]
    pub enabled: bool,
    /// Minimum score at which a telemetry row is persisted. A single
    /// pattern family plus one sensitive verb scores 0.4, and that canonical
    /// injection shape must land in telemetry, so the default sits there.
    #[serde(default = "CanaryConfig::default_threshold")]
    pub threshold: f64,
    #[serde(default = "CanaryConfig::default_preview_len")]
    pub preview_len: usize,
}

impl CanaryConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_threshold() -> f64 {
        0.4
    }

    fn default_preview_len() -> usize {
        200
    }
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            threshold: Self::default_threshold(),
            preview_len: Self::default_preview_len(),
        }
    }
}

// ----------- Signature guard -----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAction {
    Append,
    Block,
}

impl Default for SignatureAction {
    fn default() -> Self {
        SignatureAction::Append
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Identity marker every agent-authored outbound message must carry.
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub signature_prefix: Option<String>,
    #[serde(default)]
    pub action: SignatureAction,
    /// Channels the guard inspects. Messages on other channels pass through.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl SignatureConfig {
    /// Fails at configuration-validation time when the guard is enabled
    /// without a signature, never at first use.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.signature.is_empty() {
            return Err(Error::Misconfigured(
                "signature guard enabled without a signature".into(),
            ));
        }
        Ok(())
    }
}

// ----------- Server -----------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address of the admin façade. Localhost by default.
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,
}

impl ServerConfig {
    fn default_bind() -> String {
        "127.0.0.1:8723".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

// ----------- Retention -----------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "RetentionConfig::default_audit_days")]
    pub audit_days: u32,
    #[serde(default = "RetentionConfig::default_quarantine_days")]
    pub quarantine_days: u32,
    #[serde(default = "RetentionConfig::default_canary_days")]
    pub canary_days: u32,
}

impl RetentionConfig {
    fn default_audit_days() -> u32 {
        365
    }

    fn default_quarantine_days() -> u32 {
        90
    }

    fn default_canary_days() -> u32 {
        90
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            audit_days: Self::default_audit_days(),
            quarantine_days: Self::default_quarantine_days(),
            canary_days: Self::default_canary_days(),
        }
    }
}

/// Default `config.toml` seeded by `init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"[policy]
dangerous_tools = ["exec", "write", "message", "gateway", "Edit", "Write"]
safe_tools = ["web_search", "memory_search", "Read", "session_status"]
default_deny = false

[ratelimit]
window_ms = 60000
max_requests = 100

[quarantine]
enabled = true
preview_len = 100

[canary]
enabled = true
threshold = 0.4
preview_len = 200

[signature]
enabled = false
signature = ""
action = "append"
channels = []

[server]
bind = "127.0.0.1:8723"

[retention]
audit_days = 365
quarantine_days = 90
canary_days = 90
"#;
