// src/gateway.rs
//! The host-runtime adapter surface: one struct binding the contact
//! registry, session turn map, tool policy, canary heuristic, quarantine
//! and signature guard into the four callbacks a host wires up.
//!
//! - inbound message  → observe: audit, maybe quarantine, bind turn, canary
//! - pre-tool-call    → strict gate on the bound turn
//! - pre-outbound     → signature guard only
//! - turn end         → clear the binding
//!
//! Every allow/deny/limited decision made here lands in the audit log
//! exactly once.

use std::path::Path;
use std::sync::Arc;

use crate::audit;
use crate::canary::{self, CanaryAnalysis};
use crate::config::CoreConfig;
use crate::contacts;
use crate::errors::Result;
use crate::policy::{ToolDecision, ToolPolicy};
use crate::quarantine;
use crate::session::SessionMap;
use crate::signature::{OutboundDecision, SignatureGuard};
use crate::store::Store;
use crate::types::{CheckResult, Decision, Platform};

/// One inbound event as delivered by the host adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage<'a> {
    pub content: &'a str,
    pub sender: &'a str,
    pub channel: Platform,
    pub session_key: Option<&'a str>,
}

/// What inbound processing did. The host cannot veto delivery with this;
/// it is observational.
#[derive(Debug, Clone)]
pub struct InboundReport {
    pub check: CheckResult,
    pub quarantined: bool,
    pub canary: Option<CanaryAnalysis>,
}

#[derive(Debug)]
pub struct Gateway {
    store: Arc<Store>,
    sessions: SessionMap,
    policy: ToolPolicy,
    guard: SignatureGuard,
    cfg: CoreConfig,
}

impl Gateway {
    /// Open the store under `data_dir` and build the gateway. The
    /// configuration is validated here, before any event is accepted.
    pub fn open(data_dir: &Path, cfg: CoreConfig) -> Result<Self> {
        cfg.validate()?;
        let store = Arc::new(Store::open(data_dir)?);
        Self::with_store(store, cfg)
    }

    /// Build the gateway over an already-open store.
    pub fn with_store(store: Arc<Store>, cfg: CoreConfig) -> Result<Self> {
        cfg.validate()?;
        let policy = ToolPolicy::from_config(&cfg.policy);
        let guard = SignatureGuard::new(cfg.signature.clone())?;
        Ok(Self {
            store,
            sessions: SessionMap::new(),
            policy,
            guard,
            cfg,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    // ----------- Inbound pipeline -----------

    /// Process one inbound message: whitelist check, audit write, optional
    /// quarantine, turn binding, canary analysis.
    pub fn handle_inbound(&self, msg: &InboundMessage<'_>) -> Result<InboundReport> {
        let check = contacts::check(&self.store, msg.sender, msg.channel)?;

        let decision = contacts::decision_for(&check);
        audit::log(
            &self.store,
            msg.sender,
            msg.channel.as_str(),
            decision,
            &check.reason,
        )?;

        let quarantined = if !check.allowed && self.cfg.quarantine.enabled {
            quarantine::quarantine(
                &self.store,
                msg.sender,
                msg.channel,
                msg.content,
                self.cfg.quarantine.preview_len,
            )?;
            true
        } else {
            false
        };

        // Bind the turn whether or not the sender is whitelisted: tool
        // calls triggered by this turn must be attributed to this sender.
        self.sessions
            .set_turn(msg.session_key, check.trust, msg.sender, msg.channel);

        let canary = if self.cfg.canary.enabled {
            Some(canary::analyze_and_record(
                &self.store,
                msg.sender,
                msg.channel,
                msg.content,
                self.cfg.canary.threshold,
                self.cfg.canary.preview_len,
            )?)
        } else {
            None
        };

        tracing::info!(
            sender = msg.sender,
            channel = msg.channel.as_str(),
            decision = decision.as_str(),
            quarantined,
            "inbound processed"
        );

        Ok(InboundReport {
            check,
            quarantined,
            canary,
        })
    }

    // ----------- Tool pipeline -----------

    /// Gate one tool call against the turn bound to `session_key`.
    pub fn check_tool_call(
        &self,
        tool: &str,
        session_key: Option<&str>,
    ) -> Result<ToolDecision> {
        let turn = self.sessions.get_turn(session_key);
        let decision = self.policy.decide(tool, turn.trust);

        let identifier = turn.sender.as_deref().unwrap_or("unknown");
        let platform = turn
            .platform
            .map(|p| p.as_str())
            .unwrap_or("unknown");
        match &decision {
            ToolDecision::Allow => {
                audit::log(
                    &self.store,
                    identifier,
                    platform,
                    Decision::Allow,
                    &format!("tool {tool} allowed"),
                )?;
            }
            ToolDecision::Block { reason } => {
                audit::log(&self.store, identifier, platform, Decision::Deny, reason)?;
                tracing::warn!(tool, identifier, "tool call blocked");
            }
        }
        Ok(decision)
    }

    // ----------- Outbound pipeline -----------

    /// Signature guard over one outbound message. No audit row: this is
    /// identity enforcement, not a trust decision.
    pub fn inspect_outbound(
        &self,
        content: &str,
        channel: &str,
        from_agent: bool,
    ) -> OutboundDecision {
        let decision = self.guard.inspect(content, channel, from_agent);
        if let OutboundDecision::Block { reason } = &decision {
            tracing::warn!(channel, reason = %reason, "outbound blocked");
        }
        decision
    }

    // ----------- Turn end -----------

    /// Clear the turn bound to `session_key`. Other sessions are
    /// unaffected.
    pub fn end_turn(&self, session_key: Option<&str>) {
        self.sessions.clear_turn(session_key);
    }

    /// Read-only view of the current turn, for diagnostics and tests.
    pub fn current_turn(&self, session_key: Option<&str>) -> crate::types::TurnState {
        self.sessions.get_turn(session_key)
    }

    // ----------- Maintenance -----------

    /// Apply the configured age-based retention to audit, quarantine and
    /// canary telemetry. Intended for embedders to run off the request
    /// path; nothing here blocks inbound or tool processing.
    pub fn run_retention(&self) -> Result<RetentionReport> {
        let r = &self.cfg.retention;
        let report = RetentionReport {
            audit_purged: audit::purge_older_than(&self.store, r.audit_days)?,
            quarantine_purged: quarantine::purge_older_than(&self.store, r.quarantine_days)?,
            canary_purged: canary::purge_older_than(&self.store, r.canary_days)?,
        };
        if report.total() > 0 {
            tracing::info!(
                audit = report.audit_purged,
                quarantine = report.quarantine_purged,
                canary = report.canary_purged,
                "retention purge"
            );
        }
        Ok(report)
    }
}

/// Rows removed by one retention pass.
#[derive(Debug, Clone, Copy)]
pub struct RetentionReport {
    pub audit_purged: usize,
    pub quarantine_purged: usize,
    pub canary_purged: usize,
}

impl RetentionReport {
    pub fn total(&self) -> usize {
        self.audit_purged + self.quarantine_purged + self.canary_purged
    }
}
