// src/canary.rs
//! Injection heuristic ("canary"): a telemetry-only scorer over inbound
//! content. It never changes an allow/block outcome; its job is
//! visibility, including anomalous messages from senders who are trusted.
//!
//! Patterns are compiled once into `Lazy` statics. The `regex` crate runs
//! in time linear in the input, so a hostile 100 KB message of repeated
//! trigger tokens cannot blow the analysis budget.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::store::Store;
use crate::types::{CanaryHit, Platform};

/// Score contribution of one matched pattern family.
const PATTERN_WEIGHT: f64 = 0.3;
/// Score contribution of one matched sensitive verb.
const VERB_WEIGHT: f64 = 0.1;
/// Ceiling on the total verb contribution.
const VERB_CAP: f64 = 0.3;

// ----------- Pattern catalogue -----------

struct Pattern {
    name: &'static str,
    re: Lazy<Regex>,
}

macro_rules! pattern {
    ($name:literal, $re:literal) => {
        Pattern {
            name: $name,
            re: Lazy::new(|| Regex::new($re).expect(concat!("pattern regex ", $name))),
        }
    };
}

static PATTERNS: [Pattern; 12] = [
    pattern!(
        "ignore_instructions",
        r"(?i)ignore\s+(?:previous|all|prior)\s+instructions"
    ),
    pattern!(
        "disregard_safety",
        r"(?i)disregard\s+(?:previous|safety|rules|instructions|guidelines)"
    ),
    pattern!("system_tag", r"(?i)\[(?:SYSTEM|ADMIN|ROOT)\]"),
    pattern!("from_authority", r"(?i)\b(?:from|by)\s*:\s*(?:system|admin)\b"),
    pattern!(
        "admin_mode",
        r"(?i)you\s+are\s+now\s+in\s+(?:admin|root|god)\s+mode"
    ),
    pattern!("enable_mode", r"(?i)enable\s+(?:debug|admin)\s+mode"),
    pattern!("close_tag", r"(?i)</(?:system|instructions|prompt)>"),
    pattern!("new_instructions", r"(?i)new\s+instructions\s*:"),
    pattern!("urgent_action", r"(?i)URGENT\b.{0,60}?\bACTION\s+REQUIRED"),
    pattern!(
        "must_action",
        r"(?i)must\s+(?:forward|send|execute|delete)\b"
    ),
    pattern!("jailbreak", r"(?i)\b(?:DAN|jailbreak|bypass\s+filters?)\b"),
    pattern!(
        "pretend_mode",
        r"(?i)pretend\s+you\s+are\s+(?:an?\s+)?(?:unrestricted|evil|hacker)"
    ),
];

/// Verbs an injected instruction typically asks the agent to perform.
/// Matched with word boundaries; order here is the order reported.
static VERBS: [&str; 18] = [
    "forward", "send", "email", "share", "upload", "delete", "remove", "destroy", "execute",
    "run", "install", "download", "transfer", "payment", "purchase", "grant", "allow",
    "authorize",
];

static VERB_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    VERBS
        .iter()
        .map(|v| {
            let re = Regex::new(&format!(r"(?i)\b{v}\b")).expect("verb regex");
            (*v, re)
        })
        .collect()
});

// ----------- Analysis -----------

/// Result of scoring one message. `patterns` and `verbs` follow catalogue
/// order, which makes outputs deterministic for identical inputs.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryAnalysis {
    pub score: f64,
    pub patterns: Vec<&'static str>,
    pub verbs: Vec<&'static str>,
}

impl CanaryAnalysis {
    pub fn is_clean(&self) -> bool {
        self.patterns.is_empty() && self.verbs.is_empty()
    }
}

/// Score a message: +0.3 per matched pattern family, +0.1 per matched
/// sensitive verb capped at +0.3, clamped into [0, 1]. Empty content
/// scores 0 without touching the regex engine.
///
/// This is not an intent classifier. A technical discussion *about*
/// injection will light it up; that false-positive class is accepted.
pub fn analyze(content: &str) -> CanaryAnalysis {
    if content.is_empty() {
        return CanaryAnalysis {
            score: 0.0,
            patterns: Vec::new(),
            verbs: Vec::new(),
        };
    }

    let mut patterns = Vec::new();
    for p in &PATTERNS {
        if p.re.is_match(content) {
            patterns.push(p.name);
        }
    }

    let mut verbs = Vec::new();
    for (name, re) in VERB_RES.iter() {
        if re.is_match(content) {
            verbs.push(*name);
        }
    }

    let pattern_score = patterns.len() as f64 * PATTERN_WEIGHT;
    let verb_score = (verbs.len() as f64 * VERB_WEIGHT).min(VERB_CAP);
    let score = (pattern_score + verb_score).clamp(0.0, 1.0);

    CanaryAnalysis {
        score,
        patterns,
        verbs,
    }
}

// ----------- Telemetry persistence -----------

/// Persist one telemetry row for an analysis that reached the threshold.
pub fn record(
    store: &Store,
    identifier: &str,
    platform: Platform,
    content: &str,
    analysis: &CanaryAnalysis,
    preview_len: usize,
) -> Result<()> {
    let ts = Utc::now().to_rfc3339();
    let patterns = serde_json::to_string(&analysis.patterns)
        .map_err(|e| Error::Storage(e.to_string()))?;
    let verbs =
        serde_json::to_string(&analysis.verbs).map_err(|e| Error::Storage(e.to_string()))?;
    let preview = truncate_preview(content, preview_len);
    store.with_conn(|conn| {
        conn.execute(
            "INSERT INTO canary_hits(identifier, platform, score, patterns, verbs, preview, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                identifier,
                platform.as_str(),
                analysis.score,
                &patterns,
                &verbs,
                &preview,
                &ts,
            ),
        )?;
        Ok(())
    })
}

/// Analyze and persist when the score reaches `threshold`. Returns the
/// analysis either way so the caller can log it.
pub fn analyze_and_record(
    store: &Store,
    identifier: &str,
    platform: Platform,
    content: &str,
    threshold: f64,
    preview_len: usize,
) -> Result<CanaryAnalysis> {
    let analysis = analyze(content);
    if analysis.score >= threshold && analysis.score > 0.0 {
        record(store, identifier, platform, content, &analysis, preview_len)?;
        tracing::warn!(
            identifier,
            platform = platform.as_str(),
            score = analysis.score,
            patterns = ?analysis.patterns,
            "canary hit persisted"
        );
    }
    Ok(analysis)
}

// ----------- Telemetry queries -----------

/// Newest-first telemetry rows.
pub fn recent(store: &Store, limit: usize) -> Result<Vec<CanaryHit>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, identifier, platform, score, patterns, verbs, preview, ts
             FROM canary_hits ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], map_hit)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Aggregate view used by the `canary --stats` surface.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryStats {
    pub total: u64,
    pub mean_score: f64,
    /// (pattern name, hit count), most frequent first.
    pub by_pattern: Vec<(String, u64)>,
}

pub fn stats(store: &Store) -> Result<CanaryStats> {
    let hits = store.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT score, patterns FROM canary_hits")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })?;

    let total = hits.len() as u64;
    let mean_score = if hits.is_empty() {
        0.0
    } else {
        hits.iter().map(|(s, _)| s).sum::<f64>() / hits.len() as f64
    };
    let mut counts = std::collections::HashMap::<String, u64>::new();
    for (_, patterns_json) in &hits {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(patterns_json) {
            for n in names {
                *counts.entry(n).or_default() += 1;
            }
        }
    }
    let mut by_pattern: Vec<(String, u64)> = counts.into_iter().collect();
    by_pattern.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(CanaryStats {
        total,
        mean_score,
        by_pattern,
    })
}

/// Delete all telemetry rows. Returns the number removed.
pub fn clear(store: &Store) -> Result<usize> {
    store.with_conn(|conn| Ok(conn.execute("DELETE FROM canary_hits", [])?))
}

/// Age-based purge. Returns the number of rows removed.
pub fn purge_older_than(store: &Store, days: u32) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
    store.with_conn(|conn| {
        Ok(conn.execute("DELETE FROM canary_hits WHERE ts < ?1", [&cutoff])?)
    })
}

// ----------- Helpers -----------

/// Single-line preview truncated on a character boundary, with an ellipsis
/// when anything was cut.
pub(crate) fn truncate_preview(s: &str, max_chars: usize) -> String {
    let mut t: String = s.replace('\n', " ");
    if t.chars().count() > max_chars {
        t = t.chars().take(max_chars).collect();
        t.push('…');
    }
    t
}

fn map_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanaryHit> {
    use std::str::FromStr;
    let platform: String = row.get(2)?;
    let patterns_json: String = row.get(4)?;
    let verbs_json: String = row.get(5)?;
    Ok(CanaryHit {
        id: row.get(0)?,
        identifier: row.get(1)?,
        platform: Platform::from_str(&platform).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("bad platform {platform:?}").into(),
            )
        })?,
        score: row.get(3)?,
        patterns: serde_json::from_str(&patterns_json).unwrap_or_default(),
        verbs: serde_json::from_str(&verbs_json).unwrap_or_default(),
        preview: row.get(6)?,
        timestamp: row.get(7)?,
    })
}
