// src/audit.rs
//! Append-only audit log. Every allow/deny/limited decision made by the
//! contact check or the tool policy is written here exactly once per
//! decision event; rows are never updated, only purged by age.

use std::str::FromStr;

use chrono::Utc;

use crate::errors::Result;
use crate::store::Store;
use crate::types::{AuditEntry, Decision};

/// Hard ceiling on one query's row count; requests above it are clamped.
pub const MAX_QUERY_LIMIT: usize = 1000;
/// Rows returned when the caller does not ask for a limit.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Append one decision row.
pub fn log(
    store: &Store,
    identifier: &str,
    platform: &str,
    decision: Decision,
    reason: &str,
) -> Result<()> {
    let ts = Utc::now().to_rfc3339();
    store.with_conn(|conn| {
        conn.execute(
            "INSERT INTO audit_log(ts, identifier, platform, decision, reason)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (&ts, identifier, platform, decision.as_str(), reason),
        )?;
        Ok(())
    })
}

/// Filter for [`query`]. `limit = Some(0)` is honored literally and yields
/// zero rows.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub decision: Option<Decision>,
    /// RFC 3339 lower bound on the row timestamp (inclusive).
    pub since: Option<String>,
}

/// Newest-first query. Timestamps can collide across concurrent writers,
/// so ordering falls back to the store-assigned row id, the only monotone
/// identifier.
pub fn query(store: &Store, q: &AuditQuery) -> Result<Vec<AuditEntry>> {
    let limit = q.limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
    if limit == 0 {
        return Ok(Vec::new());
    }
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, ts, identifier, platform, decision, reason
             FROM audit_log
             WHERE (?1 IS NULL OR decision = ?1)
               AND (?2 IS NULL OR ts >= ?2)
             ORDER BY id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            (
                q.decision.map(|d| d.as_str()),
                q.since.as_deref(),
                limit as i64,
            ),
            map_entry,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Age-based retention purge. Returns the number of rows removed.
pub fn purge_older_than(store: &Store, days: u32) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
    store.with_conn(|conn| {
        Ok(conn.execute("DELETE FROM audit_log WHERE ts < ?1", [&cutoff])?)
    })
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let decision: String = row.get(4)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        identifier: row.get(2)?,
        platform: row.get(3)?,
        decision: Decision::from_str(&decision).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("bad decision {decision:?}").into(),
            )
        })?,
        reason: row.get(5)?,
    })
}
