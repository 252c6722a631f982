// src/quarantine.rs
//! Hold-and-review lifecycle for blocked inbound messages.
//!
//! A message is unreviewed, reviewed-but-retained, or gone. Release marks
//! rows reviewed and hands them back for the operator to act on; it never
//! deletes, so the audit trail of what arrived survives review. Deletion
//! is a separate explicit operation.

use std::str::FromStr;

use chrono::Utc;

use crate::canary::truncate_preview;
use crate::errors::{Error, Result};
use crate::store::Store;
use crate::types::{Platform, QuarantinedMessage};

/// Hold one blocked message. The preview is truncated for listings; the
/// full body is retained for review.
pub fn quarantine(
    store: &Store,
    identifier: &str,
    platform: Platform,
    message: &str,
    preview_len: usize,
) -> Result<QuarantinedMessage> {
    if identifier.is_empty() {
        return Err(Error::InvalidInput("identifier must not be empty".into()));
    }
    let now = Utc::now().to_rfc3339();
    let preview = truncate_preview(message, preview_len);
    store.with_conn(|conn| {
        conn.execute(
            "INSERT INTO quarantine(identifier, platform, preview, body, created_at, reviewed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            (identifier, platform.as_str(), &preview, message, &now),
        )?;
        let id = conn.last_insert_rowid();
        Ok(QuarantinedMessage {
            id,
            identifier: identifier.to_string(),
            platform,
            preview,
            body: message.to_string(),
            created_at: now,
            reviewed: false,
        })
    })
}

/// Unreviewed messages, newest-first.
pub fn list_unreviewed(store: &Store, limit: usize) -> Result<Vec<QuarantinedMessage>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, identifier, platform, preview, body, created_at, reviewed
             FROM quarantine WHERE reviewed = 0 ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = collect(stmt.query_map([limit as i64], map_message)?);
        rows
    })
}

/// Every held message from one sender, newest-first, reviewed or not.
pub fn list_by_identifier(
    store: &Store,
    identifier: &str,
    platform: Platform,
) -> Result<Vec<QuarantinedMessage>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, identifier, platform, preview, body, created_at, reviewed
             FROM quarantine WHERE identifier = ?1 AND platform = ?2 ORDER BY id DESC",
        )?;
        let rows = collect(stmt.query_map((identifier, platform.as_str()), map_message)?);
        rows
    })
}

/// Mark a sender's unreviewed messages reviewed and return them.
///
/// Rows are retained. Releasing a sender with nothing unreviewed returns
/// the empty list and performs no mutation, so a double release is safe.
pub fn release(
    store: &Store,
    identifier: &str,
    platform: Platform,
) -> Result<Vec<QuarantinedMessage>> {
    store.with_conn(|conn| {
        // Select-then-mark must be atomic so a concurrent release cannot
        // hand the same rows back twice.
        let tx = conn.unchecked_transaction()?;
        let held = {
            let mut stmt = tx.prepare(
                "SELECT id, identifier, platform, preview, body, created_at, reviewed
                 FROM quarantine
                 WHERE identifier = ?1 AND platform = ?2 AND reviewed = 0
                 ORDER BY id DESC",
            )?;
            let rows = collect(stmt.query_map((identifier, platform.as_str()), map_message)?)?;
            rows
        };
        if held.is_empty() {
            return Ok(held);
        }
        tx.execute(
            "UPDATE quarantine SET reviewed = 1
             WHERE identifier = ?1 AND platform = ?2 AND reviewed = 0",
            (identifier, platform.as_str()),
        )?;
        tx.commit()?;
        Ok(held
            .into_iter()
            .map(|mut m| {
                m.reviewed = true;
                m
            })
            .collect())
    })
}

/// Explicitly delete every held message from one sender. `NotFound` when
/// the sender holds nothing; deletion of missing rows is a reportable
/// condition, not a crash.
pub fn delete(store: &Store, identifier: &str, platform: Platform) -> Result<usize> {
    let n = store.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM quarantine WHERE identifier = ?1 AND platform = ?2",
            (identifier, platform.as_str()),
        )?)
    })?;
    if n == 0 {
        return Err(Error::NotFound(format!(
            "no quarantined messages for {identifier} on {platform}"
        )));
    }
    Ok(n)
}

/// Age-based purge across all senders. Returns the number removed.
pub fn purge_older_than(store: &Store, days: u32) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
    store.with_conn(|conn| {
        Ok(conn.execute("DELETE FROM quarantine WHERE created_at < ?1", [&cutoff])?)
    })
}

fn collect<F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<QuarantinedMessage>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<QuarantinedMessage>,
{
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuarantinedMessage> {
    let platform: String = row.get(2)?;
    Ok(QuarantinedMessage {
        id: row.get(0)?,
        identifier: row.get(1)?,
        platform: Platform::from_str(&platform).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("bad platform {platform:?}").into(),
            )
        })?,
        preview: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
        reviewed: row.get::<_, i64>(6)? != 0,
    })
}
