// src/contacts.rs
//! Contact registry: whitelist CRUD and the trust decision consumed by the
//! inbound pipeline.
//!
//! Identifiers are compared byte-exact. No case folding, no whitespace
//! trimming, no Unicode normalization: confusable folding would enlarge the
//! attack surface, so a caller that wants to accept several written forms
//! of one address must enter all of them.

use std::str::FromStr;

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::errors::{Error, Result};
use crate::store::Store;
use crate::types::{CheckResult, Contact, Platform, TrustLevel};

pub const REASON_NOT_LISTED: &str = "Contact not in whitelist";
pub const REASON_LIMITED: &str = "Limited trust — agent may view but should not act";
pub const REASON_TRUSTED: &str = "Contact is trusted";

fn require_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidInput("identifier must not be empty".into()));
    }
    Ok(())
}

/// Insert or update a contact.
///
/// On conflict the trust label is always overwritten, while `name` and
/// `notes` are updated only when a non-empty value is supplied (the
/// preserve-on-null policy): an upsert that omits them keeps whatever the
/// row already holds.
pub fn upsert(
    store: &Store,
    identifier: &str,
    platform: Platform,
    trust: TrustLevel,
    name: Option<&str>,
    notes: Option<&str>,
) -> Result<Contact> {
    require_identifier(identifier)?;
    let now = Utc::now().to_rfc3339();
    store.with_conn(|conn| {
        conn.execute(
            r#"
            INSERT INTO contacts(identifier, platform, trust, name, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(identifier, platform) DO UPDATE SET
              trust = excluded.trust,
              name  = COALESCE(NULLIF(excluded.name, ''), contacts.name),
              notes = COALESCE(NULLIF(excluded.notes, ''), contacts.notes)
            "#,
            (
                identifier,
                platform.as_str(),
                trust.as_str(),
                name.unwrap_or(""),
                notes.unwrap_or(""),
                &now,
            ),
        )?;
        Ok(())
    })?;
    // The row exists by construction after the statement above.
    get(store, identifier, platform)?
        .ok_or_else(|| Error::Storage("upserted contact vanished".into()))
}

/// Delete a contact. Returns true iff a row was removed.
pub fn remove(store: &Store, identifier: &str, platform: Platform) -> Result<bool> {
    require_identifier(identifier)?;
    let n = store.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM contacts WHERE identifier = ?1 AND platform = ?2",
            (identifier, platform.as_str()),
        )?)
    })?;
    Ok(n > 0)
}

/// Fetch one contact, if present.
pub fn get(store: &Store, identifier: &str, platform: Platform) -> Result<Option<Contact>> {
    store.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT identifier, platform, trust, name, notes, created_at
                 FROM contacts WHERE identifier = ?1 AND platform = ?2",
                (identifier, platform.as_str()),
                map_contact,
            )
            .optional()?;
        Ok(row)
    })
}

/// List contacts, optionally filtered, newest-first by creation time.
pub fn list(
    store: &Store,
    platform: Option<Platform>,
    trust: Option<TrustLevel>,
) -> Result<Vec<Contact>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT identifier, platform, trust, name, notes, created_at
             FROM contacts
             WHERE (?1 IS NULL OR platform = ?1)
               AND (?2 IS NULL OR trust = ?2)
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(
            (
                platform.map(|p| p.as_str()),
                trust.map(|t| t.as_str()),
            ),
            map_contact,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

/// Trust decision for one inbound sender. This is the contract the inbound
/// pipeline consumes:
///
/// 1. no row            → not allowed, trust `None`, [`REASON_NOT_LISTED`]
/// 2. trust = limited   → allowed, [`REASON_LIMITED`]
/// 3. trusted/sovereign → allowed, [`REASON_TRUSTED`]
///
/// `allowed = true` only means the message may reach the model; tool
/// capability is decided per turn by the policy engine.
pub fn check(store: &Store, identifier: &str, platform: Platform) -> Result<CheckResult> {
    require_identifier(identifier)?;
    let contact = get(store, identifier, platform)?;
    Ok(match contact {
        None => CheckResult {
            allowed: false,
            trust: None,
            reason: REASON_NOT_LISTED.to_string(),
        },
        Some(c) if c.trust == TrustLevel::Limited => CheckResult {
            allowed: true,
            trust: Some(TrustLevel::Limited),
            reason: REASON_LIMITED.to_string(),
        },
        Some(c) => CheckResult {
            allowed: true,
            trust: Some(c.trust),
            reason: REASON_TRUSTED.to_string(),
        },
    })
}

/// Audit decision corresponding to one check result. Every surface that
/// emits a check decision records exactly one audit row with this mapping.
pub fn decision_for(result: &CheckResult) -> crate::types::Decision {
    use crate::types::Decision;
    if !result.allowed {
        Decision::Deny
    } else if result.trust.map(|t| t.can_act()).unwrap_or(false) {
        Decision::Allow
    } else {
        Decision::Limited
    }
}

fn map_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let platform: String = row.get(1)?;
    let trust: String = row.get(2)?;
    let name: String = row.get::<_, Option<String>>(3)?.unwrap_or_default();
    let notes: String = row.get::<_, Option<String>>(4)?.unwrap_or_default();
    Ok(Contact {
        identifier: row.get(0)?,
        platform: Platform::from_str(&platform).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("bad platform {platform:?}").into(),
            )
        })?,
        trust: TrustLevel::from_str(&trust).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("bad trust {trust:?}").into(),
            )
        })?,
        name: if name.is_empty() { None } else { Some(name) },
        notes: if notes.is_empty() { None } else { Some(notes) },
        created_at: row.get(5)?,
    })
}
