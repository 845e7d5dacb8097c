// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to the append-only event log. Writes go through [`crate::guard`].

use std::str::FromStr;

use callbridge_core::{CallbridgeError, EventLogEntry, EventStatus};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const ENTRY_COLUMNS: &str =
    "id, tenant_id, kind, call_id, fingerprint, payload, status, detail, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EventLogEntry> {
    let status: String = row.get(6)?;
    let status = EventStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(EventLogEntry {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        kind: row.get(2)?,
        call_id: row.get(3)?,
        fingerprint: row.get(4)?,
        payload: row.get(5)?,
        status,
        detail: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Most recent entries for a tenant, newest first.
pub async fn recent(
    db: &Database,
    tenant_id: i64,
    limit: u32,
) -> Result<Vec<EventLogEntry>, CallbridgeError> {
    db.connection()
        .call(move |conn| -> Result<Vec<EventLogEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM event_log
                 WHERE tenant_id = ?1 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![tenant_id, limit], entry_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Look up the entry for a fingerprint.
pub async fn find_by_fingerprint(
    db: &Database,
    fingerprint: &str,
) -> Result<Option<EventLogEntry>, CallbridgeError> {
    let fingerprint = fingerprint.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<EventLogEntry>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM event_log WHERE fingerprint = ?1"),
                params![fingerprint],
                entry_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{self, Admission};
    use std::time::Duration;

    #[tokio::test]
    async fn find_by_fingerprint_returns_logged_entry() {
        let db = Database::open_in_memory().await.unwrap();
        let Admission::Accepted(ticket) =
            guard::admit(&db, 4, Some("c-7"), "disposition", Duration::from_secs(60))
                .await
                .unwrap()
        else {
            panic!("expected admission");
        };
        guard::complete(&db, &ticket, r#"{"a":1}"#, EventStatus::Error, Some("crm down"))
            .await
            .unwrap();

        let entry = find_by_fingerprint(&db, &ticket.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, "disposition");
        assert_eq!(entry.call_id.as_deref(), Some("c-7"));
        assert_eq!(entry.status, EventStatus::Error);
        assert_eq!(entry.detail.as_deref(), Some("crm down"));
        assert!(find_by_fingerprint(&db, "nope").await.unwrap().is_none());
    }
}
