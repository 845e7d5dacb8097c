// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency guard for inbound events.
//!
//! An event is identified by the SHA-256 fingerprint of
//! `tenant|event_id|kind`. [`admit`] takes an in-flight claim on the
//! fingerprint; [`complete`] appends the single event-log entry and drops the
//! claim in one transaction. Both steps lean on unique constraints, so
//! concurrent deliveries of the same event settle on exactly one log entry.

use std::time::Duration;

use callbridge_core::{CallbridgeError, EventStatus};
use rusqlite::{params, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::database::{map_tr_err, Database};

/// Deterministic identity of one logical event.
pub fn fingerprint(tenant_id: i64, event_id: Option<&str>, kind: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{tenant_id}|{}|{kind}", event_id.unwrap_or("")).as_bytes());
    hex::encode(hasher.finalize())
}

/// Proof that the caller owns processing of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTicket {
    pub fingerprint: String,
    pub tenant_id: i64,
    pub kind: String,
    pub call_id: Option<String>,
}

/// Result of [`admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(ClaimTicket),
    /// Already logged, or another delivery holds a live claim.
    Duplicate,
}

/// Result of [`complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The log entry id.
    Recorded(i64),
    /// Another delivery logged this fingerprint first.
    LateDuplicate,
}

/// Try to take ownership of an event.
///
/// Claims older than `claim_ttl` belong to a delivery that died before
/// logging an outcome; they are taken over rather than blocking forever.
/// `claim_ttl` must outlast the longest a live delivery can hold its claim.
/// A zero `claim_ttl` never takes a claim over.
pub async fn admit(
    db: &Database,
    tenant_id: i64,
    event_id: Option<&str>,
    kind: &str,
    claim_ttl: Duration,
) -> Result<Admission, CallbridgeError> {
    let ticket = ClaimTicket {
        fingerprint: fingerprint(tenant_id, event_id, kind),
        tenant_id,
        kind: kind.to_string(),
        call_id: event_id.map(str::to_string),
    };
    let fp = ticket.fingerprint.clone();
    let stale_before = (!claim_ttl.is_zero()).then(|| format!("-{} seconds", claim_ttl.as_secs()));

    let accepted = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let logged: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM event_log WHERE fingerprint = ?1)",
                params![fp],
                |row| row.get(0),
            )?;
            if logged {
                return Ok(false);
            }

            if let Some(stale_before) = stale_before {
                let abandoned = tx.execute(
                    "DELETE FROM event_claims WHERE fingerprint = ?1
                     AND claimed_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2)",
                    params![fp, stale_before],
                )?;
                if abandoned > 0 {
                    warn!(fingerprint = %fp, "taking over abandoned event claim");
                }
            }

            let inserted = tx.execute(
                "INSERT INTO event_claims (fingerprint, tenant_id) VALUES (?1, ?2)
                 ON CONFLICT (fingerprint) DO NOTHING",
                params![fp, tenant_id],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)?;

    if accepted {
        debug!(tenant_id, kind, fingerprint = %ticket.fingerprint, "event admitted");
        Ok(Admission::Accepted(ticket))
    } else {
        debug!(tenant_id, kind, fingerprint = %ticket.fingerprint, "duplicate event");
        Ok(Admission::Duplicate)
    }
}

/// Record the outcome of an admitted event and release its claim.
pub async fn complete(
    db: &Database,
    ticket: &ClaimTicket,
    payload: &str,
    status: EventStatus,
    detail: Option<&str>,
) -> Result<Completion, CallbridgeError> {
    let t = ticket.clone();
    let payload = payload.to_string();
    let status_text = status.to_string();
    let detail = detail.map(str::to_string);

    let recorded = db
        .connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = tx.execute(
                "INSERT INTO event_log (tenant_id, kind, call_id, fingerprint, payload, status, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (fingerprint) DO NOTHING",
                params![t.tenant_id, t.kind, t.call_id, t.fingerprint, payload, status_text, detail],
            )?;
            let id = (inserted == 1).then(|| tx.last_insert_rowid());
            tx.execute(
                "DELETE FROM event_claims WHERE fingerprint = ?1",
                params![t.fingerprint],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)?;

    match recorded {
        Some(id) => Ok(Completion::Recorded(id)),
        None => {
            warn!(fingerprint = %ticket.fingerprint, "event already logged by another delivery");
            Ok(Completion::LateDuplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::events;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint(7, Some("call-1"), "endcall");
        assert_eq!(a, fingerprint(7, Some("call-1"), "endcall"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(7, Some("call-1"), "disposition"));
        assert_ne!(a, fingerprint(8, Some("call-1"), "endcall"));
        assert_eq!(fingerprint(7, None, "endcall"), fingerprint(7, Some(""), "endcall"));
    }

    #[tokio::test]
    async fn second_delivery_is_duplicate_while_in_flight() {
        let db = Database::open_in_memory().await.unwrap();
        let first = admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap();
        assert!(matches!(first, Admission::Accepted(_)));
        let second = admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap();
        assert_eq!(second, Admission::Duplicate);
    }

    #[tokio::test]
    async fn zero_ttl_never_takes_over_a_live_claim() {
        let db = Database::open_in_memory().await.unwrap();
        let first = admit(&db, 1, Some("call-1"), "endcall", Duration::ZERO)
            .await
            .unwrap();
        assert!(matches!(first, Admission::Accepted(_)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = admit(&db, 1, Some("call-1"), "endcall", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(second, Admission::Duplicate);
    }

    #[tokio::test]
    async fn young_claim_survives_a_short_ttl() {
        let db = Database::open_in_memory().await.unwrap();
        admit(&db, 1, Some("call-1"), "endcall", Duration::from_secs(1))
            .await
            .unwrap();
        let second = admit(&db, 1, Some("call-1"), "endcall", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second, Admission::Duplicate);
    }

    #[tokio::test]
    async fn logged_event_stays_duplicate() {
        let db = Database::open_in_memory().await.unwrap();
        let Admission::Accepted(ticket) =
            admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap()
        else {
            panic!("first delivery must be accepted");
        };
        let done = complete(&db, &ticket, "{}", EventStatus::Ok, None).await.unwrap();
        assert!(matches!(done, Completion::Recorded(_)));

        let again = admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap();
        assert_eq!(again, Admission::Duplicate);
        assert_eq!(events::recent(&db, 1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_duplicate_is_not_fatal() {
        let db = Database::open_in_memory().await.unwrap();
        let Admission::Accepted(ticket) =
            admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap()
        else {
            panic!("first delivery must be accepted");
        };
        complete(&db, &ticket, "{}", EventStatus::Ok, None).await.unwrap();
        let late = complete(&db, &ticket, "{}", EventStatus::Error, Some("boom"))
            .await
            .unwrap();
        assert_eq!(late, Completion::LateDuplicate);

        let logged = events::recent(&db, 1, 10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].status, EventStatus::Ok);
    }

    #[tokio::test]
    async fn abandoned_claim_is_taken_over() {
        let db = Database::open_in_memory().await.unwrap();
        admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap();
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE event_claims SET claimed_at = '2000-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let retry = admit(&db, 1, Some("call-1"), "endcall", TTL).await.unwrap();
        assert!(matches!(retry, Admission::Accepted(_)));
    }

    #[tokio::test]
    async fn concurrent_deliveries_admit_once() {
        let db = Database::open_in_memory().await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                admit(&db, 3, Some("call-9"), "endcall", TTL).await.unwrap()
            }));
        }
        let mut accepted = 0;
        for h in handles {
            if matches!(h.await.unwrap(), Admission::Accepted(_)) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn admits_from_two_connections_never_both_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.db").display().to_string();
        let first = Database::open(&path, true).await.unwrap();
        let second = Database::open(&path, true).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let db = if i % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move {
                admit(&db, 4, Some("call-x"), "endcall", TTL).await
            }));
        }
        let mut accepted = 0;
        for h in handles {
            if matches!(h.await.unwrap().unwrap(), Admission::Accepted(_)) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
