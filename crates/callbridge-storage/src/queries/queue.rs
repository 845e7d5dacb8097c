// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease queue for outbound dialing.
//!
//! Items move `pending -> locked -> {done | skipped | error}`. A `locked`
//! item returns to `pending` when its lease expires or when the holder
//! requeues it. Grants are a conditional update on `status = 'pending'`, so
//! two callers can never hold the same item even across processes.

use std::str::FromStr;
use std::time::Duration;

use callbridge_core::{CallbridgeError, NewQueueItem, QueueItem, QueueStatus};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::database::{map_tr_err, Database};

/// Longest lease [`lease_next`] grants; longer requests are cut to this.
pub const MAX_LEASE_SECS: i64 = 366 * 24 * 60 * 60;

const ITEM_COLUMNS: &str = "id, tenant_id, campaign, external_key, first_name, last_name,
     company, email, phone, status, lock_holder, locked_at, lease_expires_at,
     lease_ttl_secs, attempts, last_result, created_at, updated_at";

/// Result of [`enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "id", rename_all = "lowercase")]
pub enum EnqueueOutcome {
    Inserted(i64),
    /// An item with the same key existed; non-empty fields were merged.
    Merged(i64),
}

impl EnqueueOutcome {
    pub fn id(self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Merged(id) => id,
        }
    }
}

/// How a holder finishes with a leased item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Done,
    Skipped,
    Error,
    /// Put the item back in the pending pool.
    Requeue,
}

impl ReleaseOutcome {
    fn target(self) -> QueueStatus {
        match self {
            Self::Done => QueueStatus::Done,
            Self::Skipped => QueueStatus::Skipped,
            Self::Error => QueueStatus::Error,
            Self::Requeue => QueueStatus::Pending,
        }
    }
}

impl FromStr for ReleaseOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "done" => Ok(Self::Done),
            "skipped" => Ok(Self::Skipped),
            "error" => Ok(Self::Error),
            "requeue" | "pending" => Ok(Self::Requeue),
            other => Err(format!("unknown release outcome `{other}`")),
        }
    }
}

/// Per-status totals for one tenant and campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub locked: u64,
    pub done: u64,
    pub skipped: u64,
    pub error: u64,
}

/// Queue failures a caller can act on.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue item {0} does not exist")]
    NotFound(i64),

    #[error("queue item {id} is not leased by `{holder}`")]
    NotHeld { id: i64, holder: String },

    #[error(transparent)]
    Storage(#[from] CallbridgeError),
}

fn campaign_key(campaign: Option<&str>) -> String {
    campaign.map(str::trim).unwrap_or_default().to_string()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let campaign: String = row.get(2)?;
    let status: String = row.get(9)?;
    let status = QueueStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(QueueItem {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        campaign: (!campaign.is_empty()).then_some(campaign),
        external_key: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        company: row.get(6)?,
        email: row.get(7)?,
        phone: row.get(8)?,
        status,
        lock_holder: row.get(10)?,
        locked_at: row.get(11)?,
        lease_expires_at: row.get(12)?,
        lease_ttl_secs: row.get(13)?,
        attempts: row.get(14)?,
        last_result: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn select_item(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<QueueItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?1"),
        params![id],
        item_from_row,
    )
    .optional()
}

/// Insert an item, or merge newer non-empty fields into the existing item
/// with the same (tenant, campaign, external key). Status is never touched.
pub async fn enqueue(
    db: &Database,
    tenant_id: i64,
    campaign: Option<&str>,
    item: &NewQueueItem,
) -> Result<EnqueueOutcome, CallbridgeError> {
    let campaign = campaign_key(campaign);
    let external_key = item.external_key.trim().to_string();
    if external_key.is_empty() {
        return Err(CallbridgeError::InvalidPayload(
            "queue item needs an external key".to_string(),
        ));
    }
    let first_name = non_empty(&item.first_name);
    let last_name = non_empty(&item.last_name);
    let company = non_empty(&item.company);
    let email = non_empty(&item.email);
    let phone = non_empty(&item.phone);

    db.connection()
        .call(move |conn| -> Result<EnqueueOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM queue_items
                     WHERE tenant_id = ?1 AND campaign = ?2 AND external_key = ?3",
                    params![tenant_id, campaign, external_key],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE queue_items SET
                             first_name = COALESCE(?1, first_name),
                             last_name = COALESCE(?2, last_name),
                             company = COALESCE(?3, company),
                             email = COALESCE(?4, email),
                             phone = COALESCE(?5, phone),
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?6",
                        params![first_name, last_name, company, email, phone, id],
                    )?;
                    EnqueueOutcome::Merged(id)
                }
                None => {
                    tx.execute(
                        "INSERT INTO queue_items (tenant_id, campaign, external_key,
                             first_name, last_name, company, email, phone)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            tenant_id,
                            campaign,
                            external_key,
                            first_name,
                            last_name,
                            company,
                            email,
                            phone
                        ],
                    )?;
                    EnqueueOutcome::Inserted(tx.last_insert_rowid())
                }
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)
}

/// Lease the next pending item to `holder` for `ttl`.
///
/// Expired leases in scope are reclaimed first. Selection prefers the fewest
/// attempts, then the oldest item. `campaign = None` leases from any
/// campaign. Returns `None` when nothing is available. Leases are capped at
/// [`MAX_LEASE_SECS`].
pub async fn lease_next(
    db: &Database,
    tenant_id: i64,
    campaign: Option<&str>,
    holder: &str,
    ttl: Duration,
) -> Result<Option<QueueItem>, CallbridgeError> {
    let campaign = campaign.map(|c| c.trim().to_string());
    let holder = holder.to_string();
    let ttl_secs = i64::try_from(ttl.as_secs())
        .unwrap_or(i64::MAX)
        .min(MAX_LEASE_SECS);
    let ttl_modifier = format!("+{ttl_secs} seconds");

    let (reclaimed, leased) = db
        .connection()
        .call(move |conn| -> Result<(usize, Option<QueueItem>), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let reclaimed = tx.execute(
                "UPDATE queue_items SET status = 'pending', lock_holder = NULL,
                     locked_at = NULL, lease_expires_at = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR campaign = ?2)
                   AND status = 'locked'
                   AND lease_expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![tenant_id, campaign],
            )?;

            let candidate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM queue_items
                     WHERE tenant_id = ?1 AND (?2 IS NULL OR campaign = ?2)
                       AND status = 'pending'
                     ORDER BY attempts ASC, created_at ASC, id ASC
                     LIMIT 1",
                    params![tenant_id, campaign],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = candidate else {
                tx.commit()?;
                return Ok((reclaimed, None));
            };

            let granted = tx.execute(
                "UPDATE queue_items SET status = 'locked', lock_holder = ?1,
                     locked_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     lease_expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     lease_ttl_secs = ?3,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?4 AND status = 'pending'",
                params![holder, ttl_modifier, ttl_secs, id],
            )?;

            let item = if granted == 1 {
                select_item(&tx, id)?
            } else {
                None
            };
            tx.commit()?;
            Ok((reclaimed, item))
        })
        .await
        .map_err(map_tr_err)?;

    if reclaimed > 0 {
        info!(tenant_id, reclaimed, "reclaimed expired queue leases");
    }
    if let Some(item) = &leased {
        debug!(tenant_id, id = item.id, holder = ?item.lock_holder, "queue item leased");
    }
    Ok(leased)
}

/// Finish a leased item. Only the current holder of a `locked` item may
/// release it; attempts are incremented and `result` stored.
pub async fn release(
    db: &Database,
    id: i64,
    holder: &str,
    outcome: ReleaseOutcome,
    result: Option<&str>,
) -> Result<QueueItem, QueueError> {
    let holder_owned = holder.to_string();
    let status = outcome.target().to_string();
    let result = result.map(str::to_string);

    let released = db
        .connection()
        .call(move |conn| -> Result<Result<QueueItem, bool>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE queue_items SET status = ?1, attempts = attempts + 1,
                     last_result = ?2, lock_holder = NULL, locked_at = NULL,
                     lease_expires_at = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3 AND status = 'locked' AND lock_holder = ?4",
                params![status, result, id, holder_owned],
            )?;
            let item = select_item(&tx, id)?;
            tx.commit()?;
            Ok(match (changed, item) {
                (1, Some(item)) => Ok(item),
                (_, found) => Err(found.is_some()),
            })
        })
        .await
        .map_err(|e| QueueError::Storage(map_tr_err(e)))?;

    match released {
        Ok(item) => {
            debug!(id, status = %item.status, "queue item released");
            Ok(item)
        }
        Err(true) => Err(QueueError::NotHeld {
            id,
            holder: holder.to_string(),
        }),
        Err(false) => Err(QueueError::NotFound(id)),
    }
}

/// Fetch one item.
pub async fn get(db: &Database, id: i64) -> Result<Option<QueueItem>, CallbridgeError> {
    db.connection()
        .call(move |conn| select_item(conn, id))
        .await
        .map_err(map_tr_err)
}

/// Count items by status. `campaign = None` counts every campaign.
pub async fn counts(
    db: &Database,
    tenant_id: i64,
    campaign: Option<&str>,
) -> Result<QueueCounts, CallbridgeError> {
    let campaign = campaign.map(|c| c.trim().to_string());
    db.connection()
        .call(move |conn| -> Result<QueueCounts, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM queue_items
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR campaign = ?2)
                 GROUP BY status",
            )?;
            let mut counts = QueueCounts::default();
            let rows = stmt.query_map(params![tenant_id, campaign], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, n) = row?;
                let n = n as u64;
                match status.as_str() {
                    "pending" => counts.pending = n,
                    "locked" => counts.locked = n,
                    "done" => counts.done = n,
                    "skipped" => counts.skipped = n,
                    "error" => counts.error = n,
                    _ => {}
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}
