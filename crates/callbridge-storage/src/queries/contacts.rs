// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone to contact-key cache.
//!
//! One row per (tenant, canonical phone). Entries can go stale when the CRM
//! merges or deletes a contact; callers drop them with [`forget`] and resolve
//! again.

use callbridge_core::CallbridgeError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

/// Cached contact key for a canonical phone.
pub async fn lookup(
    db: &Database,
    tenant_id: i64,
    phone_e164: &str,
) -> Result<Option<String>, CallbridgeError> {
    let phone = phone_e164.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT contact_key FROM contact_cache WHERE tenant_id = ?1 AND phone_e164 = ?2",
                params![tenant_id, phone],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Record (or refresh) the contact key for a phone.
pub async fn remember(
    db: &Database,
    tenant_id: i64,
    phone_e164: &str,
    contact_key: &str,
) -> Result<(), CallbridgeError> {
    let phone = phone_e164.to_string();
    let key = contact_key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO contact_cache (tenant_id, phone_e164, contact_key)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant_id, phone_e164) DO UPDATE SET
                     contact_key = excluded.contact_key,
                     last_seen_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![tenant_id, phone, key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Drop a stale entry. Only removes the row while it still holds
/// `contact_key`, so a fresher key written meanwhile survives.
pub async fn forget(
    db: &Database,
    tenant_id: i64,
    phone_e164: &str,
    contact_key: &str,
) -> Result<bool, CallbridgeError> {
    let phone = phone_e164.to_string();
    let key = contact_key.to_string();
    let removed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM contact_cache
                 WHERE tenant_id = ?1 AND phone_e164 = ?2 AND contact_key = ?3",
                params![tenant_id, phone, key],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CredentialKey;
    use crate::queries::tenants;
    use callbridge_core::NewTenant;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let key = CredentialKey::generate().unwrap();
        let tenant = tenants::insert(
            &db,
            &key,
            &NewTenant {
                business_id: "biz".into(),
                ..NewTenant::default()
            },
        )
        .await
        .unwrap();
        (db, tenant.id)
    }

    #[tokio::test]
    async fn remember_then_refresh() {
        let (db, tenant) = setup().await;
        assert!(lookup(&db, tenant, "+15551234567").await.unwrap().is_none());

        remember(&db, tenant, "+15551234567", "c-1").await.unwrap();
        assert_eq!(
            lookup(&db, tenant, "+15551234567").await.unwrap().as_deref(),
            Some("c-1")
        );
        remember(&db, tenant, "+15551234567", "c-2").await.unwrap();
        assert_eq!(
            lookup(&db, tenant, "+15551234567").await.unwrap().as_deref(),
            Some("c-2")
        );
        assert!(lookup(&db, tenant + 1, "+15551234567").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forget_only_removes_the_stale_key() {
        let (db, tenant) = setup().await;
        remember(&db, tenant, "+15551234567", "c-2").await.unwrap();

        assert!(!forget(&db, tenant, "+15551234567", "c-1").await.unwrap());
        assert!(lookup(&db, tenant, "+15551234567").await.unwrap().is_some());

        assert!(forget(&db, tenant, "+15551234567", "c-2").await.unwrap());
        assert!(lookup(&db, tenant, "+15551234567").await.unwrap().is_none());
    }
}
