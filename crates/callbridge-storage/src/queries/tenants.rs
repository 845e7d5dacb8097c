// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant, disposition-map and agent-map queries. Secrets are sealed on
//! write and opened on read with the configured [`CredentialKey`].

use callbridge_core::{AgentMapping, CallbridgeError, DispositionMapping, NewTenant, Tenant};
use rusqlite::{params, OptionalExtension, Row};

use crate::crypto::{self, CredentialKey};
use crate::database::{map_tr_err, Database};

const TENANT_COLUMNS: &str = "id, business_id, name, dialer_api_key, crm_token, webhook_secret,
     crm_user_key, crm_team_key, event_type_key, status_key, link_field, active,
     created_at, updated_at";

/// A tenant row before its secrets are opened.
struct SealedTenant {
    id: i64,
    business_id: String,
    name: String,
    dialer_api_key: Option<Vec<u8>>,
    crm_token: Option<Vec<u8>>,
    webhook_secret: Option<Vec<u8>>,
    crm_user_key: Option<String>,
    crm_team_key: Option<String>,
    event_type_key: i64,
    status_key: i64,
    link_field: Option<String>,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl SealedTenant {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            business_id: row.get(1)?,
            name: row.get(2)?,
            dialer_api_key: row.get(3)?,
            crm_token: row.get(4)?,
            webhook_secret: row.get(5)?,
            crm_user_key: row.get(6)?,
            crm_team_key: row.get(7)?,
            event_type_key: row.get(8)?,
            status_key: row.get(9)?,
            link_field: row.get(10)?,
            active: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn open(self, key: &CredentialKey) -> Result<Tenant, CallbridgeError> {
        Ok(Tenant {
            id: self.id,
            business_id: self.business_id,
            name: self.name,
            dialer_api_key: crypto::open_text(key, self.dialer_api_key.as_deref())?,
            crm_token: crypto::open_text(key, self.crm_token.as_deref())?,
            webhook_secret: crypto::open_text(key, self.webhook_secret.as_deref())?,
            crm_user_key: self.crm_user_key,
            crm_team_key: self.crm_team_key,
            event_type_key: self.event_type_key,
            status_key: self.status_key,
            link_field: self.link_field,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Register a tenant. Fails with `Conflict` if an active tenant already owns
/// the business id.
pub async fn insert(
    db: &Database,
    key: &CredentialKey,
    tenant: &NewTenant,
) -> Result<Tenant, CallbridgeError> {
    let dialer_api_key = crypto::seal_text(key, tenant.dialer_api_key.as_deref())?;
    let crm_token = crypto::seal_text(key, tenant.crm_token.as_deref())?;
    let webhook_secret = crypto::seal_text(key, tenant.webhook_secret.as_deref())?;
    let t = tenant.clone();
    let business_id = tenant.business_id.clone();

    let sealed = db
        .connection()
        .call(move |conn| -> Result<SealedTenant, rusqlite::Error> {
            conn.execute(
                "INSERT INTO tenants (business_id, name, dialer_api_key, crm_token, webhook_secret,
                     crm_user_key, crm_team_key, event_type_key, status_key, link_field)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    t.business_id,
                    t.name,
                    dialer_api_key,
                    crm_token,
                    webhook_secret,
                    t.crm_user_key,
                    t.crm_team_key,
                    t.event_type_key,
                    t.status_key,
                    t.link_field,
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
                params![id],
                SealedTenant::from_row,
            )
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(f, _))
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CallbridgeError::Conflict(format!(
                    "an active tenant already uses business id `{business_id}`"
                ))
            }
            other => map_tr_err(other),
        })?;

    sealed.open(key)
}

/// Find the active tenant for a dialer business id.
pub async fn find_active_by_business_id(
    db: &Database,
    key: &CredentialKey,
    business_id: &str,
) -> Result<Option<Tenant>, CallbridgeError> {
    let business_id = business_id.to_string();
    let sealed = db
        .connection()
        .call(move |conn| -> Result<Option<SealedTenant>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {TENANT_COLUMNS} FROM tenants WHERE business_id = ?1 AND active = 1"
                ),
                params![business_id],
                SealedTenant::from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    sealed.map(|s| s.open(key)).transpose()
}

/// Fetch a tenant by id, active or not.
pub async fn get(
    db: &Database,
    key: &CredentialKey,
    id: i64,
) -> Result<Option<Tenant>, CallbridgeError> {
    let sealed = db
        .connection()
        .call(move |conn| -> Result<Option<SealedTenant>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
                params![id],
                SealedTenant::from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    sealed.map(|s| s.open(key)).transpose()
}

/// List all tenants, newest first.
pub async fn list(db: &Database, key: &CredentialKey) -> Result<Vec<Tenant>, CallbridgeError> {
    let rows = db
        .connection()
        .call(|conn| -> Result<Vec<SealedTenant>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map([], SealedTenant::from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter().map(|s| s.open(key)).collect()
}

/// Mark a tenant inactive. Returns whether a row changed.
pub async fn deactivate(db: &Database, id: i64) -> Result<bool, CallbridgeError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE tenants SET active = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND active = 1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the history keys for one disposition label.
pub async fn set_disposition(
    db: &Database,
    mapping: &DispositionMapping,
) -> Result<(), CallbridgeError> {
    let m = mapping.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO disposition_map (tenant_id, disposition, status_key, event_type_key)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, disposition) DO UPDATE SET
                     status_key = excluded.status_key,
                     event_type_key = excluded.event_type_key",
                params![m.tenant_id, m.disposition.trim(), m.status_key, m.event_type_key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a disposition label, case-insensitively.
pub async fn find_disposition(
    db: &Database,
    tenant_id: i64,
    disposition: &str,
) -> Result<Option<DispositionMapping>, CallbridgeError> {
    let disposition = disposition.trim().to_string();
    db.connection()
        .call(move |conn| -> Result<Option<DispositionMapping>, rusqlite::Error> {
            conn.query_row(
                "SELECT tenant_id, disposition, status_key, event_type_key
                 FROM disposition_map WHERE tenant_id = ?1 AND disposition = ?2",
                params![tenant_id, disposition],
                |row| {
                    Ok(DispositionMapping {
                        tenant_id: row.get(0)?,
                        disposition: row.get(1)?,
                        status_key: row.get(2)?,
                        event_type_key: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Attribute an agent's history to a CRM user (and optionally team).
pub async fn set_agent(db: &Database, mapping: &AgentMapping) -> Result<(), CallbridgeError> {
    let m = mapping.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO agent_map (tenant_id, agent_email, user_key, team_key)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tenant_id, agent_email) DO UPDATE SET
                     user_key = excluded.user_key,
                     team_key = excluded.team_key,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![m.tenant_id, m.agent_email.trim(), m.user_key.trim(), m.team_key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up an agent by email, case-insensitively.
pub async fn find_agent(
    db: &Database,
    tenant_id: i64,
    agent_email: &str,
) -> Result<Option<AgentMapping>, CallbridgeError> {
    let agent_email = agent_email.trim().to_string();
    db.connection()
        .call(move |conn| -> Result<Option<AgentMapping>, rusqlite::Error> {
            conn.query_row(
                "SELECT tenant_id, agent_email, user_key, team_key
                 FROM agent_map WHERE tenant_id = ?1 AND agent_email = ?2",
                params![tenant_id, agent_email],
                |row| {
                    Ok(AgentMapping {
                        tenant_id: row.get(0)?,
                        agent_email: row.get(1)?,
                        user_key: row.get(2)?,
                        team_key: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_tenant(business_id: &str) -> NewTenant {
        NewTenant {
            business_id: business_id.to_string(),
            name: "Acme Realty".to_string(),
            crm_token: Some("crm-token".to_string()),
            webhook_secret: Some("hook-secret".to_string()),
            event_type_key: 1,
            ..NewTenant::default()
        }
    }

    async fn setup() -> (Database, CredentialKey) {
        (
            Database::open_in_memory().await.unwrap(),
            CredentialKey::generate().unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_and_find_opens_secrets() {
        let (db, key) = setup().await;
        let created = insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        assert!(created.active);

        let found = find_active_by_business_id(&db, &key, "biz-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.crm_token.as_deref(), Some("crm-token"));
        assert_eq!(found.webhook_secret.as_deref(), Some("hook-secret"));
        assert_eq!(found.dialer_api_key, None);
    }

    #[tokio::test]
    async fn secrets_are_not_stored_in_clear() {
        let (db, key) = setup().await;
        insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        let raw: Vec<u8> = db
            .connection()
            .call(|conn| -> Result<Vec<u8>, rusqlite::Error> {
                conn.query_row("SELECT crm_token FROM tenants", [], |r| r.get(0))
            })
            .await
            .unwrap();
        assert!(!raw.windows(9).any(|w| w == b"crm-token"));
    }

    #[tokio::test]
    async fn second_active_tenant_for_business_conflicts() {
        let (db, key) = setup().await;
        insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        let err = insert(&db, &key, &new_tenant("biz-1")).await.unwrap_err();
        assert!(matches!(err, CallbridgeError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivated_tenant_frees_business_id() {
        let (db, key) = setup().await;
        let first = insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        assert!(deactivate(&db, first.id).await.unwrap());
        assert!(!deactivate(&db, first.id).await.unwrap());
        assert!(find_active_by_business_id(&db, &key, "biz-1").await.unwrap().is_none());

        let second = insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(list(&db, &key).await.unwrap().len(), 2);
        assert!(!get(&db, &key, first.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn disposition_lookup_ignores_case() {
        let (db, key) = setup().await;
        let tenant = insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        set_disposition(
            &db,
            &DispositionMapping {
                tenant_id: tenant.id,
                disposition: "Left Voicemail".into(),
                status_key: Some(7),
                event_type_key: None,
            },
        )
        .await
        .unwrap();

        let found = find_disposition(&db, tenant.id, "left voicemail")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status_key, Some(7));
        assert!(find_disposition(&db, tenant.id, "Busy").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn agent_mapping_upserts_and_ignores_case() {
        let (db, key) = setup().await;
        let tenant = insert(&db, &key, &new_tenant("biz-1")).await.unwrap();
        let mut mapping = AgentMapping {
            tenant_id: tenant.id,
            agent_email: "Dana@Example.com".into(),
            user_key: "u-1".into(),
            team_key: None,
        };
        set_agent(&db, &mapping).await.unwrap();
        mapping.user_key = "u-2".into();
        mapping.team_key = Some("t-2".into());
        set_agent(&db, &mapping).await.unwrap();

        let found = find_agent(&db, tenant.id, "dana@example.com ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_key, "u-2");
        assert_eq!(found.team_key.as_deref(), Some("t-2"));
        assert!(find_agent(&db, tenant.id, "other@example.com").await.unwrap().is_none());
    }
}
