// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared handles for the ingest pipeline and queue jobs.

use std::sync::Arc;

use callbridge_config::model::CallbridgeConfig;
use callbridge_core::{CallbridgeError, Tenant};
use callbridge_crm::{CrmClient, Credential, HistoryWriter};
use callbridge_storage::queries::tenants;
use callbridge_storage::{CredentialKey, Database};

/// Everything a request needs. Cheap to clone.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<CallbridgeConfig>,
    pub db: Database,
    pub key: CredentialKey,
    pub crm: CrmClient,
    pub history: HistoryWriter,
}

impl ServiceContext {
    /// Fails when no credential key is configured: tenant secrets cannot be
    /// read without it.
    pub fn new(config: Arc<CallbridgeConfig>, db: Database) -> Result<Self, CallbridgeError> {
        let key = config
            .storage
            .credential_key
            .as_deref()
            .ok_or_else(|| {
                CallbridgeError::Config(
                    "storage.credential_key is required to read tenant credentials".to_string(),
                )
            })
            .and_then(CredentialKey::from_hex)?;
        let crm = CrmClient::new(&config.crm)?;
        let history = HistoryWriter::new(config.resolver.link_fields.clone());
        Ok(Self {
            config,
            db,
            key,
            crm,
            history,
        })
    }

    pub async fn tenant(&self, business_id: &str) -> Result<Option<Tenant>, CallbridgeError> {
        tenants::find_active_by_business_id(&self.db, &self.key, business_id.trim()).await
    }

    /// The tenant's CRM credential, if it has one.
    pub fn crm_credential(tenant: &Tenant) -> Option<Credential> {
        tenant
            .crm_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Credential::new)
    }
}
