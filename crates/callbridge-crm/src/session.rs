// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-resolution memo of discovered facts.

use callbridge_config::model::ResolverConfig;
use tokio::sync::OnceCell;

use crate::client::{CrmClient, Credential};
use crate::error::CrmError;
use crate::fields::discover_phone_fields;

/// Scope for one resolution or one batch run. Phone fields are discovered
/// at most once per session; a failed discovery is retried on next use.
pub struct ResolutionSession<'a> {
    client: &'a CrmClient,
    credential: &'a Credential,
    settings: &'a ResolverConfig,
    phone_fields: OnceCell<Vec<String>>,
}

impl<'a> ResolutionSession<'a> {
    pub fn new(client: &'a CrmClient, credential: &'a Credential, settings: &'a ResolverConfig) -> Self {
        Self {
            client,
            credential,
            settings,
            phone_fields: OnceCell::new(),
        }
    }

    pub fn client(&self) -> &CrmClient {
        self.client
    }

    pub fn credential(&self) -> &Credential {
        self.credential
    }

    pub fn settings(&self) -> &ResolverConfig {
        self.settings
    }

    pub async fn phone_fields(&self) -> Result<&[String], CrmError> {
        let fields = self
            .phone_fields
            .get_or_try_init(|| discover_phone_fields(self.client, self.credential))
            .await?;
        Ok(fields.as_slice())
    }
}
