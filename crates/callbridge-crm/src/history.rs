// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activity-history writes with link-field discovery.
//!
//! Tenants disagree on which attribute ties a history entry to its contact.
//! Candidates are tried in order; the first one the CRM accepts is cached
//! per tenant and tried first next time.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::{CrmClient, Credential, Family};
use crate::error::CrmError;
use crate::probe::{ProbeRequest, Probed};

pub const HISTORY_PATHS: &[&str] = &["history", "History"];

/// One link-field attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryAttempt {
    pub link_field: String,
    /// Route that answered; `None` when no history route exists.
    pub url: Option<String>,
    pub status: Option<u16>,
    pub accepted: bool,
    /// Response excerpt for rejections; empty when accepted.
    pub reason: String,
}

/// An accepted history write.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWrite {
    pub link_field: String,
    pub url: String,
    pub response: Value,
    /// Every attempt in order, ending with the accepted one.
    pub attempts: Vec<HistoryAttempt>,
}

/// Where a history entry goes.
#[derive(Debug, Clone, Copy)]
pub struct HistoryTarget<'a> {
    pub tenant_id: i64,
    /// Tenant-configured link field, tried after any cached one.
    pub tenant_link_field: Option<&'a str>,
    pub contact_key: &'a str,
}

/// Writes history entries. Cheap to clone; clones share the cache.
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    link_fields: Arc<DashMap<i64, String>>,
    defaults: Vec<String>,
}

impl HistoryWriter {
    pub fn new(defaults: Vec<String>) -> Self {
        Self {
            link_fields: Arc::new(DashMap::new()),
            defaults,
        }
    }

    /// Link field last accepted for a tenant.
    pub fn cached(&self, tenant_id: i64) -> Option<String> {
        self.link_fields.get(&tenant_id).map(|f| f.value().clone())
    }

    /// Cached field, then the tenant's field, then the defaults; no repeats.
    pub fn candidate_fields(&self, tenant_id: i64, tenant_field: Option<&str>) -> Vec<String> {
        let cached = self.cached(tenant_id);
        let mut out: Vec<String> = Vec::with_capacity(self.defaults.len() + 2);
        let ordered = cached
            .iter()
            .map(String::as_str)
            .chain(tenant_field)
            .chain(self.defaults.iter().map(String::as_str));
        for field in ordered {
            let field = field.trim();
            if !field.is_empty() && !out.iter().any(|f| f == field) {
                out.push(field.to_string());
            }
        }
        out
    }

    /// Post `fields` with each candidate link field until one is accepted.
    pub async fn write(
        &self,
        client: &CrmClient,
        credential: &Credential,
        target: HistoryTarget<'_>,
        fields: &Map<String, Value>,
    ) -> Result<HistoryWrite, CrmError> {
        let mut attempts = Vec::new();
        for link_field in self.candidate_fields(target.tenant_id, target.tenant_link_field) {
            let mut body = fields.clone();
            body.insert(
                link_field.clone(),
                Value::String(target.contact_key.to_string()),
            );
            let request = ProbeRequest::post(Family::Primary, HISTORY_PATHS, Value::Object(body));

            match client.probe(credential, &request).await? {
                Probed::Routed { url, response } if response.is_success() => {
                    if self.cached(target.tenant_id).as_deref() != Some(link_field.as_str()) {
                        self.link_fields.insert(target.tenant_id, link_field.clone());
                    }
                    info!(
                        tenant_id = target.tenant_id,
                        link_field = %link_field,
                        status = response.status,
                        attempts = attempts.len() + 1,
                        "history written"
                    );
                    attempts.push(HistoryAttempt {
                        link_field: link_field.clone(),
                        url: Some(url.clone()),
                        status: Some(response.status),
                        accepted: true,
                        reason: String::new(),
                    });
                    return Ok(HistoryWrite {
                        link_field,
                        url,
                        response: response.body,
                        attempts,
                    });
                }
                Probed::Routed { url, response } => {
                    debug!(link_field = %link_field, status = response.status, "history rejected");
                    attempts.push(HistoryAttempt {
                        link_field,
                        url: Some(url),
                        status: Some(response.status),
                        accepted: false,
                        reason: response.excerpt(),
                    });
                }
                Probed::Exhausted { attempted } => {
                    attempts.push(HistoryAttempt {
                        link_field,
                        url: None,
                        status: None,
                        accepted: false,
                        reason: format!("no history route among {}", attempted.join(", ")),
                    });
                }
            }
        }
        warn!(
            tenant_id = target.tenant_id,
            attempts = attempts.len(),
            "history rejected for every link field"
        );
        Err(CrmError::HistoryRejected { attempts })
    }
}
