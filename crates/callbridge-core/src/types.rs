// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the storage, CRM, dialer, and gateway crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One customer account pairing a dialer account with a CRM account.
///
/// Secrets are held decrypted in memory once loaded; the `Debug` impl never
/// prints them.
#[derive(Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: i64,
    /// The dialer platform's account identifier (`businessid` on webhooks).
    pub business_id: String,
    pub name: String,
    pub dialer_api_key: Option<String>,
    /// Bearer token passed through to the CRM.
    pub crm_token: Option<String>,
    /// Shared secret used to verify inbound webhook signatures.
    pub webhook_secret: Option<String>,
    pub crm_user_key: Option<String>,
    pub crm_team_key: Option<String>,
    pub event_type_key: i64,
    pub status_key: i64,
    /// Tenant-preferred history link field, tried before the defaults.
    pub link_field: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("business_id", &self.business_id)
            .field("name", &self.name)
            .field("dialer_api_key", &redact(&self.dialer_api_key))
            .field("crm_token", &redact(&self.crm_token))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("crm_user_key", &self.crm_user_key)
            .field("crm_team_key", &self.crm_team_key)
            .field("event_type_key", &self.event_type_key)
            .field("status_key", &self.status_key)
            .field("link_field", &self.link_field)
            .field("active", &self.active)
            .finish()
    }
}

/// Input for registering a tenant.
#[derive(Clone, Default)]
pub struct NewTenant {
    pub business_id: String,
    pub name: String,
    pub dialer_api_key: Option<String>,
    pub crm_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub crm_user_key: Option<String>,
    pub crm_team_key: Option<String>,
    pub event_type_key: i64,
    pub status_key: i64,
    pub link_field: Option<String>,
}

impl std::fmt::Debug for NewTenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewTenant")
            .field("business_id", &self.business_id)
            .field("name", &self.name)
            .field("has_crm_token", &self.crm_token.is_some())
            .field("has_webhook_secret", &self.webhook_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Per-tenant override of history keys for one disposition label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionMapping {
    pub tenant_id: i64,
    pub disposition: String,
    pub status_key: Option<i64>,
    pub event_type_key: Option<i64>,
}

/// CRM user and team a dialer agent's history is attributed to. Wins over
/// the tenant-wide keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMapping {
    pub tenant_id: i64,
    pub agent_email: String,
    pub user_key: String,
    /// Falls back to the tenant team key when absent.
    pub team_key: Option<String>,
}

/// Lifecycle state of a queue item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Locked,
    Done,
    Skipped,
    Error,
}

impl QueueStatus {
    /// Terminal states are never leased again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Error)
    }
}

/// A durable outbound-dial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub tenant_id: i64,
    /// `None` is the default campaign.
    pub campaign: Option<String>,
    /// CRM contact key the item was seeded from.
    pub external_key: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    /// Canonical phone number.
    pub phone: Option<String>,
    pub status: QueueStatus,
    pub lock_holder: Option<String>,
    pub locked_at: Option<String>,
    pub lease_expires_at: Option<String>,
    pub lease_ttl_secs: i64,
    pub attempts: i64,
    pub last_result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for enqueueing or merging a queue item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub external_key: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Recorded outcome of an admitted inbound event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    Ok,
    Error,
}

/// Append-only record of one processed inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: i64,
    pub tenant_id: i64,
    pub kind: String,
    pub call_id: Option<String>,
    pub fingerprint: String,
    pub payload: String,
    pub status: EventStatus,
    pub detail: Option<String>,
    pub created_at: String,
}
