// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingest pipeline.
//!
//! signature check -> idempotency admit -> contact resolution -> history
//! write -> event log. Every admitted event ends with exactly one log entry,
//! whatever the outcome.

use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use callbridge_core::{CallbridgeError, EventStatus, Tenant};
use callbridge_crm::{
    resolve_or_create, ContactHints, ContactSource, Credential, CrmError, HistoryAttempt,
    HistoryTarget, HistoryWrite, PhoneNumber, Resolution, ResolutionSession,
};
use callbridge_storage::guard::{self, Admission};
use callbridge_storage::queries::{contacts, tenants};

use crate::context::ServiceContext;
use crate::event::DialerEvent;
use crate::history::{self, Overrides};
use crate::signature::{self, SignatureError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("no active tenant for business id {0}")]
    UnknownTenant(String),

    #[error("webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("event processing exceeded {0}s")]
    TimedOut(u64),

    #[error(transparent)]
    Crm(#[from] CrmError),

    #[error(transparent)]
    Storage(#[from] CallbridgeError),
}

/// Request headers the pipeline reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookHeaders<'a> {
    pub signature: Option<&'a str>,
    /// IANA zone for naive timestamps in the payload.
    pub timezone: Option<&'a str>,
}

/// A history entry written for an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEvent {
    pub contact_key: String,
    pub matched_by: ContactSource,
    pub created: bool,
    pub link_field: String,
    /// CRM response to the history write.
    pub history: Value,
    /// Link fields tried, ending with the accepted one.
    pub attempts: Vec<HistoryAttempt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Processed(ProcessedEvent),
    Duplicate,
    /// Acknowledged and logged without a CRM write.
    Skipped { reason: String },
}

fn skipped(reason: impl Into<String>) -> IngestOutcome {
    IngestOutcome::Skipped {
        reason: reason.into(),
    }
}

/// Stand-in event id for payloads without a call id: exact redeliveries
/// still collapse onto one fingerprint.
fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn zone_from_header(value: Option<&str>) -> Option<Tz> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse::<Tz>() {
        Ok(zone) => Some(zone),
        Err(_) => {
            warn!(zone = %value, "unknown time zone header, reading timestamps as UTC");
            None
        }
    }
}

/// Run one raw webhook delivery through the pipeline.
pub async fn ingest(
    ctx: &ServiceContext,
    body: &[u8],
    headers: WebhookHeaders<'_>,
) -> Result<IngestOutcome, IngestError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| IngestError::Payload(format!("invalid JSON: {e}")))?;
    let zone = zone_from_header(headers.timezone);
    let event =
        DialerEvent::parse_in(&payload, zone).map_err(|e| IngestError::Payload(e.to_string()))?;
    let business_id = event
        .business_id
        .clone()
        .ok_or_else(|| IngestError::Payload("missing businessid".to_string()))?;

    let tenant = ctx
        .tenant(&business_id)
        .await?
        .ok_or_else(|| IngestError::UnknownTenant(business_id.clone()))?;
    if let Some(secret) = tenant.webhook_secret.as_deref() {
        signature::verify(secret, body, headers.signature)?;
    }

    let event_id = event.call_id.clone().unwrap_or_else(|| body_digest(body));
    let claim_ttl = Duration::from_secs(ctx.config.webhook.claim_ttl_secs);
    let ticket = match guard::admit(&ctx.db, tenant.id, Some(event_id.as_str()), &event.kind, claim_ttl).await? {
        Admission::Accepted(ticket) => ticket,
        Admission::Duplicate => {
            info!(tenant_id = tenant.id, kind = %event.kind, event_id = %event_id, "duplicate delivery");
            return Ok(IngestOutcome::Duplicate);
        }
    };

    // The claim must be released before claim_ttl lapses.
    let budget = ctx.config.webhook.process_timeout_secs;
    let work = process(ctx, &tenant, &event);
    let result = match tokio::time::timeout(Duration::from_secs(budget), work).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::TimedOut(budget)),
    };

    let (status, detail) = match &result {
        Ok(IngestOutcome::Skipped { reason }) => (EventStatus::Ok, Some(format!("skipped: {reason}"))),
        Ok(_) => (EventStatus::Ok, None),
        Err(e) => (EventStatus::Error, Some(e.to_string())),
    };
    let raw = String::from_utf8_lossy(body);
    guard::complete(&ctx.db, &ticket, &raw, status, detail.as_deref()).await?;

    match &result {
        Ok(IngestOutcome::Processed(done)) => info!(
            tenant_id = tenant.id,
            kind = %event.kind,
            contact_key = %done.contact_key,
            link_field = %done.link_field,
            matched_by = ?done.matched_by,
            "event processed"
        ),
        Ok(IngestOutcome::Skipped { reason }) => {
            info!(tenant_id = tenant.id, kind = %event.kind, reason = %reason, "event skipped")
        }
        Ok(IngestOutcome::Duplicate) => {}
        Err(e) => warn!(tenant_id = tenant.id, kind = %event.kind, error = %e, "event failed"),
    }
    result
}

async fn process(
    ctx: &ServiceContext,
    tenant: &Tenant,
    event: &DialerEvent,
) -> Result<IngestOutcome, IngestError> {
    let webhook = &ctx.config.webhook;
    if !webhook
        .history_events
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&event.kind))
    {
        return Ok(skipped(format!("event `{}` does not write history", event.kind)));
    }
    let Some(credential) = ServiceContext::crm_credential(tenant) else {
        return Ok(skipped("tenant has no CRM credential"));
    };
    let Some(number) = event.target_number() else {
        return Ok(skipped("event carries no phone number"));
    };
    let phone = match PhoneNumber::parse(number, ctx.crm.country_code()) {
        Ok(phone) => phone.canonical(),
        Err(e) => return Ok(skipped(e.to_string())),
    };

    let disposition = match event.disposition.as_deref() {
        Some(label) => tenants::find_disposition(&ctx.db, tenant.id, label).await?,
        None => None,
    };
    let agent = match event.agent.as_deref() {
        Some(email) => tenants::find_agent(&ctx.db, tenant.id, email).await?,
        None => None,
    };
    let overrides = Overrides {
        disposition: disposition.as_ref(),
        agent: agent.as_ref(),
    };
    let fields = history::compose(event, tenant, overrides, Utc::now());

    let cached = if webhook.contact_cache {
        contacts::lookup(&ctx.db, tenant.id, &phone).await?
    } else {
        None
    };
    if let Some(key) = cached {
        match write_history(ctx, &credential, tenant, &key, &fields).await {
            Ok(written) => {
                contacts::remember(&ctx.db, tenant.id, &phone, &key).await?;
                return Ok(processed(key, ContactSource::Cached, false, written));
            }
            Err(CrmError::HistoryRejected { .. }) => {
                warn!(tenant_id = tenant.id, phone = %phone, key = %key, "cached contact rejected, resolving again");
                contacts::forget(&ctx.db, tenant.id, &phone, &key).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let session = ResolutionSession::new(&ctx.crm, &credential, &ctx.config.resolver);
    let reference = match resolve_or_create(
        &session,
        number,
        &ContactHints::default(),
        webhook.allow_create,
    )
    .await
    {
        Ok(Resolution::Resolved(reference)) => reference,
        Ok(Resolution::Unmatched { phone }) => {
            return Ok(skipped(format!("no contact matches {phone}")));
        }
        Err(CrmError::InvalidPhone(e)) => return Ok(skipped(e.to_string())),
        Err(e) => return Err(e.into()),
    };

    let written = write_history(ctx, &credential, tenant, &reference.key, &fields).await?;
    if webhook.contact_cache {
        contacts::remember(&ctx.db, tenant.id, &phone, &reference.key).await?;
    }
    Ok(processed(
        reference.key,
        reference.source,
        reference.created,
        written,
    ))
}

async fn write_history(
    ctx: &ServiceContext,
    credential: &Credential,
    tenant: &Tenant,
    contact_key: &str,
    fields: &Map<String, Value>,
) -> Result<HistoryWrite, CrmError> {
    let target = HistoryTarget {
        tenant_id: tenant.id,
        tenant_link_field: tenant.link_field.as_deref(),
        contact_key,
    };
    ctx.history.write(&ctx.crm, credential, target, fields).await
}

fn processed(
    contact_key: String,
    matched_by: ContactSource,
    created: bool,
    written: HistoryWrite,
) -> IngestOutcome {
    IngestOutcome::Processed(ProcessedEvent {
        contact_key,
        matched_by,
        created,
        link_field: written.link_field,
        history: written.response,
        attempts: written.attempts,
    })
}
