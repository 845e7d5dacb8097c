// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Every handler answers with a definitive status: skips and duplicates are
//! successes, failures carry an `{"error": ...}` body.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use callbridge_core::{CallbridgeError, Tenant};
use callbridge_crm::phone::digits_of;
use callbridge_crm::{resolve_or_create, ContactHints, CrmError, PhoneNumber, Resolution, ResolutionSession};
use callbridge_dialer::{
    ingest, seed, sync_tenant, IngestError, IngestOutcome, SeedItem, ServiceContext, SyncError,
    SyncRequest, WebhookHeaders,
};
use callbridge_storage::queries::queue;
use callbridge_storage::{QueueError, ReleaseOutcome};

use crate::server::GatewayState;

/// Digits a searchable number must carry, country code included.
const SEARCH_MIN_DIGITS: usize = 11;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn internal(err: &CallbridgeError) -> Response {
    tracing::error!(error = %err, "request failed");
    let status = if err.is_transport() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, err.to_string())
}

fn crm_failure(err: &CrmError) -> Response {
    let status = match err {
        CrmError::InvalidPhone(_) => StatusCode::BAD_REQUEST,
        CrmError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::warn!(error = %err, "crm call failed");
    error_response(status, err.to_string())
}

async fn active_tenant(ctx: &ServiceContext, business_id: &str) -> Result<Tenant, Response> {
    match ctx.tenant(business_id).await {
        Ok(Some(tenant)) => Ok(tenant),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no active tenant for business id {business_id}"),
        )),
        Err(e) => Err(internal(&e)),
    }
}

// --- health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub storage: String,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let storage_ok = match state.ctx.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            false
        }
    };
    let body = HealthResponse {
        status: if storage_ok { "ok" } else { "degraded" }.to_string(),
        service: state.ctx.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        storage: if storage_ok { "ok" } else { "error" }.to_string(),
    };
    let status = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

// --- webhook ---

pub fn ingest_error_status(err: &IngestError) -> StatusCode {
    match err {
        IngestError::Payload(_) => StatusCode::BAD_REQUEST,
        IngestError::UnknownTenant(_) => StatusCode::NOT_FOUND,
        IngestError::Signature(_) => StatusCode::UNAUTHORIZED,
        IngestError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        IngestError::Crm(CrmError::Setup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        IngestError::Crm(_) => StatusCode::BAD_GATEWAY,
        IngestError::Storage(e) if e.is_transport() => StatusCode::BAD_GATEWAY,
        IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /webhooks/dialer
///
/// Takes the raw body so the signature is checked over the exact bytes sent.
pub async fn post_dialer_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let webhook = &state.ctx.config.webhook;
    let header_text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let incoming = WebhookHeaders {
        signature: header_text(&webhook.signature_header),
        timezone: header_text(&webhook.timezone_header),
    };

    match ingest(&state.ctx, &body, incoming).await {
        Ok(IngestOutcome::Processed(done)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "status": "ok",
                "contact_key": done.contact_key,
                "matched_by": done.matched_by,
                "created": done.created,
                "link_field": done.link_field,
                "attempts": done.attempts,
            })),
        )
            .into_response(),
        Ok(IngestOutcome::Duplicate) => {
            (StatusCode::OK, Json(json!({"ok": true, "duplicate": true}))).into_response()
        }
        Ok(IngestOutcome::Skipped { reason }) => (
            StatusCode::ACCEPTED,
            Json(json!({"ok": true, "status": "skipped", "reason": reason})),
        )
            .into_response(),
        Err(e) => {
            let status = ingest_error_status(&e);
            if status.is_server_error() {
                tracing::warn!(error = %e, status = status.as_u16(), "webhook failed");
            } else {
                tracing::debug!(error = %e, status = status.as_u16(), "webhook refused");
            }
            error_response(status, e.to_string())
        }
    }
}

// --- queue ---

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    #[serde(alias = "businessid", alias = "businessId")]
    pub business_id: String,
    #[serde(default)]
    pub campaign: Option<String>,
    pub items: Vec<SeedItem>,
}

/// POST /v1/queue/seed
pub async fn post_queue_seed(
    State(state): State<GatewayState>,
    Json(body): Json<SeedRequest>,
) -> Response {
    let tenant = match active_tenant(&state.ctx, &body.business_id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let country_code = state.ctx.crm.country_code();
    match seed(
        &state.ctx.db,
        tenant.id,
        body.campaign.as_deref(),
        country_code,
        &body.items,
    )
    .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => internal(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaseRequest {
    #[serde(alias = "businessid", alias = "businessId")]
    pub business_id: String,
    #[serde(default)]
    pub campaign: Option<String>,
    pub holder: String,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// POST /v1/queue/next
pub async fn post_queue_next(
    State(state): State<GatewayState>,
    Json(body): Json<LeaseRequest>,
) -> Response {
    let holder = body.holder.trim();
    if holder.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "holder must not be empty");
    }
    let tenant = match active_tenant(&state.ctx, &body.business_id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let limits = &state.ctx.config.queue;
    let ttl = body
        .ttl_secs
        .unwrap_or(limits.lease_ttl_secs)
        .clamp(1, limits.max_lease_ttl_secs.max(1));

    match queue::lease_next(
        &state.ctx.db,
        tenant.id,
        body.campaign.as_deref(),
        holder,
        Duration::from_secs(ttl),
    )
    .await
    {
        Ok(item) => (StatusCode::OK, Json(json!({"ok": true, "item": item}))).into_response(),
        Err(e) => internal(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub holder: String,
    pub outcome: String,
    #[serde(default)]
    pub result: Option<String>,
}

/// POST /v1/queue/{id}/release
pub async fn post_queue_release(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<ReleaseRequest>,
) -> Response {
    let outcome: ReleaseOutcome = match body.outcome.parse() {
        Ok(outcome) => outcome,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    match queue::release(
        &state.ctx.db,
        id,
        body.holder.trim(),
        outcome,
        body.result.as_deref(),
    )
    .await
    {
        Ok(item) => (StatusCode::OK, Json(json!({"ok": true, "item": item}))).into_response(),
        Err(e @ QueueError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ QueueError::NotHeld { .. }) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(QueueError::Storage(e)) => internal(&e),
    }
}

/// GET /v1/queue/{id}
pub async fn get_queue_item(State(state): State<GatewayState>, Path(id): Path<i64>) -> Response {
    match queue::get(&state.ctx.db, id).await {
        Ok(Some(item)) => (StatusCode::OK, Json(item)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("queue item {id} does not exist")),
        Err(e) => internal(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CountsQuery {
    #[serde(alias = "businessid", alias = "businessId")]
    pub business_id: String,
    #[serde(default)]
    pub campaign: Option<String>,
}

/// GET /v1/queue/counts
pub async fn get_queue_counts(
    State(state): State<GatewayState>,
    Query(query): Query<CountsQuery>,
) -> Response {
    let tenant = match active_tenant(&state.ctx, &query.business_id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    match queue::counts(&state.ctx.db, tenant.id, query.campaign.as_deref()).await {
        Ok(counts) => (StatusCode::OK, Json(counts)).into_response(),
        Err(e) => internal(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SyncBody {
    #[serde(alias = "businessid", alias = "businessId")]
    pub business_id: String,
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub max_rows: Option<usize>,
}

/// POST /v1/queue/sync
pub async fn post_queue_sync(
    State(state): State<GatewayState>,
    Json(body): Json<SyncBody>,
) -> Response {
    let tenant = match active_tenant(&state.ctx, &body.business_id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let request = SyncRequest {
        campaign: body.campaign,
        filter: body.filter,
        max_rows: body.max_rows,
    };
    match sync_tenant(&state.ctx, &tenant, &request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e @ SyncError::NoCredential(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(SyncError::Crm(e)) => crm_failure(&e),
        Err(SyncError::Storage(e)) => internal(&e),
    }
}

// --- contacts ---

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(alias = "businessid", alias = "businessId")]
    pub business_id: String,
    pub phone: String,
}

/// GET /v1/contacts/search
///
/// Lookup only; never creates a contact.
pub async fn get_contact_search(
    State(state): State<GatewayState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let country_code = state.ctx.crm.country_code();
    let normalized = PhoneNumber::parse(&query.phone, country_code)
        .map(|p| p.canonical())
        .unwrap_or_else(|_| digits_of(&query.phone));
    if digits_of(&normalized).len() < SEARCH_MIN_DIGITS {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "phone_too_short",
                "hint": "use a full international number, e.g. +18584581063",
                "normalized": normalized,
            })),
        )
            .into_response();
    }

    let tenant = match active_tenant(&state.ctx, &query.business_id).await {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let Some(credential) = ServiceContext::crm_credential(&tenant) else {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("tenant {} has no CRM credential", tenant.business_id),
        );
    };
    let session = ResolutionSession::new(&state.ctx.crm, &credential, &state.ctx.config.resolver);

    match resolve_or_create(&session, &query.phone, &ContactHints::default(), false).await {
        Ok(Resolution::Resolved(contact)) => (
            StatusCode::OK,
            Json(json!({"ok": true, "normalized": normalized, "contact": contact})),
        )
            .into_response(),
        Ok(Resolution::Unmatched { phone }) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no_contact_match", "normalized": phone})),
        )
            .into_response(),
        Err(e) => crm_failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_dialer::SignatureError;

    #[test]
    fn ingest_errors_map_to_definitive_statuses() {
        assert_eq!(
            ingest_error_status(&IngestError::Payload("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ingest_error_status(&IngestError::UnknownTenant("b".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ingest_error_status(&IngestError::Signature(SignatureError::Mismatch)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ingest_error_status(&IngestError::Crm(CrmError::HistoryRejected {
                attempts: Vec::new()
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ingest_error_status(&IngestError::Crm(CrmError::Transport {
                url: "u".into(),
                message: "reset".into()
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ingest_error_status(&IngestError::Storage(CallbridgeError::Internal("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ingest_error_status(&IngestError::TimedOut(300)),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
