// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands: `callbridge sync` and `callbridge probe`.

use serde_json::{json, Value};

use callbridge_core::{CallbridgeError, Tenant};
use callbridge_crm::{Family, ProbeRequest, Probed};
use callbridge_dialer::{sync_tenant, ServiceContext, SyncError, SyncRequest};

async fn require_tenant(ctx: &ServiceContext, business_id: &str) -> Result<Tenant, CallbridgeError> {
    ctx.tenant(business_id)
        .await?
        .ok_or_else(|| CallbridgeError::NotFound(format!("active tenant `{business_id}`")))
}

pub async fn run_sync(
    ctx: &ServiceContext,
    business_id: &str,
    request: SyncRequest,
) -> Result<Value, CallbridgeError> {
    let tenant = require_tenant(ctx, business_id).await?;
    let report = sync_tenant(ctx, &tenant, &request)
        .await
        .map_err(|e| match e {
            SyncError::NoCredential(_) => CallbridgeError::Config(e.to_string()),
            SyncError::Crm(e) => e.into(),
            SyncError::Storage(e) => e,
        })?;
    Ok(json!(report))
}

/// Send one request through the endpoint prober and describe every
/// candidate's fate. Used to see how a tenant's CRM is laid out.
pub async fn run_probe(
    ctx: &ServiceContext,
    business_id: &str,
    paths: &[String],
    post_body: Option<Value>,
    family: Family,
) -> Result<Value, CallbridgeError> {
    let tenant = require_tenant(ctx, business_id).await?;
    let credential = ServiceContext::crm_credential(&tenant).ok_or_else(|| {
        CallbridgeError::Config(format!("tenant `{business_id}` has no CRM credential"))
    })?;
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    let request = match post_body {
        Some(body) => ProbeRequest::post(family, &paths, body),
        None => ProbeRequest::get(family, &paths),
    };
    let candidates = request.candidates(ctx.crm.bases());
    let probed = ctx.crm.probe(&credential, &request).await?;

    Ok(match probed {
        Probed::Routed { url, response } => json!({
            "routed": true,
            "url": url,
            "status": response.status,
            "success": response.is_success(),
            "body": response.body,
            "candidates": candidates,
        }),
        Probed::Exhausted { attempted } => json!({
            "routed": false,
            "attempted": attempted,
        }),
    })
}
