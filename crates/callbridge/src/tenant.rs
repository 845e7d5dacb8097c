// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `callbridge tenant` subcommands.

use std::io::IsTerminal;

use callbridge_core::{AgentMapping, CallbridgeError, DispositionMapping, NewTenant, Tenant};
use callbridge_dialer::ServiceContext;
use callbridge_storage::queries::tenants;

/// Register a tenant and print its id.
pub async fn add(ctx: &ServiceContext, tenant: NewTenant) -> Result<Tenant, CallbridgeError> {
    if tenant.business_id.trim().is_empty() {
        return Err(CallbridgeError::InvalidPayload(
            "business id must not be empty".to_string(),
        ));
    }
    let created = tenants::insert(&ctx.db, &ctx.key, &tenant).await?;
    tracing::info!(id = created.id, business_id = %created.business_id, "tenant registered");
    Ok(created)
}

pub async fn list(ctx: &ServiceContext, plain: bool) -> Result<(), CallbridgeError> {
    let all = tenants::list(&ctx.db, &ctx.key).await?;
    if all.is_empty() {
        println!("no tenants registered");
        return Ok(());
    }
    let use_color = !plain && std::io::stdout().is_terminal();
    for tenant in &all {
        println!("{}", describe(tenant, use_color));
    }
    Ok(())
}

fn describe(tenant: &Tenant, use_color: bool) -> String {
    let state = if tenant.active { "active" } else { "inactive" };
    let state = if use_color {
        use colored::Colorize;
        if tenant.active {
            state.green().to_string()
        } else {
            state.dimmed().to_string()
        }
    } else {
        state.to_string()
    };
    let flag = |present: bool| if present { "yes" } else { "no" };
    format!(
        "{:>4}  {:<20} {:<24} {:<8} crm_token={} webhook_secret={} link_field={}",
        tenant.id,
        tenant.business_id,
        tenant.name,
        state,
        flag(tenant.crm_token.is_some()),
        flag(tenant.webhook_secret.is_some()),
        tenant.link_field.as_deref().unwrap_or("-"),
    )
}

pub async fn deactivate(ctx: &ServiceContext, id: i64) -> Result<(), CallbridgeError> {
    if tenants::deactivate(&ctx.db, id).await? {
        println!("tenant {id} deactivated");
        Ok(())
    } else {
        Err(CallbridgeError::NotFound(format!("active tenant {id}")))
    }
}

/// Map a disposition label to history keys for the tenant owning
/// `business_id`.
pub async fn set_disposition(
    ctx: &ServiceContext,
    business_id: &str,
    label: &str,
    status_key: Option<i64>,
    event_type_key: Option<i64>,
) -> Result<(), CallbridgeError> {
    let tenant = ctx
        .tenant(business_id)
        .await?
        .ok_or_else(|| CallbridgeError::NotFound(format!("active tenant `{business_id}`")))?;
    tenants::set_disposition(
        &ctx.db,
        &DispositionMapping {
            tenant_id: tenant.id,
            disposition: label.to_string(),
            status_key,
            event_type_key,
        },
    )
    .await?;
    println!("disposition `{label}` mapped for tenant {}", tenant.id);
    Ok(())
}

/// Send history for calls by `email` to a CRM user, and optionally a team.
pub async fn set_agent(
    ctx: &ServiceContext,
    business_id: &str,
    email: &str,
    user_key: &str,
    team_key: Option<String>,
) -> Result<(), CallbridgeError> {
    let email = email.trim();
    if email.is_empty() || user_key.trim().is_empty() {
        return Err(CallbridgeError::InvalidPayload(
            "agent email and user key must not be empty".to_string(),
        ));
    }
    let tenant = ctx
        .tenant(business_id)
        .await?
        .ok_or_else(|| CallbridgeError::NotFound(format!("active tenant `{business_id}`")))?;
    tenants::set_agent(
        &ctx.db,
        &AgentMapping {
            tenant_id: tenant.id,
            agent_email: email.to_string(),
            user_key: user_key.trim().to_string(),
            team_key,
        },
    )
    .await?;
    println!("agent `{email}` mapped for tenant {}", tenant.id);
    Ok(())
}
