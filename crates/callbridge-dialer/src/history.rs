// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRM history entries composed from dialer events.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use callbridge_core::{AgentMapping, DispositionMapping, Tenant};

use crate::event::DialerEvent;

/// Marks entries written by this service in the CRM's `user1` column.
const SOURCE_TAG: &str = "Dialer";

fn utc_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn subject(event: &DialerEvent) -> String {
    format!(
        "Call {} - {}",
        event.direction,
        event.disposition.as_deref().unwrap_or("Unknown")
    )
}

pub fn notes(event: &DialerEvent) -> String {
    let mut lines = vec![
        format!(
            "{SOURCE_TAG} {} - {}s",
            event.kind,
            event.duration_secs.unwrap_or(0)
        ),
        format!(
            "From: {} -> To: {}",
            event.from_number.as_deref().unwrap_or(""),
            event.to_number.as_deref().unwrap_or("")
        ),
        format!("Agent: {}", event.agent.as_deref().unwrap_or("")),
    ];
    if let Some(url) = &event.recording_url {
        lines.push(format!("Recording: {url}"));
    }
    if let Some(id) = &event.call_id {
        lines.push(format!("Call ID: {id}"));
    }
    if let Some(notes) = &event.notes {
        lines.push(format!("Notes: {notes}"));
    }
    lines.join("\n")
}

/// Per-event lookups that win over the tenant defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides<'a> {
    pub disposition: Option<&'a DispositionMapping>,
    pub agent: Option<&'a AgentMapping>,
}

/// History fields for `event`, without the link field.
///
/// Disposition mapping keys win over the tenant's history keys; the agent
/// mapping wins over the tenant's user key, and over its team key when the
/// mapping names a team.
pub fn compose(
    event: &DialerEvent,
    tenant: &Tenant,
    overrides: Overrides<'_>,
    now: DateTime<Utc>,
) -> Map<String, Value> {
    let (start, end) = event.window(now);
    let mapping = overrides.disposition;
    let event_type_key = mapping
        .and_then(|m| m.event_type_key)
        .unwrap_or(tenant.event_type_key);
    let status_key = mapping
        .and_then(|m| m.status_key)
        .unwrap_or(tenant.status_key);

    let mut fields = Map::new();
    let mut put = |key: &str, value: Value| {
        fields.insert(key.to_string(), value);
    };
    put("published", json!(true));
    put("timeless", json!(false));
    put("startDate", json!(utc_millis(start)));
    put("endDate", json!(utc_millis(end)));
    put("eventTypeKey", json!(event_type_key));
    put("statusKey", json!(status_key));
    put("subject", json!(subject(event)));
    put("notes", json!(notes(event)));
    put("user1", json!(SOURCE_TAG));
    put("user2", json!(event.kind));
    put("user3", json!(event.disposition.as_deref().unwrap_or("")));
    put("user4", json!(event.direction.to_string()));
    put("logical1", json!(true));
    let user_key = overrides
        .agent
        .map(|a| &a.user_key)
        .or(tenant.crm_user_key.as_ref());
    let team_key = overrides
        .agent
        .and_then(|a| a.team_key.as_ref())
        .or(tenant.crm_team_key.as_ref());
    if let Some(user_key) = user_key {
        fields.insert("userKey".into(), Value::String(user_key.clone()));
    }
    if let Some(team_key) = team_key {
        fields.insert("teamKey".into(), Value::String(team_key.clone()));
    }
    fields
}
