// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery of the contact attributes that hold phone numbers.
//!
//! Candidates come from the contact definition endpoint when one exists,
//! otherwise from the keys of a single sampled record. Each candidate is
//! then checked against the collection: only names the CRM accepts in a
//! `$select` survive. An empty result is legitimate.

use callbridge_core::lookup::first_string;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{CrmClient, Credential, Family};
use crate::error::CrmError;
use crate::odata::{fetch_page, Cursor, PageQuery, CONTACT_COLLECTION};
use crate::probe::{ProbeRequest, Probed};

pub const DEFINITION_PATHS: &[&str] = &[
    "Contact/definition",
    "Contacts/definition",
    "definitions/Contact",
];

const NAME_KEYS: &[&str] = &["name", "Name", "fieldName", "FieldName"];
const WRAPPER_KEYS: &[&str] = &["fields", "Fields", "value", "properties"];
const PHONE_HINTS: &[&str] = &["phone", "mobile", "fax", "cell"];

pub fn looks_phone_like(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PHONE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Attribute names listed by a definition response.
pub fn definition_names(body: &Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(body, &mut names);
    dedupe(names)
}

fn collect_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    Value::Object(map) => {
                        if let Some(name) = first_string(map, NAME_KEYS) {
                            out.push(name);
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            if let Some(inner) = WRAPPER_KEYS.iter().find_map(|k| map.get(*k)) {
                collect_names(inner, out);
            } else {
                // a bare attribute map keyed by name
                out.extend(
                    map.keys()
                        .filter(|k| !k.starts_with('@') && !k.starts_with("odata."))
                        .cloned(),
                );
            }
        }
        _ => {}
    }
}

fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Discover and validate phone-bearing attributes.
pub async fn discover_phone_fields(
    client: &CrmClient,
    credential: &Credential,
) -> Result<Vec<String>, CrmError> {
    let mut candidates = definition_candidates(client, credential).await?;
    if candidates.is_empty() {
        candidates = sampled_candidates(client, credential).await?;
    }

    let mut accepted = Vec::with_capacity(candidates.len());
    for field in candidates {
        if field_accepted(client, credential, &field).await? {
            accepted.push(field);
        } else {
            debug!(field = %field, "phone field candidate rejected by collection");
        }
    }
    info!(fields = ?accepted, "phone fields discovered");
    Ok(accepted)
}

async fn definition_candidates(
    client: &CrmClient,
    credential: &Credential,
) -> Result<Vec<String>, CrmError> {
    let probed = client
        .probe(credential, &ProbeRequest::get(Family::Primary, DEFINITION_PATHS))
        .await?;
    let Some(response) = probed.success() else {
        if let Probed::Exhausted { attempted } = &probed {
            debug!(attempted = attempted.len(), "no contact definition endpoint");
        }
        return Ok(Vec::new());
    };
    Ok(definition_names(&response.body)
        .into_iter()
        .filter(|n| looks_phone_like(n))
        .collect())
}

async fn sampled_candidates(
    client: &CrmClient,
    credential: &Credential,
) -> Result<Vec<String>, CrmError> {
    let query = PageQuery {
        top: 1,
        ..PageQuery::default()
    };
    let Some(page) = fetch_page(client, credential, &query, &Cursor::default()).await? else {
        return Ok(Vec::new());
    };
    Ok(page
        .rows
        .first()
        .map(|row| row.keys().filter(|k| looks_phone_like(k)).cloned().collect())
        .unwrap_or_default())
}

/// Whether the collection accepts `$select=<field>`.
async fn field_accepted(
    client: &CrmClient,
    credential: &Credential,
    field: &str,
) -> Result<bool, CrmError> {
    let request = ProbeRequest::get(Family::Sibling, CONTACT_COLLECTION)
        .query("$select", field)
        .query("$top", "1");
    let probed = client.probe(credential, &request).await?;
    Ok(probed.success().is_some())
}
