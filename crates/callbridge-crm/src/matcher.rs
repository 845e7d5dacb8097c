// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Three-tier phone matching.
//!
//! 1. Exact search endpoint, trusted only on a 2xx.
//! 2. Attribute filter over the discovered phone fields, dropping fields the
//!    CRM rejects and retrying with the rest.
//! 3. Bounded page scan comparing digits locally.
//!
//! The first tier to produce a record wins.

use callbridge_core::lookup::{rows, scalar_text};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::client::{CrmResponse, Family};
use crate::error::CrmError;
use crate::fields::looks_phone_like;
use crate::odata::{fetch_page, Cursor, PageQuery, CONTACT_COLLECTION};
use crate::phone::{digits_match, PhoneNumber};
use crate::probe::{ProbeRequest, Probed};
use crate::session::ResolutionSession;

pub const SEARCH_PATHS: &[&str] = &["Contact/search", "Contacts/search"];

/// How a contact was found, or that it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    ExactSearch,
    AttributeFilter,
    PageScan,
    Created,
    /// Key remembered from an earlier event for the same number.
    Cached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhoneMatch {
    pub record: Map<String, Value>,
    pub source: ContactSource,
    /// Attribute whose value matched, when known.
    pub field: Option<String>,
}

pub async fn find_by_phone(
    session: &ResolutionSession<'_>,
    phone: &PhoneNumber,
) -> Result<Option<PhoneMatch>, CrmError> {
    if let Some(found) = exact_search(session, phone).await? {
        return Ok(Some(found));
    }
    if let Some(found) = attribute_filter(session, phone).await? {
        return Ok(Some(found));
    }
    page_scan(session, phone).await
}

async fn exact_search(
    session: &ResolutionSession<'_>,
    phone: &PhoneNumber,
) -> Result<Option<PhoneMatch>, CrmError> {
    let request = ProbeRequest::post(
        Family::Primary,
        SEARCH_PATHS,
        json!({ "phone": phone.canonical() }),
    );
    let probed = session.client().probe(session.credential(), &request).await?;
    match &probed {
        Probed::Routed { response, .. } if response.is_success() => {
            let found = rows(&response.body).first().map(|record| PhoneMatch {
                record: (*record).clone(),
                source: ContactSource::ExactSearch,
                field: None,
            });
            if found.is_some() {
                info!(phone = %phone, "matched by exact search");
            }
            Ok(found)
        }
        Probed::Routed { url, response } => {
            debug!(url = %url, status = response.status, "exact search refused");
            Ok(None)
        }
        Probed::Exhausted { .. } => Ok(None),
    }
}

fn contains_filter(fields: &[String], needle: &str) -> String {
    fields
        .iter()
        .map(|f| format!("contains({f},'{needle}')"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Whether `text` mentions `word` as a whole identifier.
fn mentions(text: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(word).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Fields a 4xx body names as the problem.
fn rejected_by_body(response: &CrmResponse, fields: &[String]) -> Vec<String> {
    let text = response.excerpt();
    fields.iter().filter(|f| mentions(&text, f)).cloned().collect()
}

async fn filter_request(
    session: &ResolutionSession<'_>,
    fields: &[String],
    needle: &str,
) -> Result<Probed, CrmError> {
    let request = ProbeRequest::get(Family::Sibling, CONTACT_COLLECTION)
        .query("$filter", contains_filter(fields, needle))
        .query("$top", session.settings().filter_top.to_string());
    session.client().probe(session.credential(), &request).await
}

fn first_match(response: &CrmResponse, fields: &[String], phone: &PhoneNumber) -> Option<PhoneMatch> {
    rows(&response.body).first().map(|record| PhoneMatch {
        record: (*record).clone(),
        source: ContactSource::AttributeFilter,
        field: matching_field(record, fields, phone),
    })
}

async fn attribute_filter(
    session: &ResolutionSession<'_>,
    phone: &PhoneNumber,
) -> Result<Option<PhoneMatch>, CrmError> {
    let mut fields = session.phone_fields().await?.to_vec();
    let needle = phone.last10();

    while !fields.is_empty() {
        let response = match filter_request(session, &fields, needle).await? {
            Probed::Routed { response, .. } => response,
            Probed::Exhausted { .. } => return Ok(None),
        };
        if response.is_success() {
            let found = first_match(&response, &fields, phone);
            if found.is_some() {
                info!(phone = %phone, "matched by attribute filter");
            }
            return Ok(found);
        }
        if !response.is_client_error() {
            debug!(status = response.status, "attribute filter failed");
            return Ok(None);
        }

        let mut rejected = rejected_by_body(&response, &fields);
        if rejected.is_empty() {
            // body does not say which; test each field alone
            for field in &fields {
                let single = std::slice::from_ref(field);
                match filter_request(session, single, needle).await? {
                    Probed::Routed { response, .. } if response.is_success() => {
                        if let Some(found) = first_match(&response, single, phone) {
                            info!(phone = %phone, field = %field, "matched by attribute filter");
                            return Ok(Some(found));
                        }
                    }
                    Probed::Routed { response, .. } if response.is_client_error() => {
                        rejected.push(field.clone());
                    }
                    _ => {}
                }
            }
            if rejected.is_empty() {
                return Ok(None);
            }
        }
        debug!(rejected = ?rejected, "dropping fields refused by filter");
        fields.retain(|f| !rejected.contains(f));
    }
    Ok(None)
}

/// The attribute in `record` whose digits match `phone`.
fn matching_field(record: &Map<String, Value>, fields: &[String], phone: &PhoneNumber) -> Option<String> {
    let matches = |key: &String| {
        record
            .get(key)
            .and_then(scalar_text)
            .is_some_and(|v| digits_match(phone, &v))
    };
    if fields.is_empty() {
        record
            .keys()
            .filter(|k| looks_phone_like(k))
            .find(|k| matches(k))
            .cloned()
    } else {
        fields.iter().find(|k| matches(k)).cloned()
    }
}

async fn page_scan(
    session: &ResolutionSession<'_>,
    phone: &PhoneNumber,
) -> Result<Option<PhoneMatch>, CrmError> {
    let fields = session.phone_fields().await?;
    let settings = session.settings();
    let query = PageQuery {
        top: settings.scan_page_size,
        ..PageQuery::default()
    };

    let mut cursor = Cursor::default();
    for page_no in 0..settings.scan_max_pages {
        let Some(page) = fetch_page(session.client(), session.credential(), &query, &cursor).await? else {
            break;
        };
        for record in &page.rows {
            if let Some(field) = matching_field(record, fields, phone) {
                info!(phone = %phone, page = page_no, field = %field, "matched by page scan");
                return Ok(Some(PhoneMatch {
                    record: record.clone(),
                    source: ContactSource::PageScan,
                    field: Some(field),
                }));
            }
        }
        match page.next {
            Some(next) => cursor = next,
            None => break,
        }
    }
    debug!(phone = %phone, "page scan found nothing");
    Ok(None)
}
