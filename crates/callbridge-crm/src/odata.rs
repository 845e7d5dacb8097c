// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paged reads of the contact collection.

use callbridge_core::lookup::rows;
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{CrmClient, Credential, Family};
use crate::error::CrmError;
use crate::probe::{ProbeRequest, Probed};

/// Spellings of the contact collection, tried in order.
pub const CONTACT_COLLECTION: &[&str] = &["Contacts", "Contact"];

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Skip(u64),
    /// Opaque continuation from the server's next link.
    Token(String),
}

impl Default for Cursor {
    fn default() -> Self {
        Self::Skip(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageQuery {
    pub filter: Option<String>,
    pub select: Option<String>,
    pub top: u32,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<Map<String, Value>>,
    pub next: Option<Cursor>,
}

/// Fetch one page. `None` when no collection route answers 2xx.
pub async fn fetch_page(
    client: &CrmClient,
    credential: &Credential,
    query: &PageQuery,
    cursor: &Cursor,
) -> Result<Option<Page>, CrmError> {
    let mut request =
        ProbeRequest::get(Family::Sibling, CONTACT_COLLECTION).query("$top", query.top.to_string());
    if let Some(filter) = &query.filter {
        request = request.query("$filter", filter.clone());
    }
    if let Some(select) = &query.select {
        request = request.query("$select", select.clone());
    }
    request = match cursor {
        Cursor::Skip(0) => request,
        Cursor::Skip(n) => request.query("$skip", n.to_string()),
        Cursor::Token(token) => request.query("$skiptoken", token.clone()),
    };

    let probed = client.probe(credential, &request).await?;
    let Some(response) = probed.success() else {
        if let Probed::Routed { url, response } = &probed {
            debug!(url = %url, status = response.status, "page request rejected");
        }
        return Ok(None);
    };

    let page_rows: Vec<Map<String, Value>> = rows(&response.body).into_iter().cloned().collect();
    let next = match next_link_cursor(&response.body) {
        Some(next) => Some(next),
        None => match cursor {
            Cursor::Skip(n) if query.top > 0 && page_rows.len() as u64 >= u64::from(query.top) => {
                Some(Cursor::Skip(n + u64::from(query.top)))
            }
            _ => None,
        },
    };
    Ok(Some(Page {
        rows: page_rows,
        next,
    }))
}

/// Continuation carried in an `@odata.nextLink`, if any.
pub fn next_link_cursor(body: &Value) -> Option<Cursor> {
    let link = ["@odata.nextLink", "odata.nextLink", "nextLink"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))?;
    // relative links resolve against a placeholder so query parsing still works
    let url = Url::parse("http://next.invalid/").ok()?.join(link).ok()?;
    let mut skip = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "$skiptoken" | "skiptoken" => return Some(Cursor::Token(value.into_owned())),
            "$skip" | "skip" => skip = value.parse().ok().map(Cursor::Skip),
            _ => {}
        }
    }
    skip
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_config::model::CrmConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn skiptoken_is_read_from_absolute_and_relative_links() {
        let absolute = json!({"@odata.nextLink": "https://crm/CrmOData/Contacts?$top=2&%24skiptoken=abc%3D"});
        assert_eq!(next_link_cursor(&absolute), Some(Cursor::Token("abc=".into())));

        let relative = json!({"odata.nextLink": "Contacts?$skip=40"});
        assert_eq!(next_link_cursor(&relative), Some(Cursor::Skip(40)));

        assert_eq!(next_link_cursor(&json!({"value": []})), None);
    }

    #[tokio::test]
    async fn full_page_advances_by_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CrmOData/Contacts"))
            .and(query_param("$top", "2"))
            .and(query_param("$skip", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": [{"Key": "c"}, {"Key": "d"}]})),
            )
            .mount(&server)
            .await;

        let client = CrmClient::new(&CrmConfig {
            base_url: format!("{}/Crm", server.uri()),
            ..CrmConfig::default()
        })
        .unwrap();
        let page = fetch_page(
            &client,
            &Credential::new("t"),
            &PageQuery {
                top: 2,
                ..PageQuery::default()
            },
            &Cursor::Skip(2),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.next, Some(Cursor::Skip(4)));
    }

    #[tokio::test]
    async fn rejected_collection_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = CrmClient::new(&CrmConfig {
            base_url: format!("{}/Crm", server.uri()),
            ..CrmConfig::default()
        })
        .unwrap();
        let page = fetch_page(
            &client,
            &Credential::new("t"),
            &PageQuery {
                top: 1,
                ..PageQuery::default()
            },
            &Cursor::default(),
        )
        .await
        .unwrap();
        assert!(page.is_none());
    }
}
