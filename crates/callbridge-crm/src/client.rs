// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the CRM.
//!
//! One [`CrmClient`] is shared by every tenant; the tenant's bearer token
//! travels per request as a [`Credential`].

use std::time::Duration;

use callbridge_config::model::CrmConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::CrmError;

/// Longest body excerpt kept in error details and attempt trails.
const EXCERPT_LEN: usize = 300;

/// A tenant's CRM bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([redacted])")
    }
}

/// Which API family an operation tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Primary,
    /// Query-style families reached by suffixing the primary base.
    Sibling,
}

/// The primary base URL plus its sibling bases, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseSet {
    primary: String,
    siblings: Vec<String>,
}

impl BaseSet {
    pub fn new(primary: &str, sibling_suffixes: &[String]) -> Self {
        let primary = primary.trim().trim_end_matches('/').to_string();
        let siblings = sibling_suffixes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| format!("{primary}{s}"))
            .collect();
        Self { primary, siblings }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Every base, preferred family first.
    pub fn ordered(&self, prefer: Family) -> Vec<&str> {
        let siblings = self.siblings.iter().map(String::as_str);
        match prefer {
            Family::Primary => std::iter::once(self.primary.as_str())
                .chain(siblings)
                .collect(),
            Family::Sibling => siblings
                .chain(std::iter::once(self.primary.as_str()))
                .collect(),
        }
    }
}

/// A CRM answer: status plus body parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmResponse {
    pub status: u16,
    /// `Null` for an empty body; a JSON string for non-JSON text.
    pub body: Value,
}

impl CrmResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Short text form of the body for logs and error details.
    pub fn excerpt(&self) -> String {
        let text = match &self.body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if text.len() <= EXCERPT_LEN {
            return text;
        }
        let mut end = EXCERPT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// Shared HTTP client for CRM calls.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    bases: BaseSet,
    country_code: String,
}

impl CrmClient {
    /// Build a client with the configured timeout and base URLs.
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrmError::Setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            bases: BaseSet::new(&config.base_url, &config.sibling_suffixes),
            country_code: config.default_country_code.clone(),
        })
    }

    pub fn bases(&self) -> &BaseSet {
        &self.bases
    }

    /// Country code applied to 10-digit numbers.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Issue one request. Only transport failures are errors; every HTTP
    /// status comes back as a [`CrmResponse`].
    pub async fn send(
        &self,
        credential: &Credential,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<CrmResponse, CrmError> {
        let parsed = if query.is_empty() {
            Url::parse(url)
        } else {
            Url::parse_with_params(url, query.iter())
        }
        .map_err(|e| CrmError::Setup(format!("invalid CRM url `{url}`: {e}")))?;

        let mut request = self
            .http
            .request(method.clone(), parsed)
            .bearer_auth(credential.token());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| CrmError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| CrmError::Transport {
            url: url.to_string(),
            message: format!("failed reading body: {e}"),
        })?;
        debug!(%method, url, status, "crm response");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(CrmResponse { status, body })
    }
}
