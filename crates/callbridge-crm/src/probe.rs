// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Endpoint probing across base URLs and path spellings.
//!
//! A logical operation names several candidate paths. Candidates are tried
//! base-major in family preference order; the first response that is not a
//! 404 decides the route. A transport failure aborts the probe so an outage
//! is never mistaken for "no such route".

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::{BaseSet, CrmClient, CrmResponse, Credential, Family};
use crate::error::CrmError;

/// How a single candidate answered.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(CrmResponse),
    /// Route exists but refused the request shape (any non-2xx, non-404).
    ShapeRejected(CrmResponse),
    NotFound,
    Transport(String),
}

impl AttemptOutcome {
    pub fn classify(response: CrmResponse) -> Self {
        match response.status {
            404 => Self::NotFound,
            _ if response.is_success() => Self::Success(response),
            _ => Self::ShapeRejected(response),
        }
    }
}

/// Result of probing: the route that answered, or every URL that 404'd.
#[derive(Debug, Clone, PartialEq)]
pub enum Probed {
    Routed { url: String, response: CrmResponse },
    Exhausted { attempted: Vec<String> },
}

impl Probed {
    /// The response when the route answered 2xx.
    pub fn success(&self) -> Option<&CrmResponse> {
        match self {
            Self::Routed { response, .. } if response.is_success() => Some(response),
            _ => None,
        }
    }
}

/// Decide the probe result from an ordered attempt trail.
///
/// Pure over its input: the same trail always selects the same route.
pub fn select(attempts: Vec<(String, AttemptOutcome)>) -> Result<Probed, CrmError> {
    let mut attempted = Vec::with_capacity(attempts.len());
    for (url, outcome) in attempts {
        match outcome {
            AttemptOutcome::NotFound => attempted.push(url),
            AttemptOutcome::Success(response) | AttemptOutcome::ShapeRejected(response) => {
                return Ok(Probed::Routed { url, response });
            }
            AttemptOutcome::Transport(message) => {
                return Err(CrmError::Transport { url, message });
            }
        }
    }
    Ok(Probed::Exhausted { attempted })
}

/// One logical CRM operation to probe.
#[derive(Debug, Clone)]
pub struct ProbeRequest<'a> {
    pub method: Method,
    pub family: Family,
    pub paths: &'a [&'a str],
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl<'a> ProbeRequest<'a> {
    pub fn get(family: Family, paths: &'a [&'a str]) -> Self {
        Self {
            method: Method::GET,
            family,
            paths,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(family: Family, paths: &'a [&'a str], body: Value) -> Self {
        Self {
            method: Method::POST,
            family,
            paths,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Candidate URLs in the order they are tried.
    pub fn candidates(&self, bases: &BaseSet) -> Vec<String> {
        bases
            .ordered(self.family)
            .into_iter()
            .flat_map(|base| {
                self.paths
                    .iter()
                    .map(move |p| format!("{base}/{}", p.trim_start_matches('/')))
            })
            .collect()
    }
}

impl CrmClient {
    /// Try candidates in order until one answers with something other than 404.
    pub async fn probe(
        &self,
        credential: &Credential,
        request: &ProbeRequest<'_>,
    ) -> Result<Probed, CrmError> {
        let mut attempts = Vec::new();
        for url in request.candidates(self.bases()) {
            let outcome = match self
                .send(
                    credential,
                    request.method.clone(),
                    &url,
                    &request.query,
                    request.body.as_ref(),
                )
                .await
            {
                Ok(response) => AttemptOutcome::classify(response),
                Err(CrmError::Transport { message, .. }) => AttemptOutcome::Transport(message),
                Err(e) => return Err(e),
            };
            let decisive = !matches!(outcome, AttemptOutcome::NotFound);
            if !decisive {
                debug!(url = %url, "candidate not found, trying next");
            }
            attempts.push((url, outcome));
            if decisive {
                break;
            }
        }
        select(attempts)
    }
}
