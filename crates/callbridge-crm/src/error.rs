// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors surfaced by the resolution engine.
//!
//! Not-found and shape-rejected responses never appear here: they are
//! absorbed by candidate and tier fallbacks. What remains is what a caller
//! must act on.

use callbridge_core::CallbridgeError;
use thiserror::Error;

use crate::history::HistoryAttempt;
use crate::phone::PhoneError;

#[derive(Debug, Error)]
pub enum CrmError {
    /// Connect failure, reset, or timeout. Aborts the current operation.
    #[error("transport failure calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error(transparent)]
    InvalidPhone(#[from] PhoneError),

    /// A record matched but none of the known key attributes is present.
    #[error("matched contact record carries no recognizable key")]
    MissingKey,

    #[error("contact creation rejected with status {status}: {detail}")]
    CreateRejected { status: u16, detail: String },

    /// Every candidate link field was rejected.
    #[error("history rejected for every link field: {}", summarize(.attempts))]
    HistoryRejected { attempts: Vec<HistoryAttempt> },

    #[error("crm client setup failed: {0}")]
    Setup(String),
}

fn summarize(attempts: &[HistoryAttempt]) -> String {
    attempts
        .iter()
        .map(|a| match a.status {
            Some(status) => format!("{} ({status}: {})", a.link_field, a.reason),
            None => format!("{} ({})", a.link_field, a.reason),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<CrmError> for CallbridgeError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Transport { .. } => CallbridgeError::Transport {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
            CrmError::InvalidPhone(_) => CallbridgeError::InvalidPayload(err.to_string()),
            CrmError::Setup(msg) => CallbridgeError::Config(msg),
            other => CallbridgeError::Crm {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_rejection_lists_every_attempt() {
        let err = CrmError::HistoryRejected {
            attempts: vec![
                HistoryAttempt {
                    link_field: "contactKey".into(),
                    url: Some("https://crm/history".into()),
                    status: Some(400),
                    accepted: false,
                    reason: "unknown field".into(),
                },
                HistoryAttempt {
                    link_field: "partyKey".into(),
                    url: None,
                    status: None,
                    accepted: false,
                    reason: "no history endpoint".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("contactKey (400: unknown field)"));
        assert!(text.contains("partyKey (no history endpoint)"));
    }

    #[test]
    fn transport_maps_to_transport() {
        let err: CallbridgeError = CrmError::Transport {
            url: "https://crm/x".into(),
            message: "connection reset".into(),
        }
        .into();
        assert!(err.is_transport());
    }
}
