// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for callbridge.

use thiserror::Error;

/// The primary error type shared across callbridge crates.
#[derive(Debug, Error)]
pub enum CallbridgeError {
    /// Configuration errors (invalid TOML, missing keys, unusable values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migrations).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The CRM answered, but not in a way any fallback could absorb.
    #[error("crm error: {message}")]
    Crm {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connect failure, reset, or timeout talking to a remote system.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inbound webhook signature missing or wrong.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Inbound payload could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A uniqueness rule would be broken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CallbridgeError {
    /// Wrap any storage-layer error.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage { source: err.into() }
    }

    /// Whether the failure came from the network rather than from a decision.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
