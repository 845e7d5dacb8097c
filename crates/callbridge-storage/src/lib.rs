// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for callbridge.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection
//! via `tokio-rusqlite`. Holds tenants (credentials sealed with AES-256-GCM),
//! the lease queue, and the append-only event log behind the idempotency
//! guard.

pub mod crypto;
pub mod database;
pub mod guard;
pub mod migrations;
pub mod queries;

pub use crypto::CredentialKey;
pub use database::Database;
pub use guard::{Admission, ClaimTicket, Completion};
pub use queries::queue::{EnqueueOutcome, QueueCounts, QueueError, ReleaseOutcome};
