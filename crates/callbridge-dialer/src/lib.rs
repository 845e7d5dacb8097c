// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialer-side pipelines for callbridge.
//!
//! Parses inbound dialer events, runs them through the idempotent ingest
//! pipeline into CRM history, and fills the lease queue from seed requests
//! or bulk CRM sync.

pub mod context;
pub mod event;
pub mod history;
pub mod ingest;
pub mod seed;
pub mod signature;
pub mod sync;

pub use context::ServiceContext;
pub use event::{DialerEvent, Direction, EventError};
pub use ingest::{ingest, IngestError, IngestOutcome, ProcessedEvent, WebhookHeaders};
pub use seed::{seed, SeedItem, SeedReport, SeedSkip};
pub use signature::SignatureError;
pub use sync::{sync_tenant, SyncError, SyncReport, SyncRequest};
