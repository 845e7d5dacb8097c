// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for callbridge.
//!
//! Holds the shared error type, the domain records passed between the
//! storage, CRM, and dialer crates, and the ordered-key lookup helpers used
//! to read loosely shaped remote responses.

pub mod error;
pub mod lookup;
pub mod types;

pub use error::CallbridgeError;
pub use types::{
    AgentMapping, DispositionMapping, EventLogEntry, EventStatus, NewQueueItem, NewTenant, QueueItem,
    QueueStatus, Tenant,
};
