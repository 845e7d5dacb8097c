// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive CRM resolution engine.
//!
//! Tenants run differently configured instances of the same CRM: routes
//! live under different base URLs and path spellings, phone numbers sit in
//! different attributes, and history entries link to contacts through
//! different fields. Nothing here assumes a fixed schema. Routes are probed,
//! attributes are discovered, and accepted link fields are remembered.

pub mod client;
pub mod error;
pub mod fields;
pub mod history;
pub mod matcher;
pub mod odata;
pub mod phone;
pub mod probe;
pub mod resolver;
pub mod session;

pub use client::{BaseSet, CrmClient, CrmResponse, Credential, Family};
pub use error::CrmError;
pub use history::{HistoryAttempt, HistoryTarget, HistoryWrite, HistoryWriter};
pub use matcher::{find_by_phone, ContactSource, PhoneMatch};
pub use phone::{PhoneError, PhoneNumber};
pub use probe::{AttemptOutcome, ProbeRequest, Probed};
pub use resolver::{resolve_or_create, ContactHints, ContactReference, Resolution};
pub use session::ResolutionSession;
