// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for callbridge.
//!
//! Receives dialer webhooks (HMAC-verified per tenant) and exposes the
//! bearer-protected operator API for queue seeding, leasing, sync, and
//! contact lookup.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState};
