// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::time::Instant;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use callbridge_core::CallbridgeError;
use callbridge_dialer::ServiceContext;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub ctx: ServiceContext,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            start_time: Instant::now(),
        }
    }
}

/// Build the full router.
///
/// - GET /health, POST /webhooks/dialer: no bearer (webhooks are HMAC-checked
///   per tenant)
/// - /v1/*: bearer token required
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = AuthConfig {
        bearer_token: state.ctx.config.server.bearer_token.clone(),
    };

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/webhooks/dialer", post(handlers::post_dialer_webhook))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/queue/seed", post(handlers::post_queue_seed))
        .route("/v1/queue/next", post(handlers::post_queue_next))
        .route("/v1/queue/sync", post(handlers::post_queue_sync))
        .route("/v1/queue/counts", get(handlers::get_queue_counts))
        .route("/v1/queue/{id}", get(handlers::get_queue_item))
        .route("/v1/queue/{id}/release", post(handlers::post_queue_release))
        .route("/v1/contacts/search", get(handlers::get_contact_search))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind to `server.host:server.port` and serve until `shutdown` fires.
/// In-flight requests are allowed to finish.
pub async fn start_server(
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), CallbridgeError> {
    let addr = format!(
        "{}:{}",
        state.ctx.config.server.host, state.ctx.config.server.port
    );
    if state.ctx.config.server.bearer_token.is_none() {
        tracing::warn!("server.bearer_token is unset; the /v1 API will reject every request");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CallbridgeError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| CallbridgeError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}
