// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `callbridge serve` and shared startup helpers.

use std::sync::Arc;

use callbridge_config::CallbridgeConfig;
use callbridge_core::CallbridgeError;
use callbridge_dialer::ServiceContext;
use callbridge_gateway::GatewayState;
use callbridge_storage::Database;
use tracing::info;

use crate::shutdown;

/// Open the configured database and build the shared service context.
pub async fn open_context(config: CallbridgeConfig) -> Result<ServiceContext, CallbridgeError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    ServiceContext::new(Arc::new(config), db)
}

/// Run the HTTP gateway until SIGINT/SIGTERM, then checkpoint and close
/// the database.
pub async fn run_serve(config: CallbridgeConfig) -> Result<(), CallbridgeError> {
    info!(
        service = %config.service.name,
        database = %config.storage.database_path,
        crm = %config.crm.base_url,
        "starting callbridge"
    );
    let ctx = open_context(config).await?;
    let db = ctx.db.clone();
    let cancel = shutdown::install_signal_handler();

    let served = callbridge_gateway::start_server(GatewayState::new(ctx), cancel).await;
    db.close().await?;
    served?;

    info!("callbridge serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callbridge={log_level},callbridge_core={log_level},callbridge_config={log_level},\
             callbridge_storage={log_level},callbridge_crm={log_level},\
             callbridge_dialer={log_level},callbridge_gateway={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
