// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! callbridge - dialer-to-CRM call history sync service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod jobs;
mod serve;
mod shutdown;
mod tenant;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use callbridge_config::CallbridgeConfig;
use callbridge_core::{CallbridgeError, NewTenant};
use callbridge_crm::Family;
use callbridge_dialer::SyncRequest;
use callbridge_storage::CredentialKey;

/// callbridge - sync dialer call events into CRM history.
#[derive(Parser, Debug)]
#[command(name = "callbridge", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway (webhooks and operator API).
    Serve,
    /// Page through a tenant's CRM contacts and fill the call queue.
    Sync {
        #[arg(long)]
        business_id: String,
        #[arg(long)]
        campaign: Option<String>,
        /// OData filter passed to the CRM.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Manage tenants.
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
    /// Probe a tenant's CRM for a route and show what answered.
    Probe {
        #[arg(long)]
        business_id: String,
        /// Candidate path, tried in order. Repeatable.
        #[arg(long = "path", required = true)]
        paths: Vec<String>,
        #[arg(long, value_enum, default_value_t = ProbeMethod::Get)]
        method: ProbeMethod,
        /// JSON body for POST probes.
        #[arg(long)]
        body: Option<String>,
        /// Try sibling API families before the primary base.
        #[arg(long)]
        sibling_first: bool,
    },
    /// Print a new random credential key for `storage.credential_key`.
    Keygen,
    /// Print the effective configuration with secrets masked.
    Config,
}

#[derive(Subcommand, Debug)]
enum TenantAction {
    /// Register a tenant.
    Add {
        #[arg(long)]
        business_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        crm_token: Option<String>,
        #[arg(long)]
        webhook_secret: Option<String>,
        #[arg(long)]
        dialer_api_key: Option<String>,
        #[arg(long)]
        crm_user_key: Option<String>,
        #[arg(long)]
        crm_team_key: Option<String>,
        #[arg(long, default_value_t = 0)]
        event_type_key: i64,
        #[arg(long, default_value_t = 0)]
        status_key: i64,
        /// Preferred history link field.
        #[arg(long)]
        link_field: Option<String>,
    },
    /// List tenants (secrets are never shown).
    List {
        #[arg(long)]
        plain: bool,
    },
    /// Deactivate a tenant by id.
    Deactivate { id: i64 },
    /// Map a disposition label to history keys.
    Disposition {
        #[arg(long)]
        business_id: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        status_key: Option<i64>,
        #[arg(long)]
        event_type_key: Option<i64>,
    },
    /// Attribute an agent's calls to a CRM user.
    Agent {
        #[arg(long)]
        business_id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        user_key: String,
        #[arg(long)]
        team_key: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProbeMethod {
    Get,
    Post,
}

fn load_config(path: Option<&PathBuf>) -> CallbridgeConfig {
    let loaded = match path {
        Some(path) => callbridge_config::load_and_validate_path(path),
        None => callbridge_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            callbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("callbridge: use --help for available commands");
        return;
    };

    if let Commands::Keygen = command {
        match CredentialKey::generate() {
            Ok(key) => println!("{}", key.to_hex()),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = load_config(cli.config.as_ref());
    serve::init_tracing(&config.service.log_level);

    if let Err(e) = run(command, config).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: CallbridgeConfig) -> Result<(), CallbridgeError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Config => {
            let rendered = callbridge_config::render_effective(&config)
                .map_err(|e| CallbridgeError::Config(e.to_string()))?;
            print!("{rendered}");
            Ok(())
        }
        Commands::Keygen => Ok(()),
        Commands::Sync {
            business_id,
            campaign,
            filter,
            max_rows,
        } => {
            let ctx = serve::open_context(config).await?;
            let request = SyncRequest {
                campaign,
                filter,
                max_rows,
            };
            let report = jobs::run_sync(&ctx, &business_id, request).await?;
            print_json(&report);
            Ok(())
        }
        Commands::Probe {
            business_id,
            paths,
            method,
            body,
            sibling_first,
        } => {
            let body = match (method, body) {
                (ProbeMethod::Get, _) => None,
                (ProbeMethod::Post, None) => Some(serde_json::Value::Object(Default::default())),
                (ProbeMethod::Post, Some(raw)) => Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| CallbridgeError::InvalidPayload(format!("--body: {e}")))?,
                ),
            };
            let family = if sibling_first {
                Family::Sibling
            } else {
                Family::Primary
            };
            let ctx = serve::open_context(config).await?;
            let result = jobs::run_probe(&ctx, &business_id, &paths, body, family).await?;
            print_json(&result);
            Ok(())
        }
        Commands::Tenant { action } => {
            let ctx = serve::open_context(config).await?;
            match action {
                TenantAction::Add {
                    business_id,
                    name,
                    crm_token,
                    webhook_secret,
                    dialer_api_key,
                    crm_user_key,
                    crm_team_key,
                    event_type_key,
                    status_key,
                    link_field,
                } => {
                    let created = tenant::add(
                        &ctx,
                        NewTenant {
                            business_id,
                            name,
                            dialer_api_key,
                            crm_token,
                            webhook_secret,
                            crm_user_key,
                            crm_team_key,
                            event_type_key,
                            status_key,
                            link_field,
                        },
                    )
                    .await?;
                    println!("tenant {} registered for {}", created.id, created.business_id);
                    Ok(())
                }
                TenantAction::List { plain } => tenant::list(&ctx, plain).await,
                TenantAction::Deactivate { id } => tenant::deactivate(&ctx, id).await,
                TenantAction::Disposition {
                    business_id,
                    label,
                    status_key,
                    event_type_key,
                } => {
                    tenant::set_disposition(&ctx, &business_id, &label, status_key, event_type_key)
                        .await
                }
                TenantAction::Agent {
                    business_id,
                    email,
                    user_key,
                    team_key,
                } => tenant::set_agent(&ctx, &business_id, &email, &user_key, team_key).await,
            }
        }
    }
}
