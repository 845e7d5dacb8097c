// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for callbridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level callbridge configuration.
///
/// Loaded once at startup from TOML files and environment overrides, then
/// passed by reference to every component.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallbridgeConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// CRM endpoint settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Contact resolution tuning.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Inbound dialer webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Lease queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Bulk CRM-to-queue sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name, used in logs and the health endpoint.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "callbridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP listener configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/v1` routes. `None` rejects every `/v1` request.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Storage backend configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Hex-encoded 32-byte key sealing tenant credentials at rest.
    #[serde(default)]
    pub credential_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("database_path", &self.database_path)
            .field("wal_mode", &self.wal_mode)
            .field(
                "credential_key",
                &self.credential_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            credential_key: None,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("callbridge").join("callbridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("callbridge.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// CRM endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrmConfig {
    /// Primary API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Suffixes appended to the primary base to reach sibling API families
    /// (`.../Crm` + `OData` = `.../CrmOData`).
    #[serde(default = "default_sibling_suffixes")]
    pub sibling_suffixes: Vec<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Country code prefixed to 10-digit phone numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sibling_suffixes: default_sibling_suffixes(),
            timeout_secs: default_timeout_secs(),
            default_country_code: default_country_code(),
        }
    }
}

fn default_base_url() -> String {
    "https://sync.realnex.com/api/v1/Crm".to_string()
}

fn default_sibling_suffixes() -> Vec<String> {
    vec!["OData".to_string()]
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_country_code() -> String {
    "1".to_string()
}

/// Contact resolution tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Create a contact when no tier finds a match.
    #[serde(default)]
    pub allow_create: bool,

    /// Default history link fields, tried after the cached and tenant fields.
    #[serde(default = "default_link_fields")]
    pub link_fields: Vec<String>,

    /// `$top` for the server-side attribute scan.
    #[serde(default = "default_filter_top")]
    pub filter_top: u32,

    /// Page size for the client-side scan.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: u32,

    /// Upper bound on pages read by the client-side scan.
    #[serde(default = "default_scan_max_pages")]
    pub scan_max_pages: u32,

    /// `Source` value written on created contacts.
    #[serde(default = "default_contact_source")]
    pub contact_source: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            allow_create: false,
            link_fields: default_link_fields(),
            filter_top: default_filter_top(),
            scan_page_size: default_scan_page_size(),
            scan_max_pages: default_scan_max_pages(),
            contact_source: default_contact_source(),
        }
    }
}

fn default_link_fields() -> Vec<String> {
    ["contactKey", "partyKey", "leadKey", "objectKey"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_filter_top() -> u32 {
    5
}

fn default_scan_page_size() -> u32 {
    100
}

fn default_scan_max_pages() -> u32 {
    10
}

fn default_contact_source() -> String {
    "callbridge".to_string()
}

/// Inbound dialer webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Header carrying the hex HMAC-SHA256 of the raw body.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Event kinds that write a CRM history record. Others are logged only.
    #[serde(default = "default_history_events")]
    pub history_events: Vec<String>,

    /// Create contacts for unmatched numbers on the webhook path.
    #[serde(default)]
    pub allow_create: bool,

    /// Header naming the IANA zone (`America/Chicago`) for naive payload
    /// timestamps. Absent or unknown zones mean UTC.
    #[serde(default = "default_timezone_header")]
    pub timezone_header: String,

    /// Reuse the last contact key seen for a phone before searching the CRM.
    #[serde(default = "default_contact_cache")]
    pub contact_cache: bool,

    /// Upper bound on CRM work for one event. An event still running at
    /// this point is abandoned and logged as an error.
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,

    /// Age after which an unfinished in-flight claim may be taken over.
    /// Must exceed `process_timeout_secs`.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_header: default_signature_header(),
            history_events: default_history_events(),
            allow_create: false,
            timezone_header: default_timezone_header(),
            contact_cache: default_contact_cache(),
            process_timeout_secs: default_process_timeout_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
        }
    }
}

fn default_signature_header() -> String {
    "X-Dialer-Signature".to_string()
}

fn default_history_events() -> Vec<String> {
    ["endcall", "disposition", "sms", "call.completed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_timezone_header() -> String {
    "X-User-TZ".to_string()
}

fn default_contact_cache() -> bool {
    true
}

fn default_process_timeout_secs() -> u64 {
    300
}

fn default_claim_ttl_secs() -> u64 {
    600
}

/// Lease queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Lease length when the caller does not ask for one.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Longest lease a caller may request.
    #[serde(default = "default_max_lease_ttl_secs")]
    pub max_lease_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            max_lease_ttl_secs: default_max_lease_ttl_secs(),
        }
    }
}

fn default_lease_ttl_secs() -> u64 {
    300
}

fn default_max_lease_ttl_secs() -> u64 {
    3600
}

/// Bulk CRM-to-queue sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Queue writes in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// `$top` per CRM page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Stop after this many CRM rows.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            page_size: default_page_size(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_page_size() -> u32 {
    200
}

fn default_max_rows() -> usize {
    5000
}
