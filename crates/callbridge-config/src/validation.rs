// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::CallbridgeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure rather than stopping at the first.
pub fn validate_config(config: &CallbridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if let Some(key) = &config.storage.credential_key
        && (key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()))
    {
        errors.push(ConfigError::validation(
            "storage.credential_key must be 64 hex characters (32 bytes)",
        ));
    }

    let base = config.crm.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "crm.base_url `{base}` must start with http:// or https://"
        )));
    }

    if config.crm.timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "crm.timeout_secs must be greater than zero",
        ));
    }

    let cc = &config.crm.default_country_code;
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::validation(format!(
            "crm.default_country_code `{cc}` must be 1 to 3 digits"
        )));
    }

    if config.resolver.link_fields.is_empty() {
        errors.push(ConfigError::validation(
            "resolver.link_fields must name at least one field",
        ));
    }

    let mut seen = HashSet::new();
    for field in &config.resolver.link_fields {
        if field.trim().is_empty() {
            errors.push(ConfigError::validation(
                "resolver.link_fields entries must not be empty",
            ));
        } else if !seen.insert(field.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate link field `{field}` in resolver.link_fields"
            )));
        }
    }

    if config.resolver.scan_page_size == 0 || config.resolver.filter_top == 0 {
        errors.push(ConfigError::validation(
            "resolver.scan_page_size and resolver.filter_top must be greater than zero",
        ));
    }

    if config.webhook.signature_header.trim().is_empty() {
        errors.push(ConfigError::validation(
            "webhook.signature_header must not be empty",
        ));
    }

    if config.webhook.timezone_header.trim().is_empty() {
        errors.push(ConfigError::validation(
            "webhook.timezone_header must not be empty",
        ));
    }

    let webhook = &config.webhook;
    if webhook.process_timeout_secs < config.crm.timeout_secs {
        errors.push(ConfigError::validation(format!(
            "webhook.process_timeout_secs ({}) must allow at least one CRM request \
             (crm.timeout_secs = {})",
            webhook.process_timeout_secs, config.crm.timeout_secs
        )));
    }
    if webhook.claim_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "webhook.claim_ttl_secs must be greater than zero",
        ));
    } else if webhook.claim_ttl_secs <= webhook.process_timeout_secs {
        errors.push(ConfigError::validation(format!(
            "webhook.claim_ttl_secs ({}) must exceed webhook.process_timeout_secs ({}) \
             or a live delivery's claim could be taken over",
            webhook.claim_ttl_secs, webhook.process_timeout_secs
        )));
    }

    if config.queue.lease_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.lease_ttl_secs must be greater than zero",
        ));
    }

    if config.queue.lease_ttl_secs > config.queue.max_lease_ttl_secs {
        errors.push(ConfigError::validation(format!(
            "queue.lease_ttl_secs ({}) exceeds queue.max_lease_ttl_secs ({})",
            config.queue.lease_ttl_secs, config.queue.max_lease_ttl_secs
        )));
    }

    if config.sync.concurrency == 0 {
        errors.push(ConfigError::validation(
            "sync.concurrency must be at least 1",
        ));
    }

    if config.sync.page_size == 0 {
        errors.push(ConfigError::validation(
            "sync.page_size must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
