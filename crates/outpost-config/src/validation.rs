// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every violation instead of failing fast so operators can fix a
//! config file in one pass.

use crate::diagnostic::ConfigError;
use crate::model::OutpostConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &OutpostConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ConfigError::validation("service.name must not be empty"));
    }

    const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    validate_host(&config.server.host, &mut errors);

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must not be 0"));
    }

    if let Some(token) = &config.server.bearer_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "server.bearer_token must not be blank when set",
        ));
    }

    if let Some(url) = &config.whatsapp.base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ConfigError::validation(format!(
            "whatsapp.base_url `{url}` must start with http:// or https://"
        )));
    }

    if config.whatsapp.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "whatsapp.request_timeout_secs must be at least 1",
        ));
    }

    let dispatch = &config.dispatch;
    for (key, value) in [
        ("dispatch.max_channels", dispatch.max_channels),
        ("dispatch.items_per_channel", dispatch.items_per_channel),
        ("ingest.batch_size", config.ingest.batch_size),
        ("events.capacity", config.events.capacity),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }

    if dispatch.max_backoff_secs < dispatch.retry_backoff_secs {
        errors.push(ConfigError::validation(format!(
            "dispatch.max_backoff_secs ({}) must not be below dispatch.retry_backoff_secs ({})",
            dispatch.max_backoff_secs, dispatch.retry_backoff_secs
        )));
    }

    if dispatch.stale_sending_minutes <= 0 {
        errors.push(ConfigError::validation(format!(
            "dispatch.stale_sending_minutes must be positive, got {}",
            dispatch.stale_sending_minutes
        )));
    }

    if dispatch.lock_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "dispatch.lock_ttl_secs must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_host(host: &str, errors: &mut Vec<ConfigError>) {
    let host = host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
        return;
    }
    let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
    let is_valid_hostname = host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if !is_valid_ip && !is_valid_hostname {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&OutpostConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = OutpostConfig::default();
        config.storage.database_path = " ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn backoff_ceiling_below_base_fails() {
        let mut config = OutpostConfig::default();
        config.dispatch.retry_backoff_secs = 60;
        config.dispatch.max_backoff_secs = 10;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "max_backoff_secs"));
    }

    #[test]
    fn zero_batch_sizes_collected_together() {
        let mut config = OutpostConfig::default();
        config.dispatch.max_channels = 0;
        config.ingest.batch_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_message(&errors, "dispatch.max_channels"));
        assert!(has_message(&errors, "ingest.batch_size"));
    }

    #[test]
    fn host_with_spaces_fails() {
        let mut config = OutpostConfig::default();
        config.server.host = "local host".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "server.host"));
    }

    #[test]
    fn ipv6_host_passes() {
        let mut config = OutpostConfig::default();
        config.server.host = "::1".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_log_level_fails() {
        let mut config = OutpostConfig::default();
        config.service.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "log_level"));
    }

    #[test]
    fn gateway_url_needs_scheme() {
        let mut config = OutpostConfig::default();
        config.whatsapp.base_url = Some("gateway.internal:8080".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "whatsapp.base_url"));
    }
}
