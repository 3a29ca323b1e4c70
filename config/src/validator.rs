//! # Configuration Validation
//!
//! Validates bound [`Settings`] using the `validator` crate.
//!
//! ## Validation Rules
//! - `Server:Host`: 1-255 characters
//! - `Server:Port`: 1-65535
//! - `Server:RequestTimeoutSeconds`: 1-300
//! - `Sql:MaxConnections`: 1-100
//! - `Sql:ReaderRole`, `Sql:WriterRole`: 1-63 characters
//! - `Credentials:Order`: at least one provider
//! - `Datasync:PageSize`: 1-1000
//! - `AppConfiguration:Endpoint`, `KeyVault:Uri`: `https` URLs when present

use crate::error::{ConfigError, ConfigResult};
use crate::settings::Settings;
use validator::Validate;

/// Validate settings, flattening field errors into a single message.
pub fn validate(settings: &Settings) -> ConfigResult<()> {
    settings
        .validate()
        .map_err(|errors| ConfigError::Validation(errors.to_string()))?;

    for (key, value) in [
        ("AppConfiguration:Endpoint", &settings.app_configuration.endpoint),
        ("KeyVault:Uri", &settings.key_vault.uri)
    ] {
        if let Some(url) = value {
            validate_service_url(key, url)?;
        }
    }
    Ok(())
}

fn validate_service_url(key: &str, url: &str) -> ConfigResult<()> {
    let rest = url.strip_prefix("https://").or_else(|| {
        // Plain http is accepted for local emulators only.
        url.strip_prefix("http://")
            .filter(|rest| rest.starts_with("localhost") || rest.starts_with("127.0.0.1"))
    });
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ConfigError::Validation(format!(
            "{key}: '{url}' is not an https URL"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(endpoint: Option<&str>, vault: Option<&str>) -> Settings {
        let mut settings = Settings::default();
        settings.app_configuration.endpoint = endpoint.map(str::to_string);
        settings.key_vault.uri = vault.map(str::to_string);
        settings
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate(&Settings::default()).is_ok());
    }

    #[test]
    fn test_zero_port_is_invalid() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(matches!(validate(&settings), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_host_is_invalid() {
        let mut settings = Settings::default();
        settings.server.host = String::new();
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut settings = Settings::default();
        settings.server.request_timeout_seconds = 0;
        assert!(validate(&settings).is_err());
        settings.server.request_timeout_seconds = 301;
        assert!(validate(&settings).is_err());
        settings.server.request_timeout_seconds = 300;
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_pool_size_bounds() {
        let mut settings = Settings::default();
        settings.sql.max_connections = 0;
        assert!(validate(&settings).is_err());
        settings.sql.max_connections = 101;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_role_name_length() {
        let mut settings = Settings::default();
        settings.sql.writer_role = "r".repeat(64);
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_empty_credential_order_is_invalid() {
        let mut settings = Settings::default();
        settings.credentials.order.clear();
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_https_service_urls_are_valid() {
        let settings = settings_with(
            Some("https://store.azconfig.io"),
            Some("https://vault.vault.azure.net/")
        );
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_local_http_endpoint_is_valid() {
        let settings = settings_with(Some("http://localhost:8483"), None);
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_remote_http_endpoint_is_invalid() {
        let settings = settings_with(Some("http://store.azconfig.io"), None);
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("AppConfiguration:Endpoint"));
    }

    #[test]
    fn test_garbage_vault_uri_is_invalid() {
        let settings = settings_with(None, Some("vault.azure.net"));
        assert!(validate(&settings).is_err());
    }
}
