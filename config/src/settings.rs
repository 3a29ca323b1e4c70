//! # Typed Settings
//!
//! Strongly typed view of the configuration tree used by the application.
//!
//! Every setting lives under the `FieldEngineer` root section. Values are
//! read case-insensitively; blank values count as absent and fall back to
//! the defaults listed in [`keys`].

use crate::error::{ConfigError, ConfigResult};
use crate::precedence::MemorySource;
use crate::tree::ConfigTree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Configuration paths and their defaults.
pub mod keys {
    pub const ENVIRONMENT: &str = "FieldEngineer:Environment";

    pub const SERVER_HOST: &str = "FieldEngineer:Server:Host";
    pub const SERVER_PORT: &str = "FieldEngineer:Server:Port";
    pub const SERVER_REQUEST_TIMEOUT_SECONDS: &str = "FieldEngineer:Server:RequestTimeoutSeconds";

    pub const APP_CONFIGURATION_ENDPOINT: &str = "FieldEngineer:AppConfiguration:Endpoint";
    pub const APP_CONFIGURATION_API_VERSION: &str = "FieldEngineer:AppConfiguration:ApiVersion";

    pub const KEY_VAULT_URI: &str = "FieldEngineer:KeyVault:Uri";

    pub const SQL_CONNECTION_STRING: &str = "FieldEngineer:Sql:ConnectionString";
    pub const SQL_ADMIN_CONNECTION_STRING: &str = "FieldEngineer:Sql:AdminConnectionString";
    pub const SQL_MAX_CONNECTIONS: &str = "FieldEngineer:Sql:MaxConnections";
    pub const SQL_READER_ROLE: &str = "FieldEngineer:Sql:ReaderRole";
    pub const SQL_WRITER_ROLE: &str = "FieldEngineer:Sql:WriterRole";

    pub const ADMIN_FUNCTION_KEY: &str = "FieldEngineer:Admin:FunctionKey";
    pub const ADMIN_DETAILED_ERRORS: &str = "FieldEngineer:Admin:DetailedErrors";

    pub const CREDENTIALS_ORDER: &str = "FieldEngineer:Credentials:Order";
    pub const CREDENTIALS_MANAGED_IDENTITY_CLIENT_ID: &str =
        "FieldEngineer:Credentials:ManagedIdentityClientId";
    pub const CREDENTIALS_AUTHORITY_HOST: &str = "FieldEngineer:Credentials:AuthorityHost";

    pub const DATASYNC_PAGE_SIZE: &str = "FieldEngineer:Datasync:PageSize";
    pub const DATASYNC_SOFT_DELETE: &str = "FieldEngineer:Datasync:SoftDelete";

    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const DEFAULT_APP_CONFIGURATION_API_VERSION: &str = "1.0";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_READER_ROLE: &str = "pg_read_all_data";
    pub const DEFAULT_WRITER_ROLE: &str = "pg_write_all_data";
    pub const DEFAULT_CREDENTIALS_ORDER: &str =
        "environment,workload_identity,managed_identity,azure_cli";
    pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
    pub const DEFAULT_PAGE_SIZE: u32 = 100;
}

/// Hosting environment. `Development` turns on console-friendly logging,
/// schema auto-creation and unrestricted configuration reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Staging => "Staging",
            Self::Production => "Production"
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    /// Upper bound for a single store or remote-service call.
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_seconds: u64
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct AppConfigurationSettings {
    pub endpoint: Option<String>,

    #[validate(length(min = 1))]
    pub api_version: String
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyVaultSettings {
    pub uri: Option<String>
}

#[derive(Clone, PartialEq, Validate)]
pub struct SqlSettings {
    pub connection_string: Option<String>,

    /// Privileged connection for role provisioning.
    pub admin_connection_string: Option<String>,

    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    #[validate(length(min = 1, max = 63))]
    pub reader_role: String,

    #[validate(length(min = 1, max = 63))]
    pub writer_role: String
}

impl SqlSettings {
    /// Connection used for role provisioning; falls back to the application
    /// connection string.
    pub fn provisioning_connection_string(&self) -> Option<&str> {
        self.admin_connection_string
            .as_deref()
            .or(self.connection_string.as_deref())
    }
}

impl fmt::Debug for SqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlSettings")
            .field("connection_string", &self.connection_string.as_ref().map(|_| "<redacted>"))
            .field(
                "admin_connection_string",
                &self.admin_connection_string.as_ref().map(|_| "<redacted>")
            )
            .field("max_connections", &self.max_connections)
            .field("reader_role", &self.reader_role)
            .field("writer_role", &self.writer_role)
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct AdminSettings {
    /// Admin-level key guarding the administrative endpoints. When unset the
    /// endpoints reject every caller.
    pub function_key: Option<String>,

    /// Return raw failure messages from administrative endpoints.
    pub detailed_errors: bool
}

impl fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSettings")
            .field("function_key", &self.function_key.as_ref().map(|_| "<redacted>"))
            .field("detailed_errors", &self.detailed_errors)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct CredentialSettings {
    /// Credential providers, tried in this order.
    #[validate(length(min = 1))]
    pub order: Vec<String>,

    /// Client id of a user-assigned managed identity.
    pub managed_identity_client_id: Option<String>,

    #[validate(length(min = 1))]
    pub authority_host: String
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct DatasyncSettings {
    #[validate(range(min = 1, max = 1000))]
    pub page_size: u32,

    pub soft_delete: bool
}

/// Application settings bound from a [`ConfigTree`].
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct Settings {
    pub environment: Environment,

    #[validate(nested)]
    pub server: ServerSettings,

    #[validate(nested)]
    pub app_configuration: AppConfigurationSettings,

    pub key_vault: KeyVaultSettings,

    #[validate(nested)]
    pub sql: SqlSettings,

    pub admin: AdminSettings,

    #[validate(nested)]
    pub credentials: CredentialSettings,

    #[validate(nested)]
    pub datasync: DatasyncSettings
}

impl Default for Settings {
    fn default() -> Self {
        // Binding an empty tree only applies defaults and cannot fail.
        Self::bind(&ConfigTree::new()).unwrap_or_else(|_| unreachable!("defaults always bind"))
    }
}

impl Settings {
    /// Built-in defaults as the lowest configuration layer, so that the
    /// reflected configuration shows effective values.
    pub fn default_source() -> MemorySource {
        MemorySource::new(
            "defaults",
            [
                (keys::SERVER_HOST, keys::DEFAULT_HOST.to_string()),
                (keys::SERVER_PORT, keys::DEFAULT_PORT.to_string()),
                (
                    keys::SERVER_REQUEST_TIMEOUT_SECONDS,
                    keys::DEFAULT_REQUEST_TIMEOUT_SECONDS.to_string()
                ),
                (
                    keys::APP_CONFIGURATION_API_VERSION,
                    keys::DEFAULT_APP_CONFIGURATION_API_VERSION.to_string()
                ),
                (keys::SQL_MAX_CONNECTIONS, keys::DEFAULT_MAX_CONNECTIONS.to_string()),
                (keys::SQL_READER_ROLE, keys::DEFAULT_READER_ROLE.to_string()),
                (keys::SQL_WRITER_ROLE, keys::DEFAULT_WRITER_ROLE.to_string()),
                (keys::CREDENTIALS_ORDER, keys::DEFAULT_CREDENTIALS_ORDER.to_string()),
                (keys::CREDENTIALS_AUTHORITY_HOST, keys::DEFAULT_AUTHORITY_HOST.to_string()),
                (keys::DATASYNC_PAGE_SIZE, keys::DEFAULT_PAGE_SIZE.to_string())
            ]
        )
    }

    /// Binds and validates settings.
    pub fn from_tree(tree: &ConfigTree) -> ConfigResult<Self> {
        let settings = Self::bind(tree)?;
        crate::validator::validate(&settings)?;
        Ok(settings)
    }

    fn bind(tree: &ConfigTree) -> ConfigResult<Self> {
        let environment = parse_or(tree, keys::ENVIRONMENT, Environment::default())?;

        Ok(Self {
            environment,
            server: ServerSettings {
                host: string_or(tree, keys::SERVER_HOST, keys::DEFAULT_HOST),
                port: parse_or(tree, keys::SERVER_PORT, keys::DEFAULT_PORT)?,
                request_timeout_seconds: parse_or(
                    tree,
                    keys::SERVER_REQUEST_TIMEOUT_SECONDS,
                    keys::DEFAULT_REQUEST_TIMEOUT_SECONDS
                )?
            },
            app_configuration: AppConfigurationSettings {
                endpoint: optional(tree, keys::APP_CONFIGURATION_ENDPOINT),
                api_version: string_or(
                    tree,
                    keys::APP_CONFIGURATION_API_VERSION,
                    keys::DEFAULT_APP_CONFIGURATION_API_VERSION
                )
            },
            key_vault: KeyVaultSettings {
                uri: optional(tree, keys::KEY_VAULT_URI)
            },
            sql: SqlSettings {
                connection_string: optional(tree, keys::SQL_CONNECTION_STRING),
                admin_connection_string: optional(tree, keys::SQL_ADMIN_CONNECTION_STRING),
                max_connections: parse_or(
                    tree,
                    keys::SQL_MAX_CONNECTIONS,
                    keys::DEFAULT_MAX_CONNECTIONS
                )?,
                reader_role: string_or(tree, keys::SQL_READER_ROLE, keys::DEFAULT_READER_ROLE),
                writer_role: string_or(tree, keys::SQL_WRITER_ROLE, keys::DEFAULT_WRITER_ROLE)
            },
            admin: AdminSettings {
                function_key: optional(tree, keys::ADMIN_FUNCTION_KEY),
                detailed_errors: bool_or(tree, keys::ADMIN_DETAILED_ERRORS, true)?
            },
            credentials: CredentialSettings {
                order: list_or(tree, keys::CREDENTIALS_ORDER, keys::DEFAULT_CREDENTIALS_ORDER),
                managed_identity_client_id: optional(
                    tree,
                    keys::CREDENTIALS_MANAGED_IDENTITY_CLIENT_ID
                ),
                authority_host: string_or(
                    tree,
                    keys::CREDENTIALS_AUTHORITY_HOST,
                    keys::DEFAULT_AUTHORITY_HOST
                )
            },
            datasync: DatasyncSettings {
                page_size: parse_or(tree, keys::DATASYNC_PAGE_SIZE, keys::DEFAULT_PAGE_SIZE)?,
                soft_delete: bool_or(tree, keys::DATASYNC_SOFT_DELETE, false)?
            }
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }

    /// Remote App Configuration is layered in only when both the store
    /// endpoint and the Key Vault used for its secret references are known.
    pub fn remote_configuration_enabled(&self) -> bool {
        self.app_configuration.endpoint.is_some() && self.key_vault.uri.is_some()
    }
}

/// Reads only the environment, for choosing environment-specific files
/// before the full tree is assembled.
pub fn environment_from(tree: &ConfigTree) -> ConfigResult<Environment> {
    parse_or(tree, keys::ENVIRONMENT, Environment::default())
}

fn optional(tree: &ConfigTree, key: &str) -> Option<String> {
    tree.get_non_empty(key).map(|v| v.trim().to_string())
}

fn string_or(tree: &ConfigTree, key: &str, default: &str) -> String {
    optional(tree, key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(tree: &ConfigTree, key: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: fmt::Display
{
    match tree.get_non_empty(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string()
        })
    }
}

fn bool_or(tree: &ConfigTree, key: &str, default: bool) -> ConfigResult<bool> {
    match tree.get_non_empty(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: "expected a boolean".to_string()
            })
        }
    }
}

/// A list is either a comma-separated scalar or an indexed section
/// (`Order:0`, `Order:1`, ...) as produced by file arrays.
fn list_or(tree: &ConfigTree, key: &str, default: &str) -> Vec<String> {
    let split = |raw: &str| -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    };

    match tree.node(key) {
        Some(node) => match node.children() {
            Some(children) => {
                let mut indexed: Vec<(usize, &str)> = children
                    .iter()
                    .filter_map(|(index, child)| Some((index.parse().ok()?, child.value()?)))
                    .collect();
                indexed.sort_by_key(|(index, _)| *index);
                indexed
                    .into_iter()
                    .map(|(_, value)| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            }
            None => match node.value().filter(|v| !v.trim().is_empty()) {
                Some(raw) => split(raw),
                None => split(default)
            }
        },
        None => split(default)
    }
}
