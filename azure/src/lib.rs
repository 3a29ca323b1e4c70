//! # Azure Clients
//!
//! Talks to the Azure services the Field Engineer backend depends on:
//! - [`credential`]: Entra ID token providers and the ordered credential chain
//! - [`app_config`]: App Configuration key-value REST client
//! - [`key_vault`]: Key Vault secrets, for App Configuration references
//! - [`remote_source`]: App Configuration as a configuration layer
//! - [`publisher`]: the Configuration Publisher behind `POST /api/appconfig`

pub mod app_config;
pub mod credential;
pub mod error;
pub mod key_vault;
pub mod publisher;
pub mod remote_source;

pub use app_config::{ConfigurationClient, ConfigurationSetting, validate_key};
pub use credential::{
    AccessToken, AzureCliCredential, ChainedTokenCredential, ClientSecretCredential,
    EnvironmentCredential, ManagedIdentityCredential, TokenCredential, WorkloadIdentityCredential
};
pub use error::{AzureError, AzureResult};
pub use key_vault::SecretClient;
pub use publisher::{ConfigurationPublisher, InMemorySettingStore, SettingStore};
pub use remote_source::RemoteConfiguration;
