//! Remote configuration layer backed by App Configuration.

use crate::app_config::{ConfigurationClient, NO_LABEL};
use crate::error::AzureResult;
use crate::key_vault::SecretClient;
use config::ConfigTree;
use tracing::{debug, info};

/// Loads every unlabelled key-value of a store, resolving Key Vault
/// references to their secret values.
pub struct RemoteConfiguration {
    client: ConfigurationClient,
    secrets: SecretClient,
    key_filter: String
}

impl RemoteConfiguration {
    pub fn new(client: ConfigurationClient, secrets: SecretClient) -> Self {
        Self {
            client,
            secrets,
            key_filter: "*".to_string()
        }
    }

    #[must_use]
    pub fn with_key_filter(mut self, key_filter: impl Into<String>) -> Self {
        self.key_filter = key_filter.into();
        self
    }

    pub async fn load(&self) -> AzureResult<ConfigTree> {
        let settings = self
            .client
            .list_settings(&self.key_filter, Some(NO_LABEL))
            .await?;

        let mut tree = ConfigTree::new();
        let mut references = 0usize;
        for setting in &settings {
            let value = match (&setting.value, setting.is_key_vault_reference()) {
                (Some(reference), true) => {
                    references += 1;
                    debug!(key = %setting.key, "Resolving Key Vault reference");
                    Some(self.secrets.resolve_reference(reference).await?)
                }
                (value, _) => value.clone()
            };
            tree.set(&setting.key, value);
        }

        info!(
            endpoint = %self.client.endpoint(),
            keys = settings.len(),
            key_vault_references = references,
            "Loaded remote configuration"
        );
        Ok(tree)
    }
}
