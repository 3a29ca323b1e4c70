//! # Configuration Publisher
//!
//! Upserts a single key-value into the remote configuration store. Writes
//! are unconditional: the last write wins.

use crate::app_config::{ConfigurationClient, ConfigurationSetting, validate_key};
use crate::error::AzureResult;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Where published settings land.
#[async_trait]
pub trait SettingStore: Send + Sync {
    async fn set_setting(&self, key: &str, value: Option<&str>) -> AzureResult<ConfigurationSetting>;
}

#[async_trait]
impl SettingStore for ConfigurationClient {
    async fn set_setting(&self, key: &str, value: Option<&str>) -> AzureResult<ConfigurationSetting> {
        ConfigurationClient::set_setting(self, key, value, None).await
    }
}

/// Process-local store for tests and unconfigured development runs.
#[derive(Default)]
pub struct InMemorySettingStore {
    settings: RwLock<BTreeMap<String, ConfigurationSetting>>
}

impl InMemorySettingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ConfigurationSetting> {
        self.settings.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.settings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.read().is_empty()
    }
}

#[async_trait]
impl SettingStore for InMemorySettingStore {
    async fn set_setting(&self, key: &str, value: Option<&str>) -> AzureResult<ConfigurationSetting> {
        let setting = ConfigurationSetting {
            key: key.to_string(),
            label: None,
            value: value.map(str::to_string),
            content_type: None,
            etag: Some(utils::generate_version()),
            last_modified: Some(Utc::now()),
            locked: false,
            tags: BTreeMap::new()
        };
        self.settings
            .write()
            .insert(key.to_string(), setting.clone());
        Ok(setting)
    }
}

#[derive(Clone)]
pub struct ConfigurationPublisher {
    store: Arc<dyn SettingStore>
}

impl ConfigurationPublisher {
    pub fn new(store: Arc<dyn SettingStore>) -> Self {
        Self { store }
    }

    /// Validates the key, then overwrites whatever the store holds for it.
    /// A `None` value is stored as null.
    pub async fn publish(&self, key: &str, value: Option<&str>) -> AzureResult<ConfigurationSetting> {
        validate_key(key)?;
        let setting = self.store.set_setting(key, value).await?;
        info!(key = %setting.key, etag = ?setting.etag, "Published configuration setting");
        Ok(setting)
    }
}
