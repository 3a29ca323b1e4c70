//! `POST /api/appconfig`: publish one key-value to App Configuration.

use axum::{Json, body::Bytes, extract::State};
use azure::ConfigurationSetting;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::AdminKey;
use crate::error::{AdminError, ApiError};
use crate::state::AppState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigSettingRequest {
    #[serde(default, alias = "key")]
    pub key: String,

    #[serde(default, alias = "value")]
    pub value: Option<String>
}

/// The stored setting, echoed back in the store's own field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedSetting {
    pub key: String,
    pub label: Option<String>,
    pub value: Option<String>,
    pub content_type: Option<String>,
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_read_only: bool,
    pub tags: BTreeMap<String, String>
}

impl From<ConfigurationSetting> for PublishedSetting {
    fn from(setting: ConfigurationSetting) -> Self {
        Self {
            key: setting.key,
            label: setting.label,
            value: setting.value,
            content_type: setting.content_type,
            etag: setting.etag,
            last_modified: setting.last_modified,
            is_read_only: setting.locked,
            tags: setting.tags
        }
    }
}

pub async fn post_app_config(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    body: Bytes
) -> Result<Json<PublishedSetting>, AdminError> {
    tracing::info!("Received request for appconfig");
    let detailed = state.settings.admin.detailed_errors;
    let fail = |e: ApiError| AdminError::new(e, detailed);

    let request: ConfigSettingRequest =
        serde_json::from_slice(&body).map_err(|e| fail(e.into()))?;
    let publisher = state
        .publisher
        .as_ref()
        .ok_or_else(|| fail(ApiError::NotConfigured("App Configuration")))?;

    let setting = state
        .bounded(publisher.publish(&request.key, request.value.as_deref()))
        .await
        .map_err(fail)?;

    Ok(Json(setting.into()))
}
