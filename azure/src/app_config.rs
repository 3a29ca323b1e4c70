//! Azure App Configuration REST client.

use crate::credential::TokenCredential;
use crate::error::{AzureError, AzureResult};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const KV_MEDIA_TYPE: &str = "application/vnd.microsoft.appconfig.kv+json";
pub const KVSET_MEDIA_TYPE: &str = "application/vnd.microsoft.appconfig.kvset+json";
pub const KEY_VAULT_REFERENCE_CONTENT_TYPE: &str =
    "application/vnd.microsoft.appconfig.keyvaultref+json;charset=utf-8";

/// Label filter matching settings without a label.
pub const NO_LABEL: &str = "\0";

/// A key-value as stored by App Configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSetting {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>
}

impl ConfigurationSetting {
    pub fn is_key_vault_reference(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                ct.split(';')
                    .next()
                    .is_some_and(|media| {
                        media
                            .trim()
                            .eq_ignore_ascii_case("application/vnd.microsoft.appconfig.keyvaultref+json")
                    })
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct SettingPage {
    #[serde(default)]
    items: Vec<ConfigurationSetting>,
    #[serde(rename = "@nextLink", default)]
    next_link: Option<String>
}

#[derive(Debug, Serialize)]
struct SetSettingBody<'a> {
    value: Option<&'a str>
}

/// Rejects keys the service cannot store.
pub fn validate_key(key: &str) -> AzureResult<()> {
    let reason = if key.is_empty() {
        "must not be empty"
    } else if key == "." || key == ".." {
        "'.' and '..' are reserved"
    } else if key.contains('%') {
        "must not contain '%'"
    } else {
        return Ok(());
    };
    Err(AzureError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string()
    })
}

pub struct ConfigurationClient {
    http: Client,
    endpoint: Url,
    api_version: String,
    scope: String,
    credential: Arc<dyn TokenCredential>
}

impl ConfigurationClient {
    pub fn new(
        endpoint: &str,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenCredential>
    ) -> AzureResult<Self> {
        Self::with_http_client(crate::credential::default_http_client()?, endpoint, api_version, credential)
    }

    pub fn with_http_client(
        http: Client,
        endpoint: &str,
        api_version: impl Into<String>,
        credential: Arc<dyn TokenCredential>
    ) -> AzureResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| AzureError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string()
        })?;
        let scope = format!("{}/.default", endpoint.origin().ascii_serialization());

        Ok(Self {
            http,
            endpoint,
            api_version: api_version.into(),
            scope,
            credential
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Token scope derived from the store origin.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> AzureResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AzureError::InvalidUrl {
                url: self.endpoint.to_string(),
                reason: "cannot be a base".to_string()
            })?
            .pop_if_empty()
            .extend(segments);
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("api-version", &self.api_version);
        }
        Ok(url)
    }

    async fn bearer(&self) -> AzureResult<String> {
        let token = self.credential.get_token(&self.scope).await?;
        Ok(format!("Bearer {}", token.token))
    }

    /// Creates or overwrites a key-value. No `If-Match` header is sent.
    pub async fn set_setting(
        &self,
        key: &str,
        value: Option<&str>,
        label: Option<&str>
    ) -> AzureResult<ConfigurationSetting> {
        validate_key(key)?;
        let query: Vec<(&str, &str)> = label.map(|l| ("label", l)).into_iter().collect();
        let url = self.url(&["kv", key], &query)?;
        debug!(url = %url, "Setting App Configuration key");

        let response = self
            .http
            .put(url)
            .header("Authorization", self.bearer().await?)
            .header("Content-Type", KV_MEDIA_TYPE)
            .header("Accept", KV_MEDIA_TYPE)
            .json(&SetSettingBody { value })
            .send()
            .await?;

        Ok(check(response, key).await?.json().await?)
    }

    pub async fn get_setting(
        &self,
        key: &str,
        label: Option<&str>
    ) -> AzureResult<Option<ConfigurationSetting>> {
        validate_key(key)?;
        let query: Vec<(&str, &str)> = label.map(|l| ("label", l)).into_iter().collect();
        let url = self.url(&["kv", key], &query)?;

        let response = self
            .http
            .get(url)
            .header("Authorization", self.bearer().await?)
            .header("Accept", KV_MEDIA_TYPE)
            .send()
            .await?;

        match check(response, key).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(AzureError::NotFound(_)) => Ok(None),
            Err(e) => Err(e)
        }
    }

    /// Lists key-values matching the filters, following `@nextLink`.
    pub async fn list_settings(
        &self,
        key_filter: &str,
        label_filter: Option<&str>
    ) -> AzureResult<Vec<ConfigurationSetting>> {
        let mut query = vec![("key", key_filter)];
        if let Some(label) = label_filter {
            query.push(("label", label));
        }
        let mut next = Some(self.url(&["kv"], &query)?);
        let mut settings = Vec::new();

        while let Some(url) = next.take() {
            debug!(url = %url, "Listing App Configuration keys");
            let response = self
                .http
                .get(url)
                .header("Authorization", self.bearer().await?)
                .header("Accept", KVSET_MEDIA_TYPE)
                .send()
                .await?;

            let page: SettingPage = check(response, key_filter).await?.json().await?;
            settings.extend(page.items);

            if let Some(link) = page.next_link {
                next = Some(self.endpoint.join(&link).map_err(|e| AzureError::InvalidUrl {
                    url: link.clone(),
                    reason: e.to_string()
                })?);
            }
        }

        Ok(settings)
    }
}

async fn check(response: Response, subject: &str) -> AzureResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(AzureError::NotFound(subject.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(AzureError::Authentication {
                provider: "app_configuration".to_string(),
                message: format!("{status} - {body}")
            })
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(AzureError::Service {
                status: status.as_u16(),
                message: body
            })
        }
    }
}
