//! Key Vault secret client, used to resolve App Configuration references.

use crate::credential::TokenCredential;
use crate::error::{AzureError, AzureResult};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;

pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
pub const KEY_VAULT_API_VERSION: &str = "7.4";

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String
}

/// Body of a Key Vault reference setting.
#[derive(Debug, Deserialize)]
struct SecretReference {
    uri: String
}

pub struct SecretClient {
    http: Client,
    credential: Arc<dyn TokenCredential>,
    scope: String
}

impl SecretClient {
    pub fn new(credential: Arc<dyn TokenCredential>) -> AzureResult<Self> {
        Ok(Self::with_http_client(
            crate::credential::default_http_client()?,
            credential
        ))
    }

    pub fn with_http_client(http: Client, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            http,
            credential,
            scope: KEY_VAULT_SCOPE.to_string()
        }
    }

    /// Fetches the secret value behind a secret identifier such as
    /// `https://vault.vault.azure.net/secrets/name[/version]`.
    pub async fn get_secret(&self, secret_id: &str) -> AzureResult<String> {
        let mut url = Url::parse(secret_id).map_err(|e| AzureError::InvalidUrl {
            url: secret_id.to_string(),
            reason: e.to_string()
        })?;
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);

        let token = self.credential.get_token(&self.scope).await?;
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", token.token))
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<SecretBundle>().await?.value),
            StatusCode::NOT_FOUND => Err(AzureError::NotFound(secret_id.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AzureError::Service {
                    status: status.as_u16(),
                    message: body
                })
            }
        }
    }

    /// Resolves the `{"uri": ...}` body of a Key Vault reference setting.
    pub async fn resolve_reference(&self, reference: &str) -> AzureResult<String> {
        let reference: SecretReference = serde_json::from_str(reference)?;
        self.get_secret(&reference.uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::AccessToken;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl TokenCredential for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn get_token(&self, _scope: &str) -> AzureResult<AccessToken> {
            panic!("no token should be requested")
        }
    }

    #[tokio::test]
    async fn test_malformed_reference_fails_before_any_request() {
        let client = SecretClient::with_http_client(Client::new(), Arc::new(Unreachable));
        let err = client.resolve_reference("{\"id\": 1}").await.unwrap_err();
        assert!(matches!(err, AzureError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_invalid_secret_id_fails_before_any_request() {
        let client = SecretClient::with_http_client(Client::new(), Arc::new(Unreachable));
        let err = client.get_secret("not a url").await.unwrap_err();
        assert!(matches!(err, AzureError::InvalidUrl { .. }));
    }
}
