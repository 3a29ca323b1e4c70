//! # Credential Chain
//!
//! Token providers for Microsoft Entra ID and an explicit, ordered chain
//! over them.
//!
//! A provider that cannot run in the current environment (missing
//! variables, no CLI, no metadata endpoint) reports
//! [`AzureError::CredentialUnavailable`] and the chain moves to the next
//! one. Any other failure stops the chain. Tokens are cached per scope and
//! refreshed five minutes before they expire.

use crate::error::{AzureError, AzureResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use config::CredentialSettings;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const REFRESH_MARGIN_MINUTES: i64 = 5;
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at
        }
    }

    /// Usable without refresh.
    pub fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now() + Duration::minutes(REFRESH_MARGIN_MINUTES)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Provider name used in logs and aggregated errors.
    fn name(&self) -> &str;

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken>;
}

/// Default HTTP client for token providers.
pub fn default_http_client() -> AzureResult<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(AzureError::Http)
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64
}

async fn request_client_token(
    http: &Client,
    provider: &str,
    authority_host: &str,
    tenant_id: &str,
    form: &[(&str, &str)]
) -> AzureResult<AccessToken> {
    let token_url = format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    );

    let response = http.post(&token_url).form(form).send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let error_body = response.text().await.unwrap_or_default();
        return Err(AzureError::authentication(
            provider,
            format!("Token request failed: {status} - {error_body}")
        ));
    }

    let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
        AzureError::authentication(provider, format!("Failed to parse token response: {e}"))
    })?;

    Ok(AccessToken::new(
        token_response.access_token,
        Utc::now() + Duration::seconds(token_response.expires_in)
    ))
}

/// OAuth client-credentials flow with a client secret.
pub struct ClientSecretCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String
}

impl ClientSecretCredential {
    pub fn new(
        http: Client,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into()
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &str {
        "client_secret"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        request_client_token(
            &self.http,
            self.name(),
            &self.authority_host,
            &self.tenant_id,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
                ("grant_type", "client_credentials")
            ]
        )
        .await
    }
}

fn required_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str
) -> Result<String, String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("{name} not set"))
}

/// Client-secret credential configured by `AZURE_TENANT_ID`,
/// `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
pub struct EnvironmentCredential {
    inner: Result<ClientSecretCredential, String>
}

impl EnvironmentCredential {
    pub fn from_env(http: Client, authority_host: &str) -> Self {
        Self::from_lookup(http, authority_host, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        http: Client,
        authority_host: &str,
        lookup: impl Fn(&str) -> Option<String>
    ) -> Self {
        let inner = (|| -> Result<ClientSecretCredential, String> {
            Ok(ClientSecretCredential::new(
                http,
                authority_host,
                required_var(&lookup, "AZURE_TENANT_ID")?,
                required_var(&lookup, "AZURE_CLIENT_ID")?,
                required_var(&lookup, "AZURE_CLIENT_SECRET")?
            ))
        })();
        Self { inner }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &str {
        "environment"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        match &self.inner {
            Ok(credential) => credential.get_token(scope).await,
            Err(reason) => Err(AzureError::unavailable(self.name(), reason.clone()))
        }
    }
}

struct WorkloadIdentityConfig {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    token_file: PathBuf
}

/// Federated credential: exchanges the projected service-account token in
/// `AZURE_FEDERATED_TOKEN_FILE` for an access token.
pub struct WorkloadIdentityCredential {
    http: Client,
    config: Result<WorkloadIdentityConfig, String>
}

impl WorkloadIdentityCredential {
    pub fn from_env(http: Client, authority_host: &str) -> Self {
        Self::from_lookup(http, authority_host, |name| std::env::var(name).ok())
    }

    /// `AZURE_AUTHORITY_HOST`, when present, overrides `authority_host`.
    pub fn from_lookup(
        http: Client,
        authority_host: &str,
        lookup: impl Fn(&str) -> Option<String>
    ) -> Self {
        let config = (|| -> Result<WorkloadIdentityConfig, String> {
            Ok(WorkloadIdentityConfig {
                authority_host: required_var(&lookup, "AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|_| authority_host.to_string()),
                tenant_id: required_var(&lookup, "AZURE_TENANT_ID")?,
                client_id: required_var(&lookup, "AZURE_CLIENT_ID")?,
                token_file: required_var(&lookup, "AZURE_FEDERATED_TOKEN_FILE")?.into()
            })
        })();
        Self { http, config }
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn name(&self) -> &str {
        "workload_identity"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let config = self
            .config
            .as_ref()
            .map_err(|reason| AzureError::unavailable(self.name(), reason.clone()))?;

        // The projected token rotates, so it is re-read on every request.
        let assertion = tokio::fs::read_to_string(&config.token_file)
            .await
            .map_err(|e| {
                AzureError::unavailable(
                    self.name(),
                    format!("cannot read {}: {e}", config.token_file.display())
                )
            })?;

        request_client_token(
            &self.http,
            self.name(),
            &config.authority_host,
            &config.tenant_id,
            &[
                ("client_id", config.client_id.as_str()),
                (
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"
                ),
                ("client_assertion", assertion.trim()),
                ("scope", scope),
                ("grant_type", "client_credentials")
            ]
        )
        .await
    }
}

#[derive(Debug, Clone)]
enum ManagedIdentitySource {
    /// App Service and Functions hosting.
    AppService { endpoint: String, header: String },
    /// Azure Instance Metadata Service.
    Imds { endpoint: String }
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>
}

fn as_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None
    }
}

/// Token from the compute resource's managed identity.
pub struct ManagedIdentityCredential {
    http: Client,
    client_id: Option<String>,
    source: ManagedIdentitySource
}

impl ManagedIdentityCredential {
    pub fn from_env(http: Client, client_id: Option<String>) -> Self {
        Self::from_lookup(http, client_id, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        http: Client,
        client_id: Option<String>,
        lookup: impl Fn(&str) -> Option<String>
    ) -> Self {
        let source = match (
            required_var(&lookup, "IDENTITY_ENDPOINT"),
            required_var(&lookup, "IDENTITY_HEADER")
        ) {
            (Ok(endpoint), Ok(header)) => ManagedIdentitySource::AppService { endpoint, header },
            _ => ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string()
            }
        };
        Self {
            http,
            client_id,
            source
        }
    }

    /// Targets an explicit metadata endpoint.
    pub fn with_imds_endpoint(
        http: Client,
        client_id: Option<String>,
        endpoint: impl Into<String>
    ) -> Self {
        Self {
            http,
            client_id,
            source: ManagedIdentitySource::Imds {
                endpoint: endpoint.into()
            }
        }
    }

    fn request_url(&self, endpoint: &str, api_version: &str, resource: &str) -> AzureResult<Url> {
        let mut url = Url::parse(endpoint).map_err(|e| AzureError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string()
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        "managed_identity"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let resource = scope.trim_end_matches("/.default");

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => self
                .http
                .get(self.request_url(endpoint, APP_SERVICE_API_VERSION, resource)?)
                .header("X-IDENTITY-HEADER", header),
            ManagedIdentitySource::Imds { endpoint } => self
                .http
                .get(self.request_url(endpoint, IMDS_API_VERSION, resource)?)
                .header("Metadata", "true")
                .timeout(IMDS_TIMEOUT)
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(AzureError::unavailable(
                    self.name(),
                    format!("managed identity endpoint unreachable: {e}")
                ));
            }
            Err(e) => return Err(AzureError::Http(e))
        };

        match response.status() {
            status if status.is_success() => {}
            // IMDS answers 400 when no identity is assigned to the resource.
            StatusCode::BAD_REQUEST if matches!(self.source, ManagedIdentitySource::Imds { .. }) => {
                let body = response.text().await.unwrap_or_default();
                return Err(AzureError::unavailable(
                    self.name(),
                    format!("no managed identity assigned: {body}")
                ));
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(AzureError::authentication(
                    self.name(),
                    format!("Token request failed: {} - {body}", status.as_u16())
                ));
            }
        }

        let token: ManagedIdentityTokenResponse = response.json().await.map_err(|e| {
            AzureError::authentication(self.name(), format!("Failed to parse token response: {e}"))
        })?;

        let expires_at = token
            .expires_on
            .as_ref()
            .and_then(as_seconds)
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .or_else(|| {
                token
                    .expires_in
                    .as_ref()
                    .and_then(as_seconds)
                    .map(|seconds| Utc::now() + Duration::seconds(seconds))
            })
            .ok_or_else(|| {
                AzureError::authentication(self.name(), "token response carries no expiry")
            })?;

        Ok(AccessToken::new(token.access_token, expires_at))
    }
}

#[derive(Debug, Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
    #[serde(rename = "expires_on", default)]
    expires_on: Option<i64>
}

/// Token from the signed-in Azure CLI account.
pub struct AzureCliCredential {
    program: String
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::with_program("az")
    }
}

impl AzureCliCredential {
    /// Runs `program` in place of `az`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into()
        }
    }

    fn parse_output(&self, stdout: &[u8]) -> AzureResult<AccessToken> {
        let response: CliTokenResponse = serde_json::from_slice(stdout).map_err(|e| {
            AzureError::authentication(self.name(), format!("Failed to parse CLI output: {e}"))
        })?;

        // Older CLI versions only report a local timestamp.
        let expires_at = response
            .expires_on
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .or_else(|| {
                let local = response.expires_on_local.as_deref()?;
                let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f").ok()?;
                chrono::Local
                    .from_local_datetime(&naive)
                    .single()
                    .map(|at| at.with_timezone(&Utc))
            })
            .ok_or_else(|| AzureError::authentication(self.name(), "CLI output carries no expiry"))?;

        Ok(AccessToken::new(response.access_token, expires_at))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &str {
        "azure_cli"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let resource = scope.trim_end_matches("/.default");

        let output = tokio::process::Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                resource
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AzureError::unavailable(self.name(), "Azure CLI not installed")
                }
                _ => AzureError::authentication(self.name(), e.to_string())
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("az login") || stderr.contains("az account set") {
                return Err(AzureError::unavailable(self.name(), "not logged in to Azure CLI"));
            }
            return Err(AzureError::authentication(self.name(), stderr.trim().to_string()));
        }

        self.parse_output(&output.stdout)
    }
}

/// Tries providers in order and caches tokens per scope.
pub struct ChainedTokenCredential {
    providers: Vec<Arc<dyn TokenCredential>>,
    cache: RwLock<HashMap<String, AccessToken>>
}

impl ChainedTokenCredential {
    pub fn new(providers: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            providers,
            cache: RwLock::new(HashMap::new())
        }
    }

    /// Builds the chain named by `FieldEngineer:Credentials:Order`.
    pub fn from_settings(settings: &CredentialSettings) -> AzureResult<Self> {
        let http = default_http_client()?;
        let mut providers: Vec<Arc<dyn TokenCredential>> = Vec::with_capacity(settings.order.len());

        for name in &settings.order {
            let provider: Arc<dyn TokenCredential> =
                match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    "environment" => Arc::new(EnvironmentCredential::from_env(
                        http.clone(),
                        &settings.authority_host
                    )),
                    "workload_identity" => Arc::new(WorkloadIdentityCredential::from_env(
                        http.clone(),
                        &settings.authority_host
                    )),
                    "managed_identity" => Arc::new(ManagedIdentityCredential::from_env(
                        http.clone(),
                        settings.managed_identity_client_id.clone()
                    )),
                    "azure_cli" => Arc::new(AzureCliCredential::default()),
                    other => {
                        return Err(AzureError::Configuration(format!(
                            "unknown credential provider '{other}'"
                        )));
                    }
                };
            providers.push(provider);
        }

        debug!(order = ?settings.order, "Credential chain configured");
        Ok(Self::new(providers))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    fn name(&self) -> &str {
        "chained"
    }

    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        {
            let cached = self.cache.read().await;
            if let Some(token) = cached.get(scope) {
                if token.is_fresh() {
                    return Ok(token.clone());
                }
            }
        }

        let mut reasons = Vec::new();
        for provider in &self.providers {
            match provider.get_token(scope).await {
                Ok(token) => {
                    info!(provider = %provider.name(), scope = %scope, "Acquired access token");
                    self.cache
                        .write()
                        .await
                        .insert(scope.to_string(), token.clone());
                    return Ok(token);
                }
                Err(e) if e.is_unavailable() => {
                    debug!(provider = %provider.name(), error = %e, "Credential unavailable, trying next");
                    reasons.push(format!("{}: {e}", provider.name()));
                }
                Err(e) => {
                    warn!(provider = %provider.name(), error = %e, "Credential failed");
                    return Err(e);
                }
            }
        }

        Err(AzureError::NoCredential(reasons))
    }
}
