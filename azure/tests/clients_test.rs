use async_trait::async_trait;
use azure::app_config::KEY_VAULT_REFERENCE_CONTENT_TYPE;
use azure::{
    AccessToken, AzureError, AzureResult, ClientSecretCredential, ConfigurationClient,
    ConfigurationPublisher, ManagedIdentityCredential, RemoteConfiguration, SecretClient,
    TokenCredential, WorkloadIdentityCredential
};
use chrono::{Duration, Utc};
use errors::Classify;
use reqwest::Client;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticToken;

#[async_trait]
impl TokenCredential for StaticToken {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_token(&self, _scope: &str) -> AzureResult<AccessToken> {
        Ok(AccessToken::new("test-token", Utc::now() + Duration::hours(1)))
    }
}

fn app_config_client(server: &MockServer) -> ConfigurationClient {
    ConfigurationClient::with_http_client(Client::new(), &server.uri(), "1.0", Arc::new(StaticToken))
        .unwrap()
}

fn setting_json(key: &str, value: &str) -> serde_json::Value {
    json!({
        "etag": "etag-1",
        "key": key,
        "label": null,
        "content_type": null,
        "value": value,
        "tags": {},
        "locked": false,
        "last_modified": "2024-05-01T12:00:00+00:00"
    })
}

#[tokio::test]
async fn test_client_secret_credential_requests_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("client_secret=s%26cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "issued",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new(Client::new(), server.uri(), "tenant-1", "client-1", "s&cret");
    let token = credential
        .get_token("https://store.azconfig.io/.default")
        .await
        .unwrap();

    assert_eq!(token.token, "issued");
    assert!(token.is_fresh());
}

#[tokio::test]
async fn test_client_secret_rejection_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new(Client::new(), server.uri(), "tenant-1", "client-1", "wrong");
    let err = credential.get_token("scope").await.unwrap_err();

    assert!(matches!(err, AzureError::Authentication { .. }));
    assert!(err.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn test_workload_identity_sends_federated_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("client_assertion=projected-jwt"))
        .and(body_string_contains("client_assertion_type=urn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "federated",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut token_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(token_file, "projected-jwt").unwrap();
    let token_path = token_file.path().display().to_string();
    let authority = server.uri();

    let credential = WorkloadIdentityCredential::from_lookup(
        Client::new(),
        "https://login.microsoftonline.com",
        move |name| match name {
            "AZURE_TENANT_ID" => Some("tenant-1".to_string()),
            "AZURE_CLIENT_ID" => Some("client-1".to_string()),
            "AZURE_FEDERATED_TOKEN_FILE" => Some(token_path.clone()),
            "AZURE_AUTHORITY_HOST" => Some(authority.clone()),
            _ => None
        }
    );

    let token = credential.get_token("scope").await.unwrap();
    assert_eq!(token.token, "federated");
}

#[tokio::test]
async fn test_managed_identity_uses_metadata_endpoint() {
    let server = MockServer::start().await;
    let expires_on = (Utc::now() + Duration::hours(1)).timestamp();
    Mock::given(method("GET"))
        .and(path("/metadata/identity/oauth2/token"))
        .and(header("Metadata", "true"))
        .and(query_param("resource", "https://store.azconfig.io"))
        .and(query_param("client_id", "user-assigned"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mi-token",
            "expires_on": expires_on.to_string(),
            "resource": "https://store.azconfig.io",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ManagedIdentityCredential::with_imds_endpoint(
        Client::new(),
        Some("user-assigned".to_string()),
        format!("{}/metadata/identity/oauth2/token", server.uri())
    );
    let token = credential
        .get_token("https://store.azconfig.io/.default")
        .await
        .unwrap();

    assert_eq!(token.token, "mi-token");
    assert_eq!(token.expires_at.timestamp(), expires_on);
}

#[tokio::test]
async fn test_managed_identity_without_assigned_identity_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Identity not found"))
        .mount(&server)
        .await;

    let credential =
        ManagedIdentityCredential::with_imds_endpoint(Client::new(), None, server.uri());
    let err = credential.get_token("scope").await.unwrap_err();

    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_managed_identity_app_service_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/msi/token"))
        .and(header("X-IDENTITY-HEADER", "header-secret"))
        .and(query_param("api-version", "2019-08-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "app-service-token",
            "expires_on": (Utc::now() + Duration::hours(1)).timestamp()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/msi/token", server.uri());
    let credential = ManagedIdentityCredential::from_lookup(Client::new(), None, move |name| {
        match name {
            "IDENTITY_ENDPOINT" => Some(endpoint.clone()),
            "IDENTITY_HEADER" => Some("header-secret".to_string()),
            _ => None
        }
    });

    let token = credential.get_token("scope").await.unwrap();
    assert_eq!(token.token, "app-service-token");
}

#[tokio::test]
async fn test_set_setting_puts_value_without_if_match() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/kv/FieldEngineer:Banner"))
        .and(query_param("api-version", "1.0"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Content-Type", "application/vnd.microsoft.appconfig.kv+json"))
        .and(body_json(json!({ "value": "hello" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(setting_json("FieldEngineer:Banner", "hello"))
        )
        .expect(1)
        .mount(&server)
        .await;

    let setting = app_config_client(&server)
        .set_setting("FieldEngineer:Banner", Some("hello"), None)
        .await
        .unwrap();

    assert_eq!(setting.key, "FieldEngineer:Banner");
    assert_eq!(setting.value.as_deref(), Some("hello"));
    assert_eq!(setting.etag.as_deref(), Some("etag-1"));
    assert!(setting.last_modified.is_some());

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.headers.contains_key("if-match")));
}

#[tokio::test]
async fn test_set_setting_sends_null_value() {
    let server = MockServer::start().await;
    let mut stored = setting_json("FieldEngineer:Banner", "");
    stored["value"] = serde_json::Value::Null;
    Mock::given(method("PUT"))
        .and(path("/kv/FieldEngineer:Banner"))
        .and(body_json(json!({ "value": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored))
        .expect(1)
        .mount(&server)
        .await;

    let setting = app_config_client(&server)
        .set_setting("FieldEngineer:Banner", None, None)
        .await
        .unwrap();
    assert_eq!(setting.value, None);
}

#[tokio::test]
async fn test_publishing_twice_keeps_the_second_value() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/kv/greeting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(setting_json("greeting", "second")))
        .expect(2)
        .mount(&server)
        .await;

    let publisher = ConfigurationPublisher::new(Arc::new(app_config_client(&server)));
    publisher.publish("greeting", Some("first")).await.unwrap();
    let stored = publisher.publish("greeting", Some("second")).await.unwrap();
    assert_eq!(stored.value.as_deref(), Some("second"));

    let requests = server.received_requests().await.unwrap();
    let last: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(last, json!({ "value": "second" }));
}

#[tokio::test]
async fn test_store_outage_classifies_as_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = app_config_client(&server)
        .set_setting("k", Some("v"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AzureError::Service { status: 503, .. }));
    assert_eq!(err.kind(), errors::ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_list_settings_follows_next_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("after", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [setting_json("b", "2")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("key", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [setting_json("a", "1")],
            "@nextLink": "/kv?key=*&after=page-2&api-version=1.0"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = app_config_client(&server)
        .list_settings("*", None)
        .await
        .unwrap();

    let keys: Vec<&str> = settings.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[tokio::test]
async fn test_remote_configuration_resolves_key_vault_references() {
    let server = MockServer::start().await;
    let secret_uri = format!("{}/secrets/sql-connection/1", server.uri());

    let mut reference = setting_json("FieldEngineer:Sql:ConnectionString", "");
    reference["content_type"] = json!(KEY_VAULT_REFERENCE_CONTENT_TYPE);
    reference["value"] = json!(json!({ "uri": secret_uri }).to_string());

    Mock::given(method("GET"))
        .and(path("/kv"))
        .and(query_param("label", "\0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [setting_json("FieldEngineer:Datasync:PageSize", "25"), reference]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets/sql-connection/1"))
        .and(query_param("api-version", "7.4"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "postgres://vault-secret",
            "id": secret_uri
        })))
        .expect(1)
        .mount(&server)
        .await;

    let remote = RemoteConfiguration::new(
        app_config_client(&server),
        SecretClient::with_http_client(Client::new(), Arc::new(StaticToken))
    );
    let tree = remote.load().await.unwrap();

    assert_eq!(tree.get("FieldEngineer:Datasync:PageSize"), Some("25"));
    assert_eq!(
        tree.get("FieldEngineer:Sql:ConnectionString"),
        Some("postgres://vault-secret")
    );
}

#[tokio::test]
async fn test_missing_secret_fails_remote_load() {
    let server = MockServer::start().await;
    let mut reference = setting_json("Secret", "");
    reference["content_type"] = json!(KEY_VAULT_REFERENCE_CONTENT_TYPE);
    reference["value"] = json!(json!({ "uri": format!("{}/secrets/gone", server.uri()) }).to_string());

    Mock::given(method("GET"))
        .and(path("/kv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [reference] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let remote = RemoteConfiguration::new(
        app_config_client(&server),
        SecretClient::with_http_client(Client::new(), Arc::new(StaticToken))
    );
    assert!(matches!(remote.load().await.unwrap_err(), AzureError::NotFound(_)));
}
