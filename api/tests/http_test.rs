//! HTTP contract tests against the router with in-memory collaborators.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header}
};
use azure::InMemorySettingStore;
use config::{ConfigBuilder, ConfigTree, MemorySource, Settings};
use field_engineer_api::{AppState, create_router};
use serde_json::{Value, json};
use std::sync::Arc;
use storage::{InMemoryRoleProvisioner, RoleSet};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";
const GUID: &str = "00000000-0000-0000-0000-000000000001";

struct TestApp {
    router: Router,
    store: Arc<InMemorySettingStore>,
    provisioner: Arc<InMemoryRoleProvisioner>
}

fn configuration(pairs: &[(&str, &str)]) -> ConfigTree {
    let mut all = vec![("FieldEngineer:Admin:FunctionKey", ADMIN_KEY)];
    all.extend_from_slice(pairs);
    ConfigBuilder::new()
        .add_source(Settings::default_source())
        .add_source(MemorySource::new("test", all))
        .build()
        .unwrap()
}

fn app_with(pairs: &[(&str, &str)]) -> TestApp {
    let tree = configuration(pairs);
    let settings = Settings::from_tree(&tree).unwrap();
    let store = Arc::new(InMemorySettingStore::new());
    let provisioner = Arc::new(InMemoryRoleProvisioner::new(RoleSet::from_settings(
        &settings.sql
    )));

    let state = AppState::in_memory(settings, tree)
        .with_setting_store(store.clone())
        .with_role_provisioner(provisioner.clone());

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        provisioner
    }
}

fn app() -> TestApp {
    app_with(&[("FieldEngineer:Environment", "Development")])
}

fn post(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-functions-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app().router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_appconfig_requires_admin_key() {
    let app = app();
    let body = json!({ "Key": "FieldEngineer:Banner", "Value": "hi" });

    let missing = app
        .router
        .clone()
        .oneshot(post("/api/appconfig", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .router
        .oneshot(post("/api/appconfig", Some("guess"), body))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_appconfig_publishes_and_echoes_setting() {
    let app = app();

    let response = app
        .router
        .oneshot(post(
            "/api/appconfig",
            Some(ADMIN_KEY),
            json!({ "Key": "FieldEngineer:Banner", "Value": "Maintenance at 6pm" })
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["Key"], "FieldEngineer:Banner");
    assert_eq!(echoed["Value"], "Maintenance at 6pm");
    assert_eq!(
        app.store
            .get("FieldEngineer:Banner")
            .unwrap()
            .value
            .as_deref(),
        Some("Maintenance at 6pm")
    );
}

#[tokio::test]
async fn test_appconfig_null_value_is_published_as_null() {
    let app = app();

    let response = app
        .router
        .oneshot(post(
            "/api/appconfig",
            Some(ADMIN_KEY),
            json!({ "Key": "FieldEngineer:Banner", "Value": null })
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["Value"].is_null());
    assert_eq!(app.store.get("FieldEngineer:Banner").unwrap().value, None);
}

#[tokio::test]
async fn test_appconfig_query_code_is_accepted() {
    let app = app();
    let response = app
        .router
        .oneshot(post(
            &format!("/api/appconfig?code={ADMIN_KEY}"),
            None,
            json!({ "key": "FieldEngineer:Banner", "value": "x" })
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_appconfig_empty_key_is_plain_400() {
    let app = app();
    let response = app
        .router
        .oneshot(post("/api/appconfig", Some(ADMIN_KEY), json!({ "Key": "", "Value": "x" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!body_text(response).await.is_empty());
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_sqlrole_is_idempotent() {
    let app = app();
    let body = json!({ "Name": "svc-id", "Id": GUID });

    let first = app
        .router
        .clone()
        .oneshot(post("/api/sqlrole", Some(ADMIN_KEY), body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_text(first).await, "Executed query - 3 rows affected");

    let second = app
        .router
        .oneshot(post("/api/sqlrole", Some(ADMIN_KEY), body))
        .await
        .unwrap();
    assert_eq!(body_text(second).await, "Executed query - 0 rows affected");

    assert_eq!(
        app.provisioner.sid_of("svc-id").await.as_deref(),
        Some(r"0x\00\00\00\00\00\00\00\00\00\00\00\00\00\00\00\01")
    );
    assert!(app.provisioner.has_member("pg_write_all_data", "svc-id").await);
}

#[tokio::test]
async fn test_sqlrole_malformed_id_returns_message() {
    let app = app();
    let response = app
        .router
        .oneshot(post(
            "/api/sqlrole",
            Some(ADMIN_KEY),
            json!({ "Name": "svc-id", "Id": "not-a-guid" })
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("not-a-guid"));
    assert!(app.provisioner.sid_of("svc-id").await.is_none());
}

#[tokio::test]
async fn test_sqlrole_without_detailed_errors_uses_taxonomy() {
    let app = app_with(&[
        ("FieldEngineer:Environment", "Development"),
        ("FieldEngineer:Admin:DetailedErrors", "false")
    ]);
    let response = app
        .router
        .oneshot(post(
            "/api/sqlrole",
            Some(ADMIN_KEY),
            json!({ "Name": "svc-id", "Id": "not-a-guid" })
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_IDENTIFIER");
    assert!(!body.to_string().contains("not-a-guid"));
}

#[tokio::test]
async fn test_config_is_open_in_development() {
    let response = app().router.oneshot(get("/api/config")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["FieldEngineer"]["Server"]["Port"], "8080");
    assert_eq!(body["FieldEngineer"]["Environment"], "Development");
}

#[tokio::test]
async fn test_config_requires_key_outside_development() {
    let app = app_with(&[("FieldEngineer:Environment", "Production")]);

    let anonymous = app.router.clone().oneshot(get("/api/config")).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/config")
                .header("x-functions-key", ADMIN_KEY)
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}

#[tokio::test]
async fn test_customer_crud_with_etags() {
    let app = app();

    let created = app
        .router
        .clone()
        .oneshot(post("/tables/customers", None, json!({ "name": "Contoso" })))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let etag = created.headers()[header::ETAG].to_str().unwrap().to_string();
    let location = created.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string();
    let customer = body_json(created).await;
    assert_eq!(location, format!("/tables/customers/{}", customer["id"].as_str().unwrap()));

    let fetched = app.router.clone().oneshot(get(&location)).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(fetched.headers()[header::ETAG].to_str().unwrap(), etag);

    let replaced = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&location)
                .header(header::IF_MATCH, &etag)
                .body(Body::from(json!({ "name": "Contoso Ltd" }).to_string()))
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(replaced.status(), StatusCode::OK);
    assert_eq!(body_json(replaced).await["name"], "Contoso Ltd");

    let stale = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&location)
                .header(header::IF_MATCH, &etag)
                .body(Body::empty())
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(body_json(stale).await["name"], "Contoso Ltd");

    let deleted = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&location)
                .body(Body::empty())
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = app.router.oneshot(get(&location)).await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(gone).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_replace_with_mismatched_body_id_is_rejected() {
    let app = app();
    let created = app
        .router
        .clone()
        .oneshot(post("/tables/customers", None, json!({ "name": "Contoso" })))
        .await
        .unwrap();
    let location = created.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(&location)
                .body(Body::from(json!({ "id": "someone-else", "name": "Fabrikam" }).to_string()))
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

    let unchanged = body_json(app.router.oneshot(get(&location)).await.unwrap()).await;
    assert_eq!(unchanged["name"], "Contoso");
}

#[tokio::test]
async fn test_referenced_customer_delete_is_409() {
    let app = app();
    let created = app
        .router
        .clone()
        .oneshot(post("/tables/customers", None, json!({ "name": "Contoso" })))
        .await
        .unwrap();
    let customer = body_json(created).await;
    let id = customer["id"].as_str().unwrap().to_string();

    let ticket = app
        .router
        .clone()
        .oneshot(post(
            "/tables/support_tickets",
            None,
            json!({ "customerId": id, "title": "No power" })
        ))
        .await
        .unwrap();
    assert_eq!(ticket.status(), StatusCode::CREATED);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/tables/customers/{id}"))
                .body(Body::empty())
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_malformed_list_query_uses_error_body() {
    let response = app()
        .router
        .oneshot(get("/tables/customers?$top=lots"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_ticket_for_unknown_customer_is_rejected() {
    let response = app()
        .router
        .oneshot(post(
            "/tables/support_tickets",
            None,
            json!({ "customerId": "missing", "title": "No power" })
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_entity_body_is_400() {
    let response = app()
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tables/customers")
                .body(Body::from("{not json"))
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_pages_with_next_link() {
    let app = app_with(&[
        ("FieldEngineer:Environment", "Development"),
        ("FieldEngineer:Datasync:PageSize", "2")
    ]);
    for name in ["a", "b", "c"] {
        let response = app
            .router
            .clone()
            .oneshot(post("/tables/customers", None, json!({ "name": name })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let first = app
        .router
        .clone()
        .oneshot(get("/tables/customers?$count=true"))
        .await
        .unwrap();
    let first = body_json(first).await;
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    assert_eq!(first["count"], 3);
    assert_eq!(first["nextLink"], "/tables/customers?$skip=2&$count=true");

    let second = app
        .router
        .oneshot(get("/tables/customers?$skip=2"))
        .await
        .unwrap();
    let second = body_json(second).await;
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert!(second.get("nextLink").is_none());
}
