//! # Data-sync Tables
//!
//! Generic CRUD over `/tables/{table}` for every served record type.
//!
//! - `GET /tables/{table}` lists with `$top`, `$skip`, `$count` and
//!   `__includedeleted`, returning `{ items, count?, nextLink? }`
//! - `POST /tables/{table}` creates (201 with `Location`)
//! - `GET|PUT|DELETE /tables/{table}/{id}` read, replace and delete, with
//!   `If-Match` honored on writes; a replace body naming another id is
//!   rejected
//!
//! Single-record responses carry `ETag: "<version>"`.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response}
};
use errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{Customer, ListQuery, Repository, SupportTicket, TableRecord};

use crate::error::ApiResult;
use crate::state::AppState;

/// A record type exposed under `/tables`.
pub trait ServedTable: TableRecord {
    fn repository(state: &AppState) -> Arc<dyn Repository<Self>>;

    fn path() -> String {
        format!("/tables/{}", Self::TABLE)
    }
}

impl ServedTable for Customer {
    fn repository(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.customers.clone()
    }
}

impl ServedTable for SupportTicket {
    fn repository(state: &AppState) -> Arc<dyn Repository<Self>> {
        state.tickets.clone()
    }
}

/// OData-style list parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "$top")]
    pub top: Option<u32>,

    #[serde(rename = "$skip", default)]
    pub skip: u32,

    #[serde(rename = "$count", default)]
    pub count: bool,

    #[serde(rename = "__includedeleted", default)]
    pub include_deleted: bool
}

impl From<&ListParams> for ListQuery {
    fn from(params: &ListParams) -> Self {
        Self {
            top: params.top,
            skip: params.skip,
            include_count: params.count,
            include_deleted: params.include_deleted
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>
}

/// Link to the page after one that returned `returned` items.
fn next_link(path: &str, params: &ListParams, returned: usize) -> String {
    let returned = returned as u32;
    let mut query = Vec::new();
    if let Some(top) = params.top {
        query.push(format!("$top={}", top.saturating_sub(returned)));
    }
    query.push(format!("$skip={}", params.skip + returned));
    if params.count {
        query.push("$count=true".to_string());
    }
    if params.include_deleted {
        query.push("__includedeleted=true".to_string());
    }
    format!("{path}?{}", query.join("&"))
}

/// `If-Match` value without quotes; `*` matches any version.
fn expected_version(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::IF_MATCH)?.to_str().ok()?.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    match raw.trim_matches('"') {
        "" | "*" => None,
        version => Some(version.to_string())
    }
}

/// A replace body may omit its id, but must not name a different record.
fn check_body_id<T: TableRecord>(path_id: &str, record: &T) -> Result<(), ValidationError> {
    let body_id = record.meta().id.trim();
    if body_id.is_empty() || body_id == path_id {
        Ok(())
    } else {
        Err(ValidationError::new(
            "id",
            format!("'{body_id}' does not match '{path_id}' in the request path")
        ))
    }
}

fn with_etag<T: TableRecord>(status: StatusCode, record: T) -> Response {
    let etag = HeaderValue::from_str(&format!("\"{}\"", record.meta().version)).ok();
    let mut response = (status, Json(record)).into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

pub async fn list<T: ServedTable>(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
    uri: Uri
) -> ApiResult<Json<PagedResponse<T>>> {
    tracing::info!(table = T::TABLE, "Received request for table list");
    let Query(params) =
        params.map_err(|rejection| ValidationError::new("query", rejection.body_text()))?;
    let repository = T::repository(&state);
    let query = ListQuery::from(&params);

    let page = state.bounded(repository.list(&query)).await?;
    let next_link = page
        .has_more
        .then(|| next_link(uri.path(), &params, page.items.len()));

    Ok(Json(PagedResponse {
        count: page.count,
        next_link,
        items: page.items
    }))
}

pub async fn get<T: ServedTable>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>
) -> ApiResult<Response> {
    tracing::info!(table = T::TABLE, id = %id, "Received request for table read");
    let repository = T::repository(&state);
    let record = state.bounded(repository.get(&id)).await?;
    Ok(with_etag(StatusCode::OK, record))
}

pub async fn create<T: ServedTable>(
    State(state): State<Arc<AppState>>,
    body: Bytes
) -> ApiResult<Response> {
    tracing::info!(table = T::TABLE, "Received request for table create");
    let record: T = serde_json::from_slice(&body)?;
    let repository = T::repository(&state);

    let created = state.bounded(repository.create(record)).await?;
    let location = HeaderValue::from_str(&format!("{}/{}", T::path(), created.meta().id)).ok();

    let mut response = with_etag(StatusCode::CREATED, created);
    if let Some(location) = location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub async fn replace<T: ServedTable>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes
) -> ApiResult<Response> {
    tracing::info!(table = T::TABLE, id = %id, "Received request for table replace");
    let record: T = serde_json::from_slice(&body)?;
    check_body_id(&id, &record)?;
    let expected = expected_version(&headers);
    let repository = T::repository(&state);

    let updated = state
        .bounded(repository.replace(&id, record, expected.as_deref()))
        .await?;
    Ok(with_etag(StatusCode::OK, updated))
}

pub async fn delete<T: ServedTable>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap
) -> ApiResult<StatusCode> {
    tracing::info!(table = T::TABLE, id = %id, "Received request for table delete");
    let expected = expected_version(&headers);
    let repository = T::repository(&state);

    state
        .bounded(repository.delete(&id, expected.as_deref()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
