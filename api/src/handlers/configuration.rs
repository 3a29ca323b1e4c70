//! `GET /api/config`: the effective configuration as nested JSON.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, Uri}
};
use serde_json::Value;
use std::sync::Arc;

use crate::auth;
use crate::error::ApiResult;
use crate::state::AppState;

/// Open in Development. Elsewhere the projection exposes secrets, so the
/// admin key is required.
pub async fn get_configuration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri
) -> ApiResult<Json<Value>> {
    tracing::info!("Received request for configuration");

    if !state.settings.is_development() {
        auth::authorize(state.settings.admin.function_key.as_deref(), &headers, &uri)?;
    }

    Ok(Json(config::reflect(&state.configuration)))
}
