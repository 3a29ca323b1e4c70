use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String
}

/// Health check endpoint.
///
/// Returns 200 when the entity store answers, 503 otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reachable = state
        .bounded(async {
            state.customers.ping().await?;
            state.tickets.ping().await
        })
        .await;

    match reachable {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: "connected".to_string()
            })
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Entity store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    database: "disconnected".to_string()
                })
            )
        }
    }
}
