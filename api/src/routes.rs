//! Route definitions.

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request},
    routing::{get, post}
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer
};

use crate::handlers::{self, tables};
use crate::state::AppState;
use storage::{Customer, SupportTicket};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn table_routes<T: tables::ServedTable>() -> Router<Arc<AppState>> {
    let path = T::path();
    Router::new()
        .route(&path, get(tables::list::<T>).post(tables::create::<T>))
        .route(
            &format!("{path}/{{id}}"),
            get(tables::get::<T>)
                .put(tables::replace::<T>)
                .delete(tables::delete::<T>)
        )
}

/// Creates the Axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let compress = !state.settings.is_development();

    let api = Router::new()
        .route("/api/appconfig", post(handlers::post_app_config))
        .route("/api/sqlrole", post(handlers::post_sql_role))
        .route("/api/config", get(handlers::get_configuration));

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    });

    let router = Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .merge(table_routes::<Customer>())
        .merge(table_routes::<SupportTicket>())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::new(request_id))
        );
    let router = if compress {
        router.layer(CompressionLayer::new())
    } else {
        router
    };

    router.with_state(state)
}
