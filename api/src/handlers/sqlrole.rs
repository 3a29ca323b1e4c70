//! `POST /api/sqlrole`: bind a managed identity to a database login.

use axum::{body::Bytes, extract::State};
use std::sync::Arc;
use storage::RoleRequest;

use crate::auth::AdminKey;
use crate::error::{AdminError, ApiError};
use crate::state::AppState;

pub async fn post_sql_role(
    _admin: AdminKey,
    State(state): State<Arc<AppState>>,
    body: Bytes
) -> Result<String, AdminError> {
    tracing::info!("Received request for sqlrole");
    let detailed = state.settings.admin.detailed_errors;
    let fail = |e: ApiError| AdminError::new(e, detailed);

    let request: RoleRequest = serde_json::from_slice(&body).map_err(|e| fail(e.into()))?;
    let provisioner = state
        .provisioner
        .as_ref()
        .ok_or_else(|| fail(ApiError::NotConfigured("SQL connection string")))?;

    let outcome = state
        .bounded(provisioner.provision(&request))
        .await
        .map_err(fail)?;

    Ok(format!("Executed query - {} rows affected", outcome.rows_affected))
}
