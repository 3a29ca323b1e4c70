//! # Field Engineer API
//!
//! HTTP surface of the Field Engineer backend.
//!
//! ## Endpoints
//!
//! - `POST /api/appconfig` - Publish a key-value to App Configuration (admin key)
//! - `POST /api/sqlrole` - Provision a database login for a managed identity (admin key)
//! - `GET /api/config` - Effective configuration as nested JSON (admin key outside Development)
//! - `/tables/customers`, `/tables/support_tickets` - Data-sync CRUD
//! - `GET /health` - Health check endpoint

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{AdminError, ApiError, ApiResult};
pub use routes::create_router;
pub use server::FieldEngineerServer;
pub use state::AppState;
