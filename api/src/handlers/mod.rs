//! HTTP request handlers.
//!
//! Each handler parses its input, invokes exactly one collaborator from
//! [`AppState`](crate::state::AppState) and maps the outcome to a response.

pub mod appconfig;
pub mod configuration;
pub mod health;
pub mod sqlrole;
pub mod tables;

pub use appconfig::post_app_config;
pub use configuration::get_configuration;
pub use health::health;
pub use sqlrole::post_sql_role;
