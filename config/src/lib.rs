//! # Configuration System
//!
//! Layered configuration for the Field Engineer backend.
//!
//! This crate provides:
//! - A case-insensitive hierarchical key tree ([`ConfigTree`]) with `:`
//!   separated paths
//! - Configuration sources: in-memory defaults, JSON/TOML/YAML files and
//!   process environment variables
//! - Layer precedence (later sources override earlier ones)
//! - Typed, validated [`Settings`] bound from the merged tree
//! - The configuration reflector, projecting a tree into nested JSON for
//!   operational inspection

pub mod error;
pub mod file_loader;
pub mod layered;
pub mod loader;
pub mod precedence;
pub mod reflect;
pub mod settings;
pub mod tree;
pub mod validator;

pub use error::{ConfigError, ConfigResult};
pub use file_loader::{FileSource, load_from_file};
pub use layered::{load_layers, load_local};
pub use loader::EnvironmentSource;
pub use precedence::{ConfigBuilder, ConfigSource, MemorySource};
pub use reflect::reflect;
pub use settings::{
    AdminSettings, AppConfigurationSettings, CredentialSettings, DatasyncSettings, Environment,
    KeyVaultSettings, ServerSettings, Settings, SqlSettings
};
pub use tree::{ConfigNode, ConfigTree, KEY_DELIMITER};
