//! # Local Configuration Layers
//!
//! Assembles the standard local layers:
//! 1. Built-in defaults
//! 2. `appsettings.json` (or the file named by `FIELDENGINEER_CONFIG_FILE`)
//! 3. `appsettings.{Environment}.json`
//! 4. `FieldEngineer__*` environment variables
//!
//! The environment is read from the base layers first so the matching
//! environment file can be inserted below the variables.

use crate::error::ConfigResult;
use crate::file_loader::FileSource;
use crate::loader::EnvironmentSource;
use crate::precedence::{ConfigBuilder, ConfigSource};
use crate::settings::{Settings, environment_from};
use crate::tree::ConfigTree;
use std::path::{Path, PathBuf};

/// Variable naming an explicit base configuration file.
pub const CONFIG_FILE_ENV: &str = "FIELDENGINEER_CONFIG_FILE";

pub const BASE_FILE_STEM: &str = "appsettings";

/// Build the local tree from files in `dir` and the process environment.
pub fn load_local(dir: &Path) -> ConfigResult<ConfigTree> {
    let base_file = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(FileSource::required)
        .unwrap_or_else(|| FileSource::optional(dir.join(format!("{BASE_FILE_STEM}.json"))));

    load_layers(dir, base_file, EnvironmentSource::default())
}

/// Layer assembly with explicit sources, so tests avoid the process environment.
pub fn load_layers(
    dir: &Path,
    base_file: FileSource,
    variables: impl ConfigSource + Clone + 'static
) -> ConfigResult<ConfigTree> {
    let bootstrap = ConfigBuilder::new()
        .add_source(Settings::default_source())
        .add_source(base_file.clone())
        .add_source(variables.clone())
        .build()?;
    let environment = environment_from(&bootstrap)?;
    tracing::debug!(environment = %environment, "Resolved hosting environment");

    ConfigBuilder::new()
        .add_source(Settings::default_source())
        .add_source(base_file)
        .add_source(FileSource::optional(environment_file(dir, environment.as_str())))
        .add_source(variables)
        .build()
}

fn environment_file(dir: &Path, environment: &str) -> PathBuf {
    dir.join(format!("{BASE_FILE_STEM}.{environment}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::MemorySource;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    fn base(dir: &TempDir) -> FileSource {
        FileSource::optional(dir.path().join("appsettings.json"))
    }

    fn no_variables() -> MemorySource {
        MemorySource::new("env", Vec::<(&str, &str)>::new())
    }

    #[test]
    fn test_defaults_apply_without_files() {
        let dir = TempDir::new().unwrap();
        let tree = load_layers(dir.path(), base(&dir), no_variables()).unwrap();

        assert_eq!(tree.get("FieldEngineer:Server:Port"), Some("8080"));
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "appsettings.json",
            r#"{ "FieldEngineer": { "Environment": "Development", "Server": { "Port": 7000 } } }"#
        );
        write(
            &dir,
            "appsettings.Development.json",
            r#"{ "FieldEngineer": { "Server": { "Port": 7001 } } }"#
        );

        let tree = load_layers(dir.path(), base(&dir), no_variables()).unwrap();
        assert_eq!(tree.get("FieldEngineer:Server:Port"), Some("7001"));
    }

    #[test]
    fn test_variables_override_files_and_select_environment() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "appsettings.Staging.json",
            r#"{ "FieldEngineer": { "Datasync": { "PageSize": 10 }, "Server": { "Port": 7002 } } }"#
        );

        let variables = MemorySource::new(
            "env",
            [
                ("FieldEngineer:Environment", "Staging"),
                ("FieldEngineer:Server:Port", "7003")
            ]
        );
        let tree = load_layers(dir.path(), base(&dir), variables).unwrap();

        assert_eq!(tree.get("FieldEngineer:Datasync:PageSize"), Some("10"));
        assert_eq!(tree.get("FieldEngineer:Server:Port"), Some("7003"));
    }
}
