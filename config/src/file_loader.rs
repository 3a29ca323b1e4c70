//! # Configuration File Loading
//!
//! Loads configuration from JSON, TOML or YAML files into a [`ConfigTree`].
//!
//! The format is picked from the file extension. Nested tables flatten into
//! `:` separated paths; arrays use their index as the key, so
//! `Hosts = ["a", "b"]` yields `Hosts:0` and `Hosts:1`. Booleans and numbers
//! are stored in their textual form.

use crate::error::{ConfigError, ConfigResult};
use crate::precedence::ConfigSource;
use crate::tree::{ConfigTree, KEY_DELIMITER};
use std::path::{Path, PathBuf};

/// Load a configuration file, picking the parser from its extension.
pub fn load_from_file(path: &Path) -> ConfigResult<ConfigTree> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| ConfigError::NoExtension {
            path: path.display().to_string()
        })?
        .to_ascii_lowercase();

    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
            path: path.display().to_string()
        },
        _ => ConfigError::Io(e)
    })?;

    let parse_error = |format: &'static str, reason: String| ConfigError::Parse {
        format,
        path: path.display().to_string(),
        reason
    };

    let mut tree = ConfigTree::new();
    match extension.as_str() {
        "json" => {
            let value: serde_json::Value = serde_json::from_str(&contents)
                .map_err(|e| parse_error("JSON", e.to_string()))?;
            flatten_json(&mut tree, String::new(), &value);
        }
        "toml" => {
            let table: toml::Table =
                toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?;
            flatten_toml(&mut tree, String::new(), &toml::Value::Table(table));
        }
        "yaml" | "yml" => {
            let value: serde_yaml::Value = serde_yaml::from_str(&contents)
                .map_err(|e| parse_error("YAML", e.to_string()))?;
            flatten_yaml(&mut tree, String::new(), &value);
        }
        other => {
            return Err(ConfigError::UnsupportedFormat {
                extension: other.to_string()
            });
        }
    }
    Ok(tree)
}

/// A file-backed configuration layer.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    optional: bool,
    name: String
}

impl FileSource {
    /// A file that must exist.
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), false)
    }

    /// A file that is skipped when absent.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), true)
    }

    fn new(path: PathBuf, optional: bool) -> Self {
        let name = format!("file:{}", path.display());
        Self {
            path,
            optional,
            name
        }
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> ConfigResult<ConfigTree> {
        match load_from_file(&self.path) {
            Err(ConfigError::FileNotFound { .. }) if self.optional => {
                tracing::debug!(path = %self.path.display(), "Optional config file not present");
                Ok(ConfigTree::new())
            }
            other => other
        }
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_DELIMITER}{key}")
    }
}

fn flatten_json(tree: &mut ConfigTree, prefix: String, value: &serde_json::Value) {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_json(tree, child_path(&prefix, key), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(tree, child_path(&prefix, &index.to_string()), child);
            }
        }
        Value::Null => tree.set(&prefix, None),
        Value::String(s) => tree.set(&prefix, Some(s.clone())),
        Value::Bool(b) => tree.set(&prefix, Some(b.to_string())),
        Value::Number(n) => tree.set(&prefix, Some(n.to_string()))
    }
}

fn flatten_toml(tree: &mut ConfigTree, prefix: String, value: &toml::Value) {
    use toml::Value;
    match value {
        Value::Table(map) => {
            for (key, child) in map {
                flatten_toml(tree, child_path(&prefix, key), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_toml(tree, child_path(&prefix, &index.to_string()), child);
            }
        }
        Value::String(s) => tree.set(&prefix, Some(s.clone())),
        Value::Integer(i) => tree.set(&prefix, Some(i.to_string())),
        Value::Float(f) => tree.set(&prefix, Some(f.to_string())),
        Value::Boolean(b) => tree.set(&prefix, Some(b.to_string())),
        Value::Datetime(dt) => tree.set(&prefix, Some(dt.to_string()))
    }
}

fn flatten_yaml(tree: &mut ConfigTree, prefix: String, value: &serde_yaml::Value) {
    use serde_yaml::Value;
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let key = match key {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue
                };
                flatten_yaml(tree, child_path(&prefix, &key), child);
            }
        }
        Value::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_yaml(tree, child_path(&prefix, &index.to_string()), child);
            }
        }
        Value::Null => tree.set(&prefix, None),
        Value::String(s) => tree.set(&prefix, Some(s.clone())),
        Value::Bool(b) => tree.set(&prefix, Some(b.to_string())),
        Value::Number(n) => tree.set(&prefix, Some(n.to_string())),
        Value::Tagged(tagged) => flatten_yaml(tree, prefix, &tagged.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_file() {
        let file = write_temp(
            ".json",
            r#"{
                "FieldEngineer": {
                    "Sql": { "ConnectionString": "postgres://db", "MaxConnections": 5 },
                    "Admin": { "DetailedErrors": false },
                    "KeyVault": { "Uri": null }
                }
            }"#
        );
        let tree = load_from_file(file.path()).unwrap();

        assert_eq!(tree.get("FieldEngineer:Sql:ConnectionString"), Some("postgres://db"));
        assert_eq!(tree.get("FieldEngineer:Sql:MaxConnections"), Some("5"));
        assert_eq!(tree.get("FieldEngineer:Admin:DetailedErrors"), Some("false"));
        assert!(tree.node("FieldEngineer:KeyVault:Uri").is_some());
        assert!(tree.get("FieldEngineer:KeyVault:Uri").is_none());
    }

    #[test]
    fn test_load_toml_file_with_array() {
        let file = write_temp(
            ".toml",
            r#"
            [FieldEngineer.Server]
            Port = 9000

            [FieldEngineer.Credentials]
            Order = ["managed_identity", "azure_cli"]
            "#
        );
        let tree = load_from_file(file.path()).unwrap();

        assert_eq!(tree.get("FieldEngineer:Server:Port"), Some("9000"));
        assert_eq!(tree.get("FieldEngineer:Credentials:Order:0"), Some("managed_identity"));
        assert_eq!(tree.get("FieldEngineer:Credentials:Order:1"), Some("azure_cli"));
    }

    #[test]
    fn test_load_yaml_file() {
        let file = write_temp(
            ".yaml",
            "FieldEngineer:\n  Environment: Development\n  Datasync:\n    PageSize: 25\n"
        );
        let tree = load_from_file(file.path()).unwrap();

        assert_eq!(tree.get("FieldEngineer:Environment"), Some("Development"));
        assert_eq!(tree.get("FieldEngineer:Datasync:PageSize"), Some("25"));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".ini", "a=b");
        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_invalid_json_reports_parse_error() {
        let file = write_temp(".json", "{ not json");
        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "JSON", .. }));
    }

    #[test]
    fn test_optional_missing_file_is_empty() {
        let source = FileSource::optional("/definitely/not/here/appsettings.json");
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_required_missing_file_fails() {
        let source = FileSource::required("/definitely/not/here/appsettings.json");
        assert!(matches!(
            source.load().unwrap_err(),
            ConfigError::FileNotFound { .. }
        ));
    }
}
