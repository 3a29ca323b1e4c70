//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! Hierarchy levels are separated by a double underscore, which maps to the
//! `:` path delimiter:
//!
//! - `FieldEngineer__Sql__ConnectionString` → `FieldEngineer:Sql:ConnectionString`
//! - `FieldEngineer__Environment` → `FieldEngineer:Environment`
//!
//! Only variables starting with one of the configured prefixes are read, so
//! unrelated process environment never reaches the configuration tree.

use crate::error::ConfigResult;
use crate::precedence::ConfigSource;
use crate::tree::{ConfigTree, KEY_DELIMITER};
use tracing::debug;

/// Separator that stands in for `:` in variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Prefix read when none is configured.
pub const DEFAULT_PREFIX: &str = "FieldEngineer__";

/// Environment-variable configuration layer.
#[derive(Debug, Clone)]
pub struct EnvironmentSource {
    prefixes: Vec<String>
}

impl Default for EnvironmentSource {
    fn default() -> Self {
        Self::with_prefixes([DEFAULT_PREFIX])
    }
}

impl EnvironmentSource {
    /// Reads variables starting with any of `prefixes` (case-insensitive).
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect()
        }
    }

    fn accepts(&self, name: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            name.len() >= prefix.len()
                && name.is_char_boundary(prefix.len())
                && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
    }

    /// Builds a tree from an explicit variable list.
    pub fn load_from<I, K, V>(&self, vars: I) -> ConfigTree
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>
    {
        let mut tree = ConfigTree::new();
        for (name, value) in vars {
            let name = name.as_ref();
            if !self.accepts(name) {
                continue;
            }
            let path = name.replace(ENV_SEPARATOR, &KEY_DELIMITER.to_string());
            tree.set(&path, Some(value.into()));
        }
        tree
    }
}

impl ConfigSource for EnvironmentSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn load(&self) -> ConfigResult<ConfigTree> {
        let vars = std::env::vars_os().filter_map(|(name, value)| {
            match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => Some((name, value)),
                (name, _) => {
                    debug!(variable = ?name, "Skipping environment variable that is not valid UTF-8");
                    None
                }
            }
        });
        Ok(self.load_from(vars))
    }
}
