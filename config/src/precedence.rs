//! # Configuration Precedence
//!
//! Merges configuration layers in registration order.
//!
//! # Precedence Order
//! Sources registered later win. The application registers, lowest first:
//! 1. Built-in defaults
//! 2. `appsettings.json`, then `appsettings.{Environment}.json`
//! 3. Environment variables
//! 4. Remote App Configuration (merged after the builder runs, since it is
//!    loaded asynchronously)

use crate::error::ConfigResult;
use crate::tree::ConfigTree;
use tracing::debug;

/// One configuration layer.
pub trait ConfigSource: Send + Sync {
    /// Name used in precedence logs.
    fn name(&self) -> &str;

    fn load(&self) -> ConfigResult<ConfigTree>;
}

/// A fixed set of key/value pairs.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    tree: ConfigTree
}

impl MemorySource {
    pub fn new<I, K, V>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>
    {
        Self {
            name: name.into(),
            tree: ConfigTree::from_pairs(pairs)
        }
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> ConfigResult<ConfigTree> {
        Ok(self.tree.clone())
    }
}

/// Collects sources and merges them into a single tree.
#[derive(Default)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Loads every source and overlays them in order.
    pub fn build(&self) -> ConfigResult<ConfigTree> {
        let mut tree = ConfigTree::new();
        for source in &self.sources {
            let layer = source.load()?;
            merge_with_logging(&mut tree, layer, source.name());
        }
        Ok(tree)
    }
}

/// Overlays `layer` onto `base`, logging every overridden key (never the value).
pub fn merge_with_logging(base: &mut ConfigTree, layer: ConfigTree, source_name: &str) {
    let leaves = layer.flatten().len();
    let overridden = base.merge(layer);
    for key in &overridden {
        debug!(key = %key, source = %source_name, "Configuration value overridden");
    }
    debug!(
        source = %source_name,
        keys = leaves,
        overridden = overridden.len(),
        "Configuration layer applied"
    );
}
