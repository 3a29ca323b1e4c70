//! # Configuration Tree
//!
//! A hierarchical, case-insensitive key tree. Paths are segments joined with
//! [`KEY_DELIMITER`], so `FieldEngineer:Sql:ConnectionString` addresses the
//! `ConnectionString` leaf below the `Sql` section of `FieldEngineer`.
//!
//! Keys keep the casing they were first written with; later writes that
//! differ only in case land on the same node.

use std::collections::BTreeMap;
use tracing::debug;

/// Separator between path segments.
pub const KEY_DELIMITER: char = ':';

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNode {
    /// A leaf holding a scalar, which may be absent (`null` in a source file).
    Value(Option<String>),
    /// A section holding named children.
    Section(BTreeMap<String, ConfigNode>)
}

impl ConfigNode {
    fn empty_section() -> Self {
        Self::Section(BTreeMap::new())
    }

    /// Scalar value of a leaf; `None` for sections and null leaves.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => value.as_deref(),
            Self::Section(_) => None
        }
    }

    /// Children of a section; `None` for leaves.
    pub fn children(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            Self::Section(children) => Some(children),
            Self::Value(_) => None
        }
    }

    pub fn child(&self, key: &str) -> Option<&ConfigNode> {
        self.children().and_then(|children| find(children, key))
    }
}

/// Root of a configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    root: BTreeMap<String, ConfigNode>
}

impl ConfigTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from `(path, value)` pairs, later pairs winning.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>
    {
        let mut tree = Self::new();
        for (key, value) in pairs {
            tree.set(key.as_ref(), Some(value.into()));
        }
        tree
    }

    /// Top-level entries.
    pub fn root(&self) -> &BTreeMap<String, ConfigNode> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Writes `value` at `path`, creating intermediate sections.
    ///
    /// A leaf on the way down is replaced by a section. A value written onto
    /// a section that already has children is ignored: children take
    /// precedence over a scalar at the same path.
    pub fn set(&mut self, path: &str, value: Option<String>) {
        if path.is_empty() {
            return;
        }
        let segments: Vec<&str> = path.split(KEY_DELIMITER).collect();
        let Some((leaf, parents)) = segments.split_last() else {
            return;
        };

        let mut map = &mut self.root;
        for segment in parents {
            let key = canonical_key(map, segment);
            let node = map.entry(key).or_insert_with(ConfigNode::empty_section);
            if !matches!(node, ConfigNode::Section(_)) {
                *node = ConfigNode::empty_section();
            }
            let ConfigNode::Section(children) = node else {
                return;
            };
            map = children;
        }

        let key = canonical_key(map, leaf);
        match map.get_mut(&key) {
            Some(ConfigNode::Section(children)) if !children.is_empty() => {
                debug!(path = %path, "Ignoring scalar written over a populated section");
            }
            Some(node) => *node = ConfigNode::Value(value),
            None => {
                map.insert(key, ConfigNode::Value(value));
            }
        }
    }

    /// Node at `path`, leaf or section.
    pub fn node(&self, path: &str) -> Option<&ConfigNode> {
        let mut segments = path.split(KEY_DELIMITER);
        let first = segments.next()?;
        let mut node = find(&self.root, first)?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Scalar value at `path`.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.node(path).and_then(ConfigNode::value)
    }

    /// Like [`get`](Self::get) but treats blank strings as absent.
    pub fn get_non_empty(&self, path: &str) -> Option<&str> {
        self.get(path).filter(|value| !value.trim().is_empty())
    }

    /// All leaves as `(path, value)` pairs, depth first.
    pub fn flatten(&self) -> Vec<(String, Option<String>)> {
        let mut out = Vec::new();
        for (key, node) in &self.root {
            flatten_into(key.clone(), node, &mut out);
        }
        out
    }

    /// Overlays `other` onto this tree and returns the paths whose existing
    /// value was replaced by a different one.
    pub fn merge(&mut self, other: ConfigTree) -> Vec<String> {
        let mut overridden = Vec::new();
        for (path, value) in other.flatten() {
            if let Some(existing) = self.node(&path) {
                if existing.children().is_none() && existing.value() != value.as_deref() {
                    overridden.push(path.clone());
                }
            }
            self.set(&path, value);
        }
        overridden
    }
}

fn find<'a>(map: &'a BTreeMap<String, ConfigNode>, key: &str) -> Option<&'a ConfigNode> {
    map.iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
        .map(|(_, node)| node)
}

fn canonical_key(map: &BTreeMap<String, ConfigNode>, key: &str) -> String {
    map.keys()
        .find(|existing| existing.eq_ignore_ascii_case(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

fn flatten_into(path: String, node: &ConfigNode, out: &mut Vec<(String, Option<String>)>) {
    match node {
        ConfigNode::Value(value) => out.push((path, value.clone())),
        ConfigNode::Section(children) => {
            for (key, child) in children {
                flatten_into(format!("{path}{KEY_DELIMITER}{key}"), child, out);
            }
        }
    }
}
