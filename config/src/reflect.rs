//! # Configuration Reflector
//!
//! Projects the effective configuration tree into a nested JSON document.
//!
//! Sections become objects keyed by child name, leaves become their string
//! value (or `null`). The root is always an object, so an empty
//! configuration reflects as `{}`. The projection is rebuilt on every call
//! and holds no reference to the tree.

use crate::tree::{ConfigNode, ConfigTree};
use serde_json::{Map, Value};

/// Serialize `tree` depth first into a JSON object.
pub fn reflect(tree: &ConfigTree) -> Value {
    Value::Object(reflect_children(tree.root().iter()))
}

fn reflect_children<'a>(children: impl Iterator<Item = (&'a String, &'a ConfigNode)>) -> Map<String, Value> {
    children
        .map(|(key, node)| (key.clone(), reflect_node(node)))
        .collect()
}

fn reflect_node(node: &ConfigNode) -> Value {
    match node {
        ConfigNode::Value(Some(value)) => Value::String(value.clone()),
        ConfigNode::Value(None) => Value::Null,
        // A section without children reflects as its (absent) scalar value.
        ConfigNode::Section(children) if children.is_empty() => Value::Null,
        ConfigNode::Section(children) => Value::Object(reflect_children(children.iter()))
    }
}
