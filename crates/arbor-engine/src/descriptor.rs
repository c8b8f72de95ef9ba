//! Node kind descriptors
//!
//! A [`NodeDescriptor`] is the static description of a node kind: its
//! identifier, current version, sockets and properties. The registry uses it
//! to instantiate nodes and the upgrade layer uses it to decide whether a
//! loaded node still has the current shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::SocketDef;

/// Category for grouping node kinds in a palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Input,
    Processing,
    Output,
    Group,
}

/// A configurable property and its initial value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub default: serde_json::Value,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// Complete static description of a node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Unique kind identifier (e.g., "vector-in")
    pub kind: String,
    /// Current schema version of this kind
    pub version: u32,
    /// Human-readable label
    pub label: String,
    /// Category for UI grouping
    pub category: NodeCategory,
    /// Description of what the node does
    pub description: String,
    /// Ordered input sockets
    pub inputs: Vec<SocketDef>,
    /// Ordered output sockets
    pub outputs: Vec<SocketDef>,
    /// Properties with their initial values
    pub properties: Vec<PropertyDef>,
}

impl NodeDescriptor {
    /// Start a descriptor at version 1 with no sockets or properties
    pub fn new(kind: impl Into<String>, label: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            kind: kind.into(),
            version: 1,
            label: label.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, socket: SocketDef) -> Self {
        self.inputs.push(socket);
        self
    }

    pub fn output(mut self, socket: SocketDef) -> Self {
        self.outputs.push(socket);
        self
    }

    pub fn property(mut self, name: impl Into<String>, default: serde_json::Value) -> Self {
        self.properties.push(PropertyDef::new(name, default));
        self
    }

    /// Initial property map for a freshly created node
    pub fn default_properties(&self) -> BTreeMap<String, serde_json::Value> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketKind;

    #[test]
    fn test_descriptor_builder() {
        let desc = NodeDescriptor::new("vector-in", "Vector In", NodeCategory::Input)
            .version(2)
            .input(SocketDef::new("X", SocketKind::Numbers).bound_to("x"))
            .output(SocketDef::new("Vectors", SocketKind::Vertices))
            .property("x", serde_json::json!(0.0));

        assert_eq!(desc.version, 2);
        assert_eq!(desc.inputs.len(), 1);
        assert_eq!(desc.outputs[0].kind, SocketKind::Vertices);
        assert_eq!(desc.default_properties()["x"], serde_json::json!(0.0));
    }

    #[test]
    fn test_descriptor_serialization() {
        let desc = NodeDescriptor::new("number", "Number", NodeCategory::Input);
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["kind"], "number");
        assert_eq!(json["category"], "input");
        assert!(json["inputs"].as_array().unwrap().is_empty());
    }
}
