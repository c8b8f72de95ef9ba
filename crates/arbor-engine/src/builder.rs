//! Fluent builder for trees
//!
//! Nodes are addressed by their name while building; links resolve names
//! and socket names when they are added.
//!
//! # Example
//!
//! ```ignore
//! let tree = TreeBuilder::new(&registry, "tree-1", "Grid")
//!     .node("x", "number")
//!     .property("value", serde_json::json!(2.0))
//!     .node("verts", "vector-in")
//!     .link("x", "Value", "verts", "X")
//!     .build()?;
//! ```

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::graph::Tree;
use crate::registry::NodeRegistry;
use crate::types::NodeId;

/// Builds a [`Tree`] from registered kinds
///
/// The first error is kept and returned by [`TreeBuilder::build`]; later
/// calls are ignored once an error occurred.
pub struct TreeBuilder<'r> {
    registry: &'r NodeRegistry,
    tree: Tree,
    names: HashMap<String, NodeId>,
    last: Option<NodeId>,
    error: Option<EngineError>,
}

impl<'r> TreeBuilder<'r> {
    pub fn new(registry: &'r NodeRegistry, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            registry,
            tree: Tree::new(id, name),
            names: HashMap::new(),
            last: None,
            error: None,
        }
    }

    /// Add a node of `kind` under a unique `name`
    pub fn node(mut self, name: &str, kind: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.names.contains_key(name) {
            self.error = Some(EngineError::InvalidTree(format!(
                "duplicate node name '{name}'"
            )));
            return self;
        }
        match self.registry.instantiate(kind, name) {
            Ok(node) => {
                let id = self.tree.add_node(node);
                self.names.insert(name.to_string(), id);
                self.last = Some(id);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Set a property on the most recently added node
    pub fn property(mut self, key: &str, value: serde_json::Value) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.last.and_then(|id| self.tree.node_mut(id)) {
            Some(node) => {
                node.properties.insert(key.to_string(), value);
            }
            None => {
                self.error = Some(EngineError::InvalidTree(format!(
                    "property '{key}' set before any node"
                )));
            }
        }
        self
    }

    /// Link `from.from_socket` to `to.to_socket`
    pub fn link(mut self, from: &str, from_socket: &str, to: &str, to_socket: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let ends = (self.names.get(from).copied(), self.names.get(to).copied());
        let result = match ends {
            (Some(a), Some(b)) => self.tree.connect(a, from_socket, b, to_socket).map(|_| ()),
            (None, _) => Err(EngineError::InvalidTree(format!("no node named '{from}'"))),
            (_, None) => Err(EngineError::InvalidTree(format!("no node named '{to}'"))),
        };
        if let Err(e) = result {
            self.error = Some(e);
        }
        self
    }

    /// Id a named node received
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn build(self) -> Result<Tree> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::channel::SocketChannel;
    use crate::descriptor::{NodeCategory, NodeDescriptor};
    use crate::registry::NodeKind;
    use crate::types::{SocketDef, SocketKind};

    struct Pass;

    impl NodeKind for Pass {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("pass", "Pass", NodeCategory::Processing)
                .input(SocketDef::new("In", SocketKind::Numbers))
                .output(SocketDef::new("Out", SocketKind::Numbers))
                .property("gain", serde_json::json!(1.0))
        }

        fn compute(&self, _channel: &mut SocketChannel<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> NodeRegistry {
        let registry = NodeRegistry::new();
        registry.register(Arc::new(Pass));
        registry
    }

    #[test]
    fn test_build_chain() {
        let registry = registry();
        let tree = TreeBuilder::new(&registry, "t", "Chain")
            .node("a", "pass")
            .property("gain", serde_json::json!(3.0))
            .node("b", "pass")
            .link("a", "Out", "b", "In")
            .build()
            .unwrap();

        let a = tree.find("a").unwrap();
        let b = tree.find("b").unwrap();
        assert_eq!(tree.successors(a), vec![b]);
        assert_eq!(tree.node(a).unwrap().properties["gain"], serde_json::json!(3.0));
    }

    #[test]
    fn test_first_error_wins() {
        let registry = registry();
        let err = TreeBuilder::new(&registry, "t", "Broken")
            .node("a", "pass")
            .link("a", "Out", "ghost", "In")
            .node("b", "missing-kind")
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTree(ref m) if m.contains("ghost")));
    }

    #[test]
    fn test_rejects_duplicate_names_and_cycles() {
        let registry = registry();
        let duplicate = TreeBuilder::new(&registry, "t", "Dup")
            .node("a", "pass")
            .node("a", "pass")
            .build();
        assert!(duplicate.is_err());

        let cyclic = TreeBuilder::new(&registry, "t", "Loop")
            .node("a", "pass")
            .node("b", "pass")
            .link("a", "Out", "b", "In")
            .link("b", "Out", "a", "In")
            .build();
        assert!(matches!(cyclic, Err(EngineError::CyclicGraph { .. })));
    }
}
