//! Socket channel: how a node reads its inputs and publishes its outputs
//!
//! A [`SocketChannel`] is handed to a node kind for one compute call. Reads
//! resolve through the tree's links into the output cache; writes are
//! buffered and only reach the cache when the engine commits a successful
//! compute.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::error::{EngineError, Result};
use crate::extensions::ExecutorExtensions;
use crate::graph::{Node, Tree};
use crate::types::{BoundDefault, InputRef, NodeId, OutputRef, SocketDef, SocketKind};
use crate::value::NestedValue;

/// A cached output value tagged with its socket kind
#[derive(Debug, Clone, PartialEq)]
pub struct CachedOutput {
    pub kind: SocketKind,
    pub value: NestedValue,
    /// Pass number that produced the value
    pub pass: u64,
}

/// A value pushed during compute, not yet committed
#[derive(Debug, Clone, PartialEq)]
pub struct PushedOutput {
    pub index: usize,
    pub kind: SocketKind,
    pub value: NestedValue,
}

/// Last committed output of every output socket in a tree
#[derive(Debug, Clone, Default)]
pub struct OutputCache {
    entries: BTreeMap<OutputRef, CachedOutput>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, output: OutputRef) -> Option<&CachedOutput> {
        self.entries.get(&output)
    }

    pub fn value(&self, output: OutputRef) -> Option<&NestedValue> {
        self.entries.get(&output).map(|entry| &entry.value)
    }

    /// Value reaching an input through its link, if linked and cached
    pub fn linked_value<'c>(&'c self, tree: &Tree, input: InputRef) -> Option<&'c NestedValue> {
        tree.input_link(input).and_then(|link| self.value(link.from))
    }

    /// Replace a node's outputs with what it pushed
    ///
    /// Outputs the node did not push are cleared.
    pub fn commit(&mut self, node: NodeId, pushed: Vec<PushedOutput>, pass: u64) {
        self.evict(node);
        for output in pushed {
            self.entries.insert(
                OutputRef::new(node, output.index),
                CachedOutput {
                    kind: output.kind,
                    value: output.value,
                    pass,
                },
            );
        }
    }

    /// Drop every cached output of a node
    pub fn evict(&mut self, node: NodeId) {
        let keys: Vec<OutputRef> = self
            .entries
            .range(OutputRef::new(node, 0)..=OutputRef::new(node, usize::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve an input the way [`SocketChannel::pull`] does, without a channel
///
/// Linked inputs read the cache (empty if nothing was cached); unlinked ones
/// fall back to the socket's bound default, then to empty.
pub fn resolve_input(tree: &Tree, cache: &OutputCache, node: &Node, index: usize) -> NestedValue {
    let input = InputRef::new(node.id, index);
    if tree.is_input_linked(input) {
        return cache.linked_value(tree, input).cloned().unwrap_or_default();
    }
    node.inputs
        .get(index)
        .map(|socket| bound_value(node, socket))
        .unwrap_or_default()
}

fn bound_value(node: &Node, socket: &SocketDef) -> NestedValue {
    let value = match &socket.bound {
        Some(BoundDefault::Literal(value)) => value.clone(),
        Some(BoundDefault::Property(name)) => match node.properties.get(name) {
            Some(property) => NestedValue::from_json(property),
            None => return NestedValue::empty(),
        },
        None => return NestedValue::empty(),
    };
    value.wrap_to_depth(socket.kind.depth())
}

/// Per-compute view of a node's sockets
pub struct SocketChannel<'a> {
    tree: &'a Tree,
    node: &'a Node,
    cache: &'a OutputCache,
    extensions: &'a ExecutorExtensions,
    boundary: &'a [NestedValue],
    pushed: Vec<PushedOutput>,
}

impl<'a> SocketChannel<'a> {
    pub fn new(
        tree: &'a Tree,
        node: &'a Node,
        cache: &'a OutputCache,
        extensions: &'a ExecutorExtensions,
    ) -> Self {
        Self {
            tree,
            node,
            cache,
            extensions,
            boundary: &[],
            pushed: Vec::new(),
        }
    }

    /// Values injected from outside the tree (group input boundary)
    pub fn with_boundary(mut self, values: &'a [NestedValue]) -> Self {
        self.boundary = values;
        self
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn node_id(&self) -> NodeId {
        self.node.id
    }

    /// Read an input socket
    ///
    /// Resolution order: the linked upstream output's cached value, then
    /// `default`, then the socket's bound default, then empty. With
    /// `deep_copy` false a linked value is borrowed straight from the cache
    /// and must not be mutated by the caller.
    pub fn pull(
        &self,
        socket: &str,
        deep_copy: bool,
        default: Option<NestedValue>,
    ) -> Result<Cow<'a, NestedValue>> {
        let index = self.input_index(socket)?;
        let input = InputRef::new(self.node.id, index);

        if self.tree.is_input_linked(input) {
            return Ok(match self.cache.linked_value(self.tree, input) {
                Some(value) if deep_copy => Cow::Owned(value.clone()),
                Some(value) => Cow::Borrowed(value),
                None => Cow::Owned(NestedValue::empty()),
            });
        }
        if let Some(default) = default {
            return Ok(Cow::Owned(default));
        }
        Ok(Cow::Owned(bound_value(self.node, &self.node.inputs[index])))
    }

    /// Read an input socket as an owned value
    pub fn pull_owned(&self, socket: &str) -> Result<NestedValue> {
        self.pull(socket, true, None).map(Cow::into_owned)
    }

    /// Publish a value on an output socket
    ///
    /// Pushing the same socket twice keeps the last value.
    pub fn push(&mut self, socket: &str, value: NestedValue) -> Result<()> {
        let index = self
            .node
            .output_index(socket)
            .ok_or_else(|| self.unknown(socket))?;
        let kind = self.node.outputs[index].kind;
        self.pushed.retain(|p| p.index != index);
        self.pushed.push(PushedOutput { index, kind, value });
        Ok(())
    }

    /// Whether an output socket feeds any other node
    pub fn is_linked(&self, socket: &str) -> bool {
        self.node
            .output_index(socket)
            .is_some_and(|index| self.tree.is_output_linked(OutputRef::new(self.node.id, index)))
    }

    /// Whether an input socket has an incoming link
    pub fn is_input_linked(&self, socket: &str) -> bool {
        self.node
            .input_index(socket)
            .is_some_and(|index| self.tree.is_input_linked(InputRef::new(self.node.id, index)))
    }

    pub fn any_output_linked(&self) -> bool {
        self.tree.any_output_linked(self.node.id)
    }

    pub fn property(&self, name: &str) -> Option<&'a serde_json::Value> {
        self.node.properties.get(name)
    }

    /// Read a property as a typed value
    pub fn property_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .property(name)
            .cloned()
            .ok_or_else(|| EngineError::InvalidProperty {
                name: name.to_string(),
                message: "not set".to_string(),
            })?;
        serde_json::from_value(value).map_err(|e| EngineError::InvalidProperty {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn extensions(&self) -> &'a ExecutorExtensions {
        self.extensions
    }

    pub fn boundary(&self) -> &'a [NestedValue] {
        self.boundary
    }

    /// Push an output by position
    pub(crate) fn push_at(&mut self, index: usize, value: NestedValue) -> Result<()> {
        let name = self
            .node
            .outputs
            .get(index)
            .map(|s| s.name.clone())
            .ok_or_else(|| self.unknown(&format!("output {index}")))?;
        self.push(&name, value)
    }

    pub fn into_pushed(self) -> Vec<PushedOutput> {
        self.pushed
    }

    fn input_index(&self, socket: &str) -> Result<usize> {
        self.node
            .input_index(socket)
            .ok_or_else(|| self.unknown(socket))
    }

    fn unknown(&self, socket: &str) -> EngineError {
        EngineError::UnknownSocket {
            node: self.node.id,
            socket: socket.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketDef;

    fn source() -> Node {
        let mut node = Node::new("source", "src");
        node.outputs.push(SocketDef::new("Out", SocketKind::Numbers));
        node.outputs.push(SocketDef::new("Spare", SocketKind::Numbers));
        node
    }

    fn sink() -> Node {
        let mut node = Node::new("sink", "dst");
        node.inputs.push(SocketDef::new("Linked", SocketKind::Numbers));
        node.inputs
            .push(SocketDef::new("Seed", SocketKind::Numbers).bound_to("seed"));
        node.inputs
            .push(SocketDef::new("Scale", SocketKind::Numbers).with_default(vec![vec![1.0]]));
        node.inputs.push(SocketDef::new("Free", SocketKind::Vertices));
        node.outputs.push(SocketDef::new("Result", SocketKind::Numbers));
        node.properties
            .insert("seed".to_string(), serde_json::json!(7));
        node
    }

    fn setup() -> (Tree, NodeId, NodeId, OutputCache) {
        let mut tree = Tree::new("t", "Test");
        let a = tree.add_node(source());
        let b = tree.add_node(sink());
        tree.connect(a, "Out", b, "Linked").unwrap();

        let mut cache = OutputCache::new();
        cache.commit(
            a,
            vec![PushedOutput {
                index: 0,
                kind: SocketKind::Numbers,
                value: NestedValue::from(vec![vec![1.0, 2.0]]),
            }],
            1,
        );
        (tree, a, b, cache)
    }

    #[test]
    fn test_pull_resolution_order() {
        let (tree, _a, b, cache) = setup();
        let ext = ExecutorExtensions::new();
        let channel = SocketChannel::new(&tree, tree.node(b).unwrap(), &cache, &ext);

        // Linked: cached upstream value, borrowed when no copy requested
        let linked = channel.pull("Linked", false, None).unwrap();
        assert!(matches!(linked, Cow::Borrowed(_)));
        assert_eq!(*linked, NestedValue::from(vec![vec![1.0, 2.0]]));

        // Linked values win over an explicit default
        let linked = channel
            .pull("Linked", true, Some(NestedValue::Float(9.0)))
            .unwrap();
        assert!(matches!(linked, Cow::Owned(_)));
        assert_eq!(linked.flatten_f64(), vec![1.0, 2.0]);

        // Unlinked: explicit default, then bound property, then literal
        let explicit = channel
            .pull("Seed", false, Some(NestedValue::Float(3.0)))
            .unwrap();
        assert_eq!(*explicit, NestedValue::Float(3.0));
        let bound = channel.pull("Seed", false, None).unwrap();
        assert_eq!(*bound, NestedValue::from(vec![vec![7_i64]]));
        let literal = channel.pull("Scale", false, None).unwrap();
        assert_eq!(*literal, NestedValue::from(vec![vec![1.0]]));

        // Nothing at all: explicit empty, never an error
        assert!(channel.pull("Free", false, None).unwrap().is_empty());
        assert!(channel.pull("Missing", false, None).is_err());
    }

    #[test]
    fn test_linked_without_cache_is_empty() {
        let (tree, a, b, mut cache) = setup();
        cache.evict(a);
        let ext = ExecutorExtensions::new();
        let channel = SocketChannel::new(&tree, tree.node(b).unwrap(), &cache, &ext);
        assert!(channel.pull("Linked", false, None).unwrap().is_empty());
    }

    #[test]
    fn test_push_and_commit() {
        let (tree, a, b, mut cache) = setup();
        let ext = ExecutorExtensions::new();
        let mut channel = SocketChannel::new(&tree, tree.node(b).unwrap(), &cache, &ext);
        channel.push("Result", NestedValue::from(vec![vec![1.0]])).unwrap();
        channel.push("Result", NestedValue::from(vec![vec![2.0]])).unwrap();
        assert!(channel.push("Nope", NestedValue::empty()).is_err());
        let pushed = channel.into_pushed();
        assert_eq!(pushed.len(), 1);

        cache.commit(b, pushed, 2);
        let entry = cache.get(OutputRef::new(b, 0)).unwrap();
        assert_eq!(entry.kind, SocketKind::Numbers);
        assert_eq!(entry.pass, 2);
        assert_eq!(entry.value.flatten_f64(), vec![2.0]);

        // A commit without the output clears it
        cache.commit(a, Vec::new(), 3);
        assert!(cache.get(OutputRef::new(a, 0)).is_none());
        assert!(cache.get(OutputRef::new(b, 0)).is_some());
    }

    #[test]
    fn test_is_linked() {
        let (tree, a, b, cache) = setup();
        let ext = ExecutorExtensions::new();
        let channel = SocketChannel::new(&tree, tree.node(a).unwrap(), &cache, &ext);
        assert!(channel.is_linked("Out"));
        assert!(!channel.is_linked("Spare"));
        assert!(channel.any_output_linked());

        let channel = SocketChannel::new(&tree, tree.node(b).unwrap(), &cache, &ext);
        assert!(channel.is_input_linked("Linked"));
        assert!(!channel.is_input_linked("Seed"));
    }

    #[test]
    fn test_property_as() {
        let (tree, _a, b, cache) = setup();
        let ext = ExecutorExtensions::new();
        let channel = SocketChannel::new(&tree, tree.node(b).unwrap(), &cache, &ext);
        assert_eq!(channel.property_as::<i64>("seed").unwrap(), 7);
        assert!(matches!(
            channel.property_as::<String>("seed"),
            Err(EngineError::InvalidProperty { .. })
        ));
        assert!(channel.property_as::<f64>("missing").is_err());
    }

    #[test]
    fn test_resolve_input_matches_pull() {
        let (tree, _a, b, cache) = setup();
        let node = tree.node(b).unwrap();
        assert_eq!(resolve_input(&tree, &cache, node, 0).flatten_f64(), vec![1.0, 2.0]);
        assert_eq!(resolve_input(&tree, &cache, node, 1).flatten_f64(), vec![7.0]);
        assert!(resolve_input(&tree, &cache, node, 3).is_empty());
    }
}
