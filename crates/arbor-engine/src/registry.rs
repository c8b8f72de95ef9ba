//! Node kind registry
//!
//! Maps kind identifiers to [`NodeKind`] implementations and
//! `(kind, version)` pairs to upgrade steps. The registry is built once at
//! startup and handed to the engine; later registrations go through a
//! structural lock so they cannot interleave with a lookup.
//!
//! # Usage
//!
//! ```ignore
//! use arbor_engine::NodeRegistry;
//!
//! // Everything submitted with `inventory::submit!` at link time
//! let registry = NodeRegistry::with_builtins();
//!
//! // Plus kinds defined by the host
//! registry.register(Arc::new(MyKind));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::SocketChannel;
use crate::descriptor::{NodeCategory, NodeDescriptor};
use crate::error::{EngineError, Result};
use crate::extensions::ExecutorExtensions;
use crate::graph::Node;
use crate::types::SocketDef;

/// Capability every node kind implements
///
/// One implementation per kind; the engine dispatches through this trait.
pub trait NodeKind: Send + Sync {
    /// Static description: sockets, properties, version
    fn descriptor(&self) -> NodeDescriptor;

    /// Read inputs and publish outputs through the channel
    ///
    /// An all-empty input set is a valid case that should push nothing (or
    /// empty values), not an error.
    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()>;

    /// Pure nodes have no side effects; the engine may skip them when none
    /// of their outputs is linked
    fn is_pure(&self) -> bool {
        false
    }

    /// Called once when a node of this kind is created
    fn on_created(&self, _node: &mut Node) {}

    /// Called once when a node of this kind is removed from its tree
    fn on_removed(&self, _node: &Node, _extensions: &ExecutorExtensions) {}

    /// Check that a loaded node has the shape this kind currently declares
    fn check_shape(&self, node: &Node) -> std::result::Result<(), String> {
        check_descriptor_shape(&self.descriptor(), node)
    }
}

/// Check that a node still carries what a descriptor declares
///
/// Inputs must match by name and kind. Outputs must match in count only,
/// since `replace_output_socket` may swap their definitions at runtime.
/// Declared properties must be present; extra properties are kept.
pub fn check_descriptor_shape(
    descriptor: &NodeDescriptor,
    node: &Node,
) -> std::result::Result<(), String> {
    let inputs_match = node.inputs.len() == descriptor.inputs.len()
        && node
            .inputs
            .iter()
            .zip(&descriptor.inputs)
            .all(|(ours, theirs)| ours.name == theirs.name && ours.kind == theirs.kind);
    if !inputs_match {
        return Err(format!(
            "inputs [{}] do not match [{}]",
            describe_sockets(&node.inputs),
            describe_sockets(&descriptor.inputs)
        ));
    }
    if node.outputs.len() != descriptor.outputs.len() {
        return Err(format!(
            "outputs [{}] do not match [{}]",
            describe_sockets(&node.outputs),
            describe_sockets(&descriptor.outputs)
        ));
    }
    if let Some(missing) = descriptor
        .properties
        .iter()
        .find(|p| !node.properties.contains_key(&p.name))
    {
        return Err(format!("missing property '{}'", missing.name));
    }
    Ok(())
}

fn describe_sockets(sockets: &[SocketDef]) -> String {
    sockets
        .iter()
        .map(|s| format!("{}: {:?}", s.name, s.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rewrites a node from one version of its kind to the next
pub type UpgradeFn = fn(&mut Node) -> Result<()>;

/// A registered upgrade step
#[derive(Clone, Copy)]
pub struct UpgradeStep {
    pub from: u32,
    pub to: u32,
    pub apply: UpgradeFn,
}

/// Link-time registration of a node kind
///
/// ```ignore
/// inventory::submit!(arbor_engine::KindRegistration(|| Arc::new(NumberKind)));
/// ```
pub struct KindRegistration(pub fn() -> Arc<dyn NodeKind>);

/// Link-time registration of an upgrade step
pub struct UpgradeRegistration {
    pub kind: &'static str,
    pub from: u32,
    pub to: u32,
    pub apply: UpgradeFn,
}

inventory::collect!(KindRegistration);
inventory::collect!(UpgradeRegistration);

/// Registry of node kinds and upgrade steps
#[derive(Default)]
pub struct NodeRegistry {
    kinds: RwLock<HashMap<String, Arc<dyn NodeKind>>>,
    upgrades: RwLock<HashMap<(String, u32), UpgradeStep>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every kind and upgrade submitted at link time
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for registration in inventory::iter::<KindRegistration> {
            registry.register((registration.0)());
        }
        for upgrade in inventory::iter::<UpgradeRegistration> {
            registry.register_upgrade(upgrade.kind, upgrade.from, upgrade.to, upgrade.apply);
        }
        log::debug!(
            "Registry initialised with {} built-in kinds",
            registry.kinds.read().len()
        );
        registry
    }

    /// Register a kind, replacing any kind with the same identifier
    pub fn register(&self, kind: Arc<dyn NodeKind>) {
        let id = kind.descriptor().kind;
        if self.kinds.write().insert(id.clone(), kind).is_some() {
            log::debug!("Replaced node kind '{}'", id);
        }
    }

    /// Register an upgrade from `from` to `to` for a kind
    pub fn register_upgrade(&self, kind: &str, from: u32, to: u32, apply: UpgradeFn) {
        self.upgrades
            .write()
            .insert((kind.to_string(), from), UpgradeStep { from, to, apply });
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeKind>> {
        self.kinds.read().get(kind).cloned()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.read().contains_key(kind)
    }

    pub fn descriptor(&self, kind: &str) -> Option<NodeDescriptor> {
        self.get(kind).map(|k| k.descriptor())
    }

    /// Registered kind identifiers, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.kinds.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Descriptors of every kind, sorted by identifier
    pub fn all_descriptors(&self) -> Vec<NodeDescriptor> {
        let mut all: Vec<NodeDescriptor> =
            self.kinds.read().values().map(|k| k.descriptor()).collect();
        all.sort_by(|a, b| a.kind.cmp(&b.kind));
        all
    }

    /// Descriptors grouped by category
    pub fn descriptors_by_category(&self) -> BTreeMap<String, Vec<NodeDescriptor>> {
        let mut grouped: BTreeMap<String, Vec<NodeDescriptor>> = BTreeMap::new();
        for descriptor in self.all_descriptors() {
            grouped
                .entry(category_key(descriptor.category))
                .or_default()
                .push(descriptor);
        }
        grouped
    }

    /// The upgrade step that starts at `version`, if any
    pub fn upgrade_from(&self, kind: &str, version: u32) -> Option<UpgradeStep> {
        self.upgrades
            .read()
            .get(&(kind.to_string(), version))
            .copied()
    }

    /// Build a fresh node of a kind and run its creation hook
    pub fn instantiate(&self, kind: &str, name: impl Into<String>) -> Result<Node> {
        let kind_impl = self
            .get(kind)
            .ok_or_else(|| EngineError::UnknownNodeKind(kind.to_string()))?;
        let descriptor = kind_impl.descriptor();

        let mut node = Node::new(kind, name);
        node.version = descriptor.version;
        node.properties = descriptor.default_properties();
        node.inputs = descriptor.inputs;
        node.outputs = descriptor.outputs;
        kind_impl.on_created(&mut node);
        Ok(node)
    }

    /// Move every kind and upgrade from `other` into this registry
    ///
    /// Entries from `other` win on conflicts.
    pub fn merge(&self, other: NodeRegistry) {
        self.kinds.write().extend(other.kinds.into_inner());
        self.upgrades.write().extend(other.upgrades.into_inner());
    }
}

fn category_key(category: NodeCategory) -> String {
    match category {
        NodeCategory::Input => "input",
        NodeCategory::Processing => "processing",
        NodeCategory::Output => "output",
        NodeCategory::Group => "group",
    }
    .to_string()
}
