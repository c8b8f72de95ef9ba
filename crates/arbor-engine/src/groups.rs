//! Group nodes
//!
//! A group node embeds a subtree. Inside it, a `group-input` node exposes
//! the group's inputs as outputs and a `group-output` node collects the
//! group's outputs as inputs. From the parent tree the group is one opaque
//! node; the engine evaluates the subtree when the group computes.
//!
//! # Example
//!
//! ```ignore
//! // Move three nodes into a new group; boundary links are rewired
//! let group = session.collapse_group("Noise Stack", &[a, b, c])?;
//!
//! // Later, dissolve it again
//! let restored = session.expand_group(group)?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::channel::SocketChannel;
use crate::descriptor::{NodeCategory, NodeDescriptor};
use crate::error::{EngineError, Result};
use crate::graph::{Link, Node, Tree};
use crate::registry::{KindRegistration, NodeKind, NodeRegistry};
use crate::types::{InputRef, NodeId, OutputRef, SocketDef};

pub const GROUP_KIND: &str = "group";
pub const GROUP_INPUT_KIND: &str = "group-input";
pub const GROUP_OUTPUT_KIND: &str = "group-output";

/// Node that evaluates an embedded subtree
///
/// Its sockets mirror the boundary nodes of its subtree, so any socket set
/// is a valid shape.
pub struct GroupKind;

impl NodeKind for GroupKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(GROUP_KIND, "Group", NodeCategory::Group)
            .description("Evaluates an embedded subtree as one node")
    }

    fn compute(&self, _channel: &mut SocketChannel<'_>) -> Result<()> {
        // The engine evaluates the subtree itself
        Err(EngineError::failed("group nodes are evaluated by the engine"))
    }

    fn check_shape(&self, node: &Node) -> std::result::Result<(), String> {
        match node.subtree {
            Some(_) => Ok(()),
            None => Err("group node has no subtree".to_string()),
        }
    }
}

/// Publishes the values fed into the enclosing group
pub struct GroupInputKind;

impl NodeKind for GroupInputKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(GROUP_INPUT_KIND, "Group Input", NodeCategory::Group)
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        let boundary = channel.boundary();
        for index in 0..channel.node().outputs.len() {
            let value = boundary.get(index).cloned().unwrap_or_default();
            channel.push_at(index, value)?;
        }
        Ok(())
    }

    fn check_shape(&self, _node: &Node) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Collects the values the enclosing group publishes
pub struct GroupOutputKind;

impl NodeKind for GroupOutputKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(GROUP_OUTPUT_KIND, "Group Output", NodeCategory::Group)
    }

    fn compute(&self, _channel: &mut SocketChannel<'_>) -> Result<()> {
        Ok(())
    }

    fn check_shape(&self, _node: &Node) -> std::result::Result<(), String> {
        Ok(())
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(GroupKind) }));
inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(GroupInputKind) }));
inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(GroupOutputKind) }));

/// Group-input nodes of a subtree, in creation order
pub fn group_inputs(subtree: &Tree) -> Vec<NodeId> {
    subtree
        .nodes()
        .filter(|n| n.kind == GROUP_INPUT_KIND)
        .map(|n| n.id)
        .collect()
}

/// The first group-output node of a subtree
pub fn group_output(subtree: &Tree) -> Option<NodeId> {
    subtree
        .nodes()
        .find(|n| n.kind == GROUP_OUTPUT_KIND)
        .map(|n| n.id)
}

/// Socket lists a group node should expose for its subtree
pub fn boundary_sockets(subtree: &Tree) -> (Vec<SocketDef>, Vec<SocketDef>) {
    let inputs = group_inputs(subtree)
        .first()
        .and_then(|id| subtree.node(*id))
        .map(|n| n.outputs.clone())
        .unwrap_or_default();
    let outputs = group_output(subtree)
        .and_then(|id| subtree.node(id))
        .map(|n| n.inputs.clone())
        .unwrap_or_default();
    (inputs, outputs)
}

/// Move `selection` into a new group node
///
/// Every link entering the selection becomes a group input; every output
/// read from outside becomes a group output. Returns the new group node.
pub fn collapse_into_group(
    tree: &mut Tree,
    registry: &NodeRegistry,
    name: &str,
    selection: &[NodeId],
) -> Result<NodeId> {
    let selected: BTreeSet<NodeId> = selection.iter().copied().collect();
    if selected.is_empty() {
        return Err(EngineError::InvalidTree("cannot group an empty selection".to_string()));
    }
    for id in &selected {
        tree.get(*id)?;
    }
    check_convex(tree, &selected)?;

    let links: Vec<Link> = tree.links().copied().collect();
    let internal: Vec<&Link> = links
        .iter()
        .filter(|l| selected.contains(&l.from.node) && selected.contains(&l.to.node))
        .collect();
    let incoming: Vec<&Link> = links
        .iter()
        .filter(|l| !selected.contains(&l.from.node) && selected.contains(&l.to.node))
        .collect();
    let outgoing: Vec<&Link> = links
        .iter()
        .filter(|l| selected.contains(&l.from.node) && !selected.contains(&l.to.node))
        .collect();
    let mut sources: Vec<OutputRef> = Vec::new();
    for link in &outgoing {
        if !sources.contains(&link.from) {
            sources.push(link.from);
        }
    }

    // Boundary sockets take the kind and name of the socket they stand for
    let mut input_sockets: Vec<SocketDef> = Vec::new();
    for link in &incoming {
        let socket = &tree.get(link.to.node)?.inputs[link.to.socket];
        let name = unique_name(&input_sockets, &socket.name);
        input_sockets.push(SocketDef::new(name, socket.kind));
    }
    let mut output_sockets: Vec<SocketDef> = Vec::new();
    for source in &sources {
        let socket = &tree.get(source.node)?.outputs[source.socket];
        let name = unique_name(&output_sockets, &socket.name);
        output_sockets.push(SocketDef::new(name, socket.kind));
    }

    let mut subtree = Tree::new(format!("{}/{}", tree.id, name), name);
    let mut input_node = registry.instantiate(GROUP_INPUT_KIND, "Group Input")?;
    input_node.outputs = input_sockets.clone();
    let input_id = subtree.add_node(input_node);

    let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
    for id in &selected {
        let node = tree.get(*id)?.clone();
        mapping.insert(*id, subtree.add_node(node));
    }

    let mut output_node = registry.instantiate(GROUP_OUTPUT_KIND, "Group Output")?;
    output_node.inputs = output_sockets.clone();
    let output_id = subtree.add_node(output_node);

    for link in &internal {
        subtree.add_link(
            OutputRef::new(mapping[&link.from.node], link.from.socket),
            InputRef::new(mapping[&link.to.node], link.to.socket),
        )?;
    }
    for (index, link) in incoming.iter().enumerate() {
        subtree.add_link(
            OutputRef::new(input_id, index),
            InputRef::new(mapping[&link.to.node], link.to.socket),
        )?;
    }
    for (index, source) in sources.iter().enumerate() {
        subtree.add_link(
            OutputRef::new(mapping[&source.node], source.socket),
            InputRef::new(output_id, index),
        )?;
    }

    let mut group = registry.instantiate(GROUP_KIND, name)?;
    group.inputs = input_sockets;
    group.outputs = output_sockets;
    group.subtree = Some(Box::new(subtree));

    for id in &selected {
        tree.remove_node(*id)?;
    }
    let group_id = tree.add_node(group);

    for (index, link) in incoming.iter().enumerate() {
        tree.add_link(link.from, InputRef::new(group_id, index))?;
    }
    for (index, source) in sources.iter().enumerate() {
        for link in outgoing.iter().filter(|l| l.from == *source) {
            tree.add_link(OutputRef::new(group_id, index), link.to)?;
        }
    }

    log::debug!(
        "Collapsed {} nodes into group {} ('{}') with {} inputs and {} outputs",
        selected.len(),
        group_id,
        name,
        incoming.len(),
        sources.len()
    );
    Ok(group_id)
}

/// Dissolve a group node back into its parent tree
///
/// Returns the ids the inner nodes received in the parent.
pub fn expand_group(tree: &mut Tree, group: NodeId) -> Result<Vec<NodeId>> {
    let group_node = tree.get(group)?.clone();
    let subtree = group_node
        .subtree
        .as_deref()
        .ok_or_else(|| EngineError::InvalidTree(format!("node {group} is not a group")))?;

    let feeds: HashMap<usize, OutputRef> = tree
        .incoming(group)
        .iter()
        .map(|l| (l.to.socket, l.from))
        .collect();
    let mut consumers: HashMap<usize, Vec<InputRef>> = HashMap::new();
    for link in tree.outgoing(group) {
        consumers.entry(link.from.socket).or_default().push(link.to);
    }

    let is_boundary = |id: NodeId| {
        subtree
            .node(id)
            .is_some_and(|n| n.kind == GROUP_INPUT_KIND || n.kind == GROUP_OUTPUT_KIND)
    };

    tree.remove_node(group)?;
    let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
    let mut restored = Vec::new();
    for node in subtree.nodes().filter(|n| !is_boundary(n.id)) {
        let id = tree.add_node(node.clone());
        mapping.insert(node.id, id);
        restored.push(id);
    }

    for link in subtree.links() {
        // Where the value entering this link comes from in the parent
        let sources: Vec<OutputRef> = if is_boundary(link.from.node) {
            feeds.get(&link.from.socket).copied().into_iter().collect()
        } else {
            vec![OutputRef::new(mapping[&link.from.node], link.from.socket)]
        };
        // Where it goes in the parent
        let targets: Vec<InputRef> = if is_boundary(link.to.node) {
            consumers.get(&link.to.socket).cloned().unwrap_or_default()
        } else {
            vec![InputRef::new(mapping[&link.to.node], link.to.socket)]
        };
        for source in &sources {
            for target in &targets {
                tree.add_link(*source, *target)?;
            }
        }
    }

    log::debug!("Expanded group {} into {} nodes", group, restored.len());
    Ok(restored)
}

/// Reject a selection that an outside path leaves and re-enters
fn check_convex(tree: &Tree, selected: &BTreeSet<NodeId>) -> Result<()> {
    let mut downstream: BTreeSet<NodeId> = BTreeSet::new();
    for id in selected {
        downstream.extend(tree.reachable_from(*id));
    }
    let offending: Vec<NodeId> = downstream
        .iter()
        .filter(|id| !selected.contains(id))
        .filter(|id| {
            tree.reachable_from(**id)
                .iter()
                .any(|reached| selected.contains(reached))
        })
        .copied()
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(EngineError::CyclicGraph { nodes: offending })
    }
}

fn unique_name(existing: &[SocketDef], base: &str) -> String {
    if !existing.iter().any(|s| s.name == base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}.{n:03}"))
        .find(|candidate| !existing.iter().any(|s| &s.name == candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketKind;

    struct Pass;

    impl NodeKind for Pass {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("pass", "Pass", NodeCategory::Processing)
                .input(SocketDef::new("In", SocketKind::Numbers))
                .input(SocketDef::new("Aux", SocketKind::Numbers))
                .output(SocketDef::new("Out", SocketKind::Numbers))
        }

        fn compute(&self, _channel: &mut SocketChannel<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> NodeRegistry {
        let registry = NodeRegistry::with_builtins();
        registry.register(Arc::new(Pass));
        registry
    }

    /// src -> a -> b -> sink, plus src -> b.Aux
    fn sample(registry: &NodeRegistry) -> (Tree, [NodeId; 4]) {
        let mut tree = Tree::new("main", "Main");
        let src = tree.add_node(registry.instantiate("pass", "src").unwrap());
        let a = tree.add_node(registry.instantiate("pass", "a").unwrap());
        let b = tree.add_node(registry.instantiate("pass", "b").unwrap());
        let sink = tree.add_node(registry.instantiate("pass", "sink").unwrap());
        tree.connect(src, "Out", a, "In").unwrap();
        tree.connect(a, "Out", b, "In").unwrap();
        tree.connect(src, "Out", b, "Aux").unwrap();
        tree.connect(b, "Out", sink, "In").unwrap();
        (tree, [src, a, b, sink])
    }

    #[test]
    fn test_collapse_rewires_boundary() {
        let registry = registry();
        let (mut tree, [src, a, b, sink]) = sample(&registry);

        let group = collapse_into_group(&mut tree, &registry, "Inner", &[a, b]).unwrap();
        assert!(!tree.contains(a) && !tree.contains(b));

        let node = tree.node(group).unwrap();
        assert_eq!(node.kind, GROUP_KIND);
        // Two incoming links (src -> a.In, src -> b.Aux), one exported output
        let names: Vec<&str> = node.inputs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["In", "Aux"]);
        assert_eq!(node.outputs.len(), 1);
        assert_eq!(tree.predecessors(group), vec![src]);
        assert_eq!(tree.successors(group), vec![sink]);

        let subtree = node.subtree.as_deref().unwrap();
        assert_eq!(subtree.node_count(), 4);
        assert_eq!(group_inputs(subtree).len(), 1);
        let (inputs, outputs) = boundary_sockets(subtree);
        assert_eq!(inputs, node.inputs);
        assert_eq!(outputs, node.outputs);
        // internal a -> b, two from group-input, one to group-output
        assert_eq!(subtree.link_count(), 4);
    }

    #[test]
    fn test_collapse_rejects_non_convex_selection() {
        let registry = registry();
        let (mut tree, [src, a, b, _sink]) = sample(&registry);
        // src and b selected, a lies on a path src -> a -> b outside the selection
        let err = collapse_into_group(&mut tree, &registry, "Bad", &[src, b]).unwrap_err();
        assert!(matches!(err, EngineError::CyclicGraph { nodes } if nodes == vec![a]));
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_expand_restores_topology() {
        let registry = registry();
        let (mut tree, [src, a, b, sink]) = sample(&registry);
        let group = collapse_into_group(&mut tree, &registry, "Inner", &[a, b]).unwrap();

        let restored = expand_group(&mut tree, group).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(!tree.contains(group));
        assert_eq!(tree.link_count(), 4);

        let (new_a, new_b) = (restored[0], restored[1]);
        assert_eq!(tree.node(new_a).unwrap().name, "a");
        assert_eq!(tree.predecessors(new_a), vec![src]);
        assert_eq!(tree.predecessors(new_b), vec![src, new_a]);
        assert_eq!(tree.successors(new_b), vec![sink]);
    }

    #[test]
    fn test_unique_socket_names() {
        let existing = vec![
            SocketDef::new("Value", SocketKind::Numbers),
            SocketDef::new("Value.001", SocketKind::Numbers),
        ];
        assert_eq!(unique_name(&existing, "Value"), "Value.002");
        assert_eq!(unique_name(&existing, "Other"), "Other");
    }

    #[test]
    fn test_group_kind_requires_subtree() {
        let node = Node::new(GROUP_KIND, "g");
        assert!(GroupKind.check_shape(&node).is_err());
    }
}
