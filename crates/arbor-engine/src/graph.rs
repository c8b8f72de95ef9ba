//! Graph model: nodes, links and the tree that owns them
//!
//! The tree keeps an adjacency index next to its node and link tables. Every
//! add/remove updates the index in place, so predecessor and successor
//! queries cost O(degree). The index is only rebuilt from scratch after a
//! bulk load.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::error::{EngineError, Result};
use crate::types::{InputRef, LinkId, NodeId, OutputRef, SocketDef};

/// A node instance in a tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// User-visible name
    pub name: String,
    /// Registered kind identifier
    pub kind: String,
    /// Schema version the node was created with
    pub version: u32,
    /// Node-local configuration
    pub properties: BTreeMap<String, serde_json::Value>,
    pub inputs: Vec<SocketDef>,
    pub outputs: Vec<SocketDef>,
    /// Embedded subgraph of a group node
    pub subtree: Option<Box<Tree>>,
    /// Set when the node could not be reconciled with its registered kind
    pub flag: Option<String>,
}

impl Node {
    /// Create a detached node; the id is assigned when it joins a tree
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: NodeId(0),
            name: name.into(),
            kind: kind.into(),
            version: 1,
            properties: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            subtree: None,
            flag: None,
        }
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    pub fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }
}

/// A directed edge from an output socket to an input socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub from: OutputRef,
    pub to: InputRef,
}

/// A dataflow graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub id: String,
    pub name: String,
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    /// Incoming links per node
    in_links: HashMap<NodeId, BTreeSet<LinkId>>,
    /// Outgoing links per node
    out_links: HashMap<NodeId, BTreeSet<LinkId>>,
    /// At most one link per input socket
    input_link: HashMap<InputRef, LinkId>,
    /// Fan-out per output socket
    output_links: HashMap<OutputRef, BTreeSet<LinkId>>,
    next_node: u64,
    next_link: u64,
}

impl Tree {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            next_node: 1,
            next_link: 1,
            ..Self::default()
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(EngineError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Links in creation order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Find a node by its user-visible name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.values().find(|n| n.name == name).map(|n| n.id)
    }

    /// The link feeding an input socket, if any
    pub fn input_link(&self, input: InputRef) -> Option<&Link> {
        self.input_link
            .get(&input)
            .and_then(|id| self.links.get(id))
    }

    /// Links leaving an output socket
    pub fn output_links(&self, output: OutputRef) -> Vec<&Link> {
        self.output_links
            .get(&output)
            .into_iter()
            .flatten()
            .filter_map(|id| self.links.get(id))
            .collect()
    }

    pub fn is_output_linked(&self, output: OutputRef) -> bool {
        self.output_links
            .get(&output)
            .is_some_and(|links| !links.is_empty())
    }

    pub fn is_input_linked(&self, input: InputRef) -> bool {
        self.input_link.contains_key(&input)
    }

    /// Whether any output of the node feeds another node
    pub fn any_output_linked(&self, id: NodeId) -> bool {
        self.out_links.get(&id).is_some_and(|links| !links.is_empty())
    }

    /// Links ending at the node
    pub fn incoming(&self, id: NodeId) -> Vec<&Link> {
        self.in_links
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|l| self.links.get(l))
            .collect()
    }

    /// Links starting at the node
    pub fn outgoing(&self, id: NodeId) -> Vec<&Link> {
        self.out_links
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|l| self.links.get(l))
            .collect()
    }

    /// Distinct nodes feeding this node, in creation order
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = self.incoming(id).iter().map(|l| l.from.node).collect();
        set.into_iter().collect()
    }

    /// Distinct nodes fed by this node, in creation order
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = self.outgoing(id).iter().map(|l| l.to.node).collect();
        set.into_iter().collect()
    }

    /// The node and everything reachable forward from it
    pub fn reachable_from(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        if !self.contains(id) {
            return seen;
        }
        let mut queue = VecDeque::from([id]);
        seen.insert(id);
        while let Some(current) = queue.pop_front() {
            for next in self.successors(current) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// A forward path `from -> ... -> to`, if one exists
    fn path_between(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = BTreeSet::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = parent.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.successors(current) {
                if seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Insert a node, assigning it the next creation-order id
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.next_node.max(1));
        self.next_node = id.0 + 1;
        node.id = id;
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node after severing every incident link
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        if !self.contains(id) {
            return Err(EngineError::UnknownNode(id));
        }
        let incident: BTreeSet<LinkId> = self
            .in_links
            .get(&id)
            .into_iter()
            .chain(self.out_links.get(&id))
            .flatten()
            .copied()
            .collect();
        for link in incident {
            self.remove_link(link)?;
        }
        self.in_links.remove(&id);
        self.out_links.remove(&id);
        self.nodes.remove(&id).ok_or(EngineError::UnknownNode(id))
    }

    /// Link an output socket to an input socket
    ///
    /// Fails without touching the tree when a socket does not exist, the
    /// kinds are not convertible, the input is already linked, or the link
    /// would close a cycle.
    pub fn add_link(&mut self, from: OutputRef, to: InputRef) -> Result<LinkId> {
        let source = self.get(from.node)?;
        let target = self.get(to.node)?;
        let out_kind = source
            .outputs
            .get(from.socket)
            .ok_or_else(|| EngineError::UnknownSocket {
                node: from.node,
                socket: format!("output {}", from.socket),
            })?
            .kind;
        let in_socket = target
            .inputs
            .get(to.socket)
            .ok_or_else(|| EngineError::UnknownSocket {
                node: to.node,
                socket: format!("input {}", to.socket),
            })?;

        if !out_kind.is_convertible_to(in_socket.kind) {
            return Err(EngineError::IncompatibleSocket {
                from: out_kind,
                to: in_socket.kind,
            });
        }
        if self.input_link.contains_key(&to) {
            return Err(EngineError::DuplicateInputLink {
                node: to.node,
                socket: in_socket.name.clone(),
            });
        }
        if let Some(mut path) = self.path_between(to.node, from.node) {
            path.sort();
            path.dedup();
            return Err(EngineError::CyclicGraph { nodes: path });
        }

        Ok(self.insert_link(from, to))
    }

    /// Link two sockets addressed by name
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_socket: &str,
        to_node: NodeId,
        to_socket: &str,
    ) -> Result<LinkId> {
        let output = self
            .get(from_node)?
            .output_index(from_socket)
            .ok_or_else(|| EngineError::UnknownSocket {
                node: from_node,
                socket: from_socket.to_string(),
            })?;
        let input = self
            .get(to_node)?
            .input_index(to_socket)
            .ok_or_else(|| EngineError::UnknownSocket {
                node: to_node,
                socket: to_socket.to_string(),
            })?;
        self.add_link(OutputRef::new(from_node, output), InputRef::new(to_node, input))
    }

    pub fn remove_link(&mut self, id: LinkId) -> Result<Link> {
        let link = self.links.remove(&id).ok_or(EngineError::UnknownLink(id))?;
        if let Some(set) = self.in_links.get_mut(&link.to.node) {
            set.remove(&id);
        }
        if let Some(set) = self.out_links.get_mut(&link.from.node) {
            set.remove(&id);
        }
        if let Some(set) = self.output_links.get_mut(&link.from) {
            set.remove(&id);
            if set.is_empty() {
                self.output_links.remove(&link.from);
            }
        }
        self.input_link.remove(&link.to);
        Ok(link)
    }

    /// Swap an output socket definition in place
    ///
    /// Links whose destination still accepts the new kind survive; the rest
    /// are removed and returned.
    pub fn replace_output_socket(
        &mut self,
        node: NodeId,
        index: usize,
        socket: SocketDef,
    ) -> Result<Vec<Link>> {
        let kind = socket.kind;
        let target = self.nodes.get_mut(&node).ok_or(EngineError::UnknownNode(node))?;
        let slot = target
            .outputs
            .get_mut(index)
            .ok_or_else(|| EngineError::UnknownSocket {
                node,
                socket: format!("output {index}"),
            })?;
        *slot = socket;

        let stale: Vec<LinkId> = self
            .output_links(OutputRef::new(node, index))
            .into_iter()
            .filter(|link| {
                self.nodes
                    .get(&link.to.node)
                    .and_then(|n| n.inputs.get(link.to.socket))
                    .map_or(true, |input| !kind.is_convertible_to(input.kind))
            })
            .map(|link| link.id)
            .collect();

        stale.into_iter().map(|id| self.remove_link(id)).collect()
    }

    /// Replace a node's definition and rebind its links to the new sockets
    ///
    /// Each link endpoint is matched by socket name first, then by its old
    /// position. Endpoints that no longer fit are dropped.
    pub fn rewrite_node(&mut self, id: NodeId, mut replacement: Node) -> Result<Vec<Link>> {
        let old = self.nodes.get(&id).ok_or(EngineError::UnknownNode(id))?.clone();
        replacement.id = id;

        let incident: Vec<Link> = self
            .incoming(id)
            .into_iter()
            .chain(self.outgoing(id))
            .copied()
            .collect();
        for link in &incident {
            self.remove_link(link.id)?;
        }
        self.nodes.insert(id, replacement);

        let mut dropped = Vec::new();
        for link in incident {
            let mut from = link.from;
            let mut to = link.to;
            if from.node == id {
                match rebind(&old.outputs, from.socket, &self.get(id)?.outputs) {
                    Some(index) => from.socket = index,
                    None => {
                        dropped.push(link);
                        continue;
                    }
                }
            }
            if to.node == id {
                match rebind(&old.inputs, to.socket, &self.get(id)?.inputs) {
                    Some(index) => to.socket = index,
                    None => {
                        dropped.push(link);
                        continue;
                    }
                }
            }
            if self.add_link(from, to).is_err() {
                dropped.push(link);
            }
        }
        for link in &dropped {
            log::warn!(
                "Dropped {} ({} -> {}) while rewriting node {}",
                link.id,
                link.from.node,
                link.to.node,
                id
            );
        }
        Ok(dropped)
    }

    // =========================================================================
    // Bulk load
    // =========================================================================

    /// Build a tree from nodes and links in one step
    ///
    /// Links are checked for dangling endpoints and duplicate inputs but not
    /// for cycles; a cyclic bulk-loaded tree is reported by the scheduler.
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<Node>,
        links: Vec<(OutputRef, InputRef)>,
    ) -> Result<Self> {
        let mut tree = Self::new(id, name);
        let mut bound_inputs = BTreeSet::new();
        for node in nodes {
            tree.next_node = tree.next_node.max(node.id.0 + 1);
            tree.nodes.insert(node.id, node);
        }
        for (from, to) in links {
            let source = tree
                .node(from.node)
                .ok_or_else(|| EngineError::InvalidTree(format!("link source {} missing", from.node)))?;
            let target = tree
                .node(to.node)
                .ok_or_else(|| EngineError::InvalidTree(format!("link target {} missing", to.node)))?;
            if from.socket >= source.outputs.len() || to.socket >= target.inputs.len() {
                return Err(EngineError::InvalidTree(format!(
                    "link {} -> {} references a missing socket",
                    from.node, to.node
                )));
            }
            if !bound_inputs.insert(to) {
                return Err(EngineError::InvalidTree(format!(
                    "input {} on node {} has more than one link",
                    to.socket, to.node
                )));
            }
            tree.links.insert(
                LinkId(tree.next_link),
                Link {
                    id: LinkId(tree.next_link),
                    from,
                    to,
                },
            );
            tree.next_link += 1;
        }
        tree.rebuild_index();
        Ok(tree)
    }

    fn insert_link(&mut self, from: OutputRef, to: InputRef) -> LinkId {
        let id = LinkId(self.next_link.max(1));
        self.next_link = id.0 + 1;
        self.links.insert(id, Link { id, from, to });
        self.index_link(id, from, to);
        id
    }

    fn index_link(&mut self, id: LinkId, from: OutputRef, to: InputRef) {
        self.in_links.entry(to.node).or_default().insert(id);
        self.out_links.entry(from.node).or_default().insert(id);
        self.output_links.entry(from).or_default().insert(id);
        self.input_link.insert(to, id);
    }

    fn rebuild_index(&mut self) {
        self.in_links.clear();
        self.out_links.clear();
        self.output_links.clear();
        self.input_link.clear();
        let links: Vec<Link> = self.links.values().copied().collect();
        for link in links {
            self.index_link(link.id, link.from, link.to);
        }
    }
}

fn rebind(old: &[SocketDef], index: usize, new: &[SocketDef]) -> Option<usize> {
    let previous = old.get(index)?;
    if let Some(position) = new.iter().position(|s| s.name == previous.name) {
        return Some(position);
    }
    new.get(index)
        .filter(|s| previous.kind.is_convertible_to(s.kind))
        .map(|_| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketKind;

    fn numbers_node(name: &str) -> Node {
        let mut node = Node::new("test", name);
        node.inputs.push(SocketDef::new("In", SocketKind::Numbers));
        node.inputs.push(SocketDef::new("Aux", SocketKind::Numbers));
        node.outputs.push(SocketDef::new("Out", SocketKind::Numbers));
        node
    }

    fn chain() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new("t", "Test");
        let a = tree.add_node(numbers_node("a"));
        let b = tree.add_node(numbers_node("b"));
        let c = tree.add_node(numbers_node("c"));
        tree.connect(a, "Out", b, "In").unwrap();
        tree.connect(b, "Out", c, "In").unwrap();
        (tree, a, b, c)
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let (tree, a, b, c) = chain();
        assert!(a < b && b < c);
        assert_eq!(tree.node_ids(), vec![a, b, c]);
    }

    #[test]
    fn test_predecessors_and_successors() {
        let (mut tree, a, b, c) = chain();
        tree.connect(a, "Out", c, "Aux").unwrap();

        assert_eq!(tree.successors(a), vec![b, c]);
        assert_eq!(tree.predecessors(c), vec![a, b]);
        assert!(tree.predecessors(a).is_empty());
    }

    #[test]
    fn test_incompatible_socket_rejected() {
        let mut tree = Tree::new("t", "Test");
        let mut verts = Node::new("test", "verts");
        verts.outputs.push(SocketDef::new("Vertices", SocketKind::Vertices));
        let v = tree.add_node(verts);
        let n = tree.add_node(numbers_node("n"));

        let err = tree.connect(v, "Vertices", n, "In").unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleSocket { .. }));
        assert_eq!(tree.link_count(), 0);
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let (mut tree, a, _b, c) = chain();
        let err = tree.connect(a, "Out", c, "In").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateInputLink { .. }));
        assert_eq!(tree.link_count(), 2);
    }

    #[test]
    fn test_closing_edge_rejected_as_cycle() {
        let (mut tree, a, b, c) = chain();
        let err = tree.connect(c, "Out", a, "Aux").unwrap_err();
        match err {
            EngineError::CyclicGraph { nodes } => assert_eq!(nodes, vec![a, b, c]),
            other => panic!("unexpected error: {other}"),
        }

        // Self-loop
        let err = tree.connect(b, "Out", b, "Aux").unwrap_err();
        assert!(matches!(err, EngineError::CyclicGraph { nodes } if nodes == vec![b]));
    }

    #[test]
    fn test_remove_node_severs_links() {
        let (mut tree, a, b, c) = chain();
        tree.remove_node(b).unwrap();

        assert_eq!(tree.link_count(), 0);
        assert!(tree.successors(a).is_empty());
        assert!(tree.predecessors(c).is_empty());
        assert!(!tree.is_input_linked(InputRef::new(c, 0)));
        assert!(matches!(tree.remove_node(b), Err(EngineError::UnknownNode(_))));
    }

    #[test]
    fn test_reachable_from() {
        let (mut tree, a, b, c) = chain();
        let d = tree.add_node(numbers_node("d"));
        assert_eq!(tree.reachable_from(b), BTreeSet::from([b, c]));
        assert_eq!(tree.reachable_from(a), BTreeSet::from([a, b, c]));
        assert_eq!(tree.reachable_from(d), BTreeSet::from([d]));
    }

    #[test]
    fn test_replace_output_socket_drops_incompatible_links() {
        let (mut tree, a, b, _c) = chain();
        let dropped = tree
            .replace_output_socket(a, 0, SocketDef::new("Out", SocketKind::Vertices))
            .unwrap();
        assert_eq!(dropped.len(), 1);
        assert!(tree.successors(a).is_empty());

        // Back to a compatible kind: the b -> c link is untouched
        let kept = tree
            .replace_output_socket(b, 0, SocketDef::new("Out", SocketKind::Edges))
            .unwrap();
        assert!(kept.is_empty());
        assert_eq!(tree.link_count(), 1);
    }

    #[test]
    fn test_rewrite_node_rebinds_by_name() {
        let (mut tree, a, b, c) = chain();
        let mut replacement = tree.node(b).unwrap().clone();
        // Swap input order; the link to "In" must follow the name
        replacement.inputs.reverse();
        let dropped = tree.rewrite_node(b, replacement).unwrap();

        assert!(dropped.is_empty());
        let link = tree.incoming(b)[0];
        assert_eq!(link.from.node, a);
        assert_eq!(link.to.socket, 1);
        assert_eq!(tree.successors(b), vec![c]);
    }

    #[test]
    fn test_from_parts_allows_cycles_but_checks_sockets() {
        let mut a = numbers_node("a");
        a.id = NodeId(1);
        let mut b = numbers_node("b");
        b.id = NodeId(2);
        let tree = Tree::from_parts(
            "t",
            "Loaded",
            vec![a.clone(), b.clone()],
            vec![
                (OutputRef::new(NodeId(1), 0), InputRef::new(NodeId(2), 0)),
                (OutputRef::new(NodeId(2), 0), InputRef::new(NodeId(1), 0)),
            ],
        )
        .unwrap();
        assert_eq!(tree.successors(NodeId(1)), vec![NodeId(2)]);
        assert_eq!(tree.successors(NodeId(2)), vec![NodeId(1)]);

        let err = Tree::from_parts(
            "t",
            "Broken",
            vec![a, b],
            vec![(OutputRef::new(NodeId(1), 3), InputRef::new(NodeId(2), 0))],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTree(_)));
    }

    #[test]
    fn test_new_ids_after_bulk_load_do_not_collide() {
        let mut a = numbers_node("a");
        a.id = NodeId(5);
        let mut tree = Tree::from_parts("t", "Loaded", vec![a], Vec::new()).unwrap();
        let next = tree.add_node(numbers_node("b"));
        assert_eq!(next, NodeId(6));
    }
}
