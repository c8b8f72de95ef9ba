//! Topological scheduling
//!
//! Orders a node set with Kahn's algorithm, restricted to the set. When
//! several nodes are ready at once the one created first runs first, so the
//! same topology always yields the same order. Nodes left over when Kahn's
//! algorithm stalls are narrowed down to the strongly connected components
//! that actually form cycles.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use crate::error::{EngineError, Result};
use crate::graph::Tree;
use crate::types::NodeId;

/// Order `nodes` so that every node comes after its predecessors in the set
///
/// Fails with [`EngineError::CyclicGraph`] naming the cycle members.
pub fn schedule(tree: &Tree, nodes: &BTreeSet<NodeId>) -> Result<Vec<NodeId>> {
    let mut in_degree: BTreeMap<NodeId, usize> = nodes
        .iter()
        .filter(|id| tree.contains(**id))
        .map(|id| (*id, 0))
        .collect();
    for id in in_degree.keys().copied().collect::<Vec<_>>() {
        let inside = tree
            .predecessors(id)
            .into_iter()
            .filter(|p| in_degree.contains_key(p))
            .count();
        in_degree.insert(id, inside);
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for next in tree.successors(id) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
    }

    if order.len() < in_degree.len() {
        let done: BTreeSet<NodeId> = order.iter().copied().collect();
        let remaining: BTreeSet<NodeId> = in_degree
            .keys()
            .filter(|id| !done.contains(id))
            .copied()
            .collect();
        return Err(EngineError::CyclicGraph {
            nodes: cycle_members(tree, &remaining),
        });
    }
    Ok(order)
}

/// Members of non-trivial strongly connected components within `nodes`
///
/// Falls back to the whole set if no component qualifies.
pub fn cycle_members(tree: &Tree, nodes: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let mut tarjan = Tarjan::new(tree, nodes);
    for id in nodes {
        if !tarjan.index.contains_key(id) {
            tarjan.visit(*id);
        }
    }

    let mut members: Vec<NodeId> = tarjan
        .components
        .into_iter()
        .filter(|component| {
            component.len() > 1 || tree.successors(component[0]).contains(&component[0])
        })
        .flatten()
        .collect();
    if members.is_empty() {
        members = nodes.iter().copied().collect();
    }
    members.sort();
    members
}

struct Tarjan<'a> {
    tree: &'a Tree,
    scope: &'a BTreeSet<NodeId>,
    counter: usize,
    index: HashMap<NodeId, usize>,
    low: HashMap<NodeId, usize>,
    stack: Vec<NodeId>,
    on_stack: BTreeSet<NodeId>,
    components: Vec<Vec<NodeId>>,
}

impl<'a> Tarjan<'a> {
    fn new(tree: &'a Tree, scope: &'a BTreeSet<NodeId>) -> Self {
        Self {
            tree,
            scope,
            counter: 0,
            index: HashMap::new(),
            low: HashMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, id: NodeId) {
        self.index.insert(id, self.counter);
        self.low.insert(id, self.counter);
        self.counter += 1;
        self.stack.push(id);
        self.on_stack.insert(id);

        for next in self.tree.successors(id) {
            if !self.scope.contains(&next) {
                continue;
            }
            if !self.index.contains_key(&next) {
                self.visit(next);
                let low = self.low[&id].min(self.low[&next]);
                self.low.insert(id, low);
            } else if self.on_stack.contains(&next) {
                let low = self.low[&id].min(self.index[&next]);
                self.low.insert(id, low);
            }
        }

        if self.low[&id] == self.index[&id] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(&member);
                component.push(member);
                if member == id {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Caches the last computed order per node set and structure epoch
#[derive(Debug, Default, Clone)]
pub struct OrderCache {
    entry: Option<(u64, BTreeSet<NodeId>, Vec<NodeId>)>,
    hits: u64,
    misses: u64,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order `nodes`, reusing the cached order if neither the set nor the
    /// epoch changed
    pub fn order(&mut self, tree: &Tree, nodes: &BTreeSet<NodeId>, epoch: u64) -> Result<Vec<NodeId>> {
        if let Some((cached_epoch, cached_nodes, order)) = &self.entry {
            if *cached_epoch == epoch && cached_nodes == nodes {
                self.hits += 1;
                return Ok(order.clone());
            }
        }
        self.misses += 1;
        let order = schedule(tree, nodes)?;
        self.entry = Some((epoch, nodes.clone(), order.clone()));
        Ok(order)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::types::{InputRef, OutputRef, SocketDef, SocketKind};

    fn node(name: &str) -> Node {
        let mut node = Node::new("test", name);
        node.inputs.push(SocketDef::new("A", SocketKind::Numbers));
        node.inputs.push(SocketDef::new("B", SocketKind::Numbers));
        node.outputs.push(SocketDef::new("Out", SocketKind::Numbers));
        node
    }

    fn all(tree: &Tree) -> BTreeSet<NodeId> {
        tree.node_ids().into_iter().collect()
    }

    #[test]
    fn test_diamond_order() {
        let mut tree = Tree::new("t", "Test");
        let a = tree.add_node(node("a"));
        let b = tree.add_node(node("b"));
        let c = tree.add_node(node("c"));
        let d = tree.add_node(node("d"));
        tree.connect(a, "Out", c, "A").unwrap();
        tree.connect(a, "Out", b, "A").unwrap();
        tree.connect(b, "Out", d, "A").unwrap();
        tree.connect(c, "Out", d, "B").unwrap();

        assert_eq!(schedule(&tree, &all(&tree)).unwrap(), vec![a, b, c, d]);
    }

    #[test]
    fn test_tie_break_is_creation_order() {
        let mut tree = Tree::new("t", "Test");
        let sink = tree.add_node(node("sink"));
        let late = tree.add_node(node("late"));
        let other = tree.add_node(node("other"));
        tree.connect(late, "Out", sink, "A").unwrap();
        tree.connect(other, "Out", sink, "B").unwrap();

        let first = schedule(&tree, &all(&tree)).unwrap();
        let second = schedule(&tree, &all(&tree)).unwrap();
        assert_eq!(first, vec![late, other, sink]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_restricted_to_set() {
        let mut tree = Tree::new("t", "Test");
        let a = tree.add_node(node("a"));
        let b = tree.add_node(node("b"));
        let c = tree.add_node(node("c"));
        tree.connect(a, "Out", b, "A").unwrap();
        tree.connect(b, "Out", c, "A").unwrap();

        let subset = BTreeSet::from([b, c]);
        assert_eq!(schedule(&tree, &subset).unwrap(), vec![b, c]);
    }

    #[test]
    fn test_cycle_reports_members_only() {
        // x -> a -> b -> a, b -> y
        let x = node("x");
        let mut nodes = Vec::new();
        for (i, mut n) in [x, node("a"), node("b"), node("y")].into_iter().enumerate() {
            n.id = NodeId(i as u64 + 1);
            nodes.push(n);
        }
        let links = vec![
            (OutputRef::new(NodeId(1), 0), InputRef::new(NodeId(2), 0)),
            (OutputRef::new(NodeId(2), 0), InputRef::new(NodeId(3), 0)),
            (OutputRef::new(NodeId(3), 0), InputRef::new(NodeId(2), 1)),
            (OutputRef::new(NodeId(3), 0), InputRef::new(NodeId(4), 0)),
        ];
        let tree = Tree::from_parts("t", "Cyclic", nodes, links).unwrap();

        let err = schedule(&tree, &all(&tree)).unwrap_err();
        match err {
            EngineError::CyclicGraph { nodes } => assert_eq!(nodes, vec![NodeId(2), NodeId(3)]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_order_cache_keyed_by_epoch_and_set() {
        let mut tree = Tree::new("t", "Test");
        let a = tree.add_node(node("a"));
        let b = tree.add_node(node("b"));
        tree.connect(a, "Out", b, "A").unwrap();

        let mut cache = OrderCache::new();
        let set = all(&tree);
        cache.order(&tree, &set, 0).unwrap();
        cache.order(&tree, &set, 0).unwrap();
        assert_eq!(cache.stats(), (1, 1));

        cache.order(&tree, &set, 1).unwrap();
        cache.order(&tree, &BTreeSet::from([b]), 1).unwrap();
        assert_eq!(cache.stats(), (1, 3));
    }
}
