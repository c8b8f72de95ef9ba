//! Dirty tracking
//!
//! Marking a node stale marks its whole forward closure, so the dirty set is
//! always closed under successors and a pass can schedule it as-is.

use std::collections::BTreeSet;

use crate::graph::Tree;
use crate::types::NodeId;

/// Stale nodes of one tree plus its structure epoch
#[derive(Debug, Clone, Default)]
pub struct DirtyState {
    dirty: BTreeSet<NodeId>,
    epoch: u64,
}

impl DirtyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node and everything reachable forward from it
    ///
    /// Returns the nodes that were not already dirty.
    pub fn mark(&mut self, tree: &Tree, node: NodeId) -> Vec<NodeId> {
        tree.reachable_from(node)
            .into_iter()
            .filter(|id| self.dirty.insert(*id))
            .collect()
    }

    /// Mark several nodes in one batch
    pub fn mark_many(&mut self, tree: &Tree, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut newly = Vec::new();
        for node in nodes {
            newly.extend(self.mark(tree, *node));
        }
        newly.sort();
        newly
    }

    /// Mark every node of the tree
    pub fn mark_all(&mut self, tree: &Tree) {
        self.dirty.extend(tree.node_ids());
    }

    /// Drop a node from the dirty set after it settled
    pub fn settle(&mut self, node: NodeId) {
        self.dirty.remove(&node);
    }

    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.dirty.contains(&node)
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.dirty
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Structure epoch; changes whenever nodes or links change
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn bump_epoch(&mut self) {
        self.epoch += 1;
    }
}
