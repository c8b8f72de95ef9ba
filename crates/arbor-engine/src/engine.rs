//! Pass executor
//!
//! A [`TreeSession`] owns one tree together with its evaluation state: the
//! dirty set, per-node status, the output cache and the cached schedule.
//! Every edit goes through the session so the dirty closure stays current.
//! [`Engine::run_pass`] then orders the dirty closure and computes it
//! sequentially, committing each node's outputs as soon as it succeeds.
//!
//! Group nodes are opaque in their parent tree. When one computes, the
//! engine evaluates its subtree with a nested state of its own, feeding the
//! group's resolved inputs to the subtree's `group-input` nodes.
//!
//! # Example
//!
//! ```ignore
//! let engine = Engine::new(Arc::new(NodeRegistry::with_builtins()));
//! let mut session = engine.new_tree("main", "Main");
//! let a = session.add_node("number", "A")?;
//! let vec = session.add_node("vector-in", "Vector")?;
//! let view = session.add_node("mesh-viewer", "Viewer")?;
//! session.connect(a, "Value", vec, "X")?;
//! session.connect(vec, "Vectors", view, "Vertices")?;
//!
//! let report = engine.run_pass(&mut session);
//! assert!(report.is_ok());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::channel::{resolve_input, OutputCache, PushedOutput, SocketChannel};
use crate::config::EngineConfig;
use crate::dirty::DirtyState;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, NullEventSink};
use crate::extensions::ExecutorExtensions;
use crate::graph::{Link, Node, Tree};
use crate::groups::{self, GROUP_KIND};
use crate::persist::PersistedTree;
use crate::registry::NodeRegistry;
use crate::scheduler::OrderCache;
use crate::types::{InputRef, LinkId, NodeId, NodeStatus, OutputRef, SocketDef};
use crate::upgrade::{upgrade_tree, UpgradeReport};
use crate::value::NestedValue;

/// Shared flag that stops a pass between two node steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one pass
#[derive(Debug)]
pub struct PassReport {
    pub pass_id: String,
    pub tree_id: String,
    /// Scheduled order of the dirty closure
    pub order: Vec<NodeId>,
    pub computed: Vec<NodeId>,
    /// Pure nodes left dirty because nothing reads them
    pub skipped: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub errors: Vec<EngineError>,
    pub cancelled: bool,
}

impl PassReport {
    fn new(ctx: &PassContext) -> Self {
        Self {
            pass_id: ctx.pass_id.clone(),
            tree_id: ctx.tree_id.clone(),
            order: Vec::new(),
            computed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

#[derive(Debug, Clone)]
struct PassContext {
    tree_id: String,
    pass_id: String,
    pass: u64,
}

/// Evaluation state of one tree; group subtrees nest their own
#[derive(Debug, Default)]
struct TreeState {
    dirty: DirtyState,
    status: BTreeMap<NodeId, NodeStatus>,
    cache: OutputCache,
    order: OrderCache,
    groups: BTreeMap<NodeId, TreeState>,
    compute_counts: BTreeMap<NodeId, u64>,
}

impl TreeState {
    fn new(tree: &Tree) -> Self {
        let mut state = Self::default();
        state.dirty.mark_all(tree);
        for id in tree.node_ids() {
            state.status.insert(id, NodeStatus::Dirty);
        }
        state
    }

    fn mark(&mut self, tree: &Tree, nodes: &[NodeId]) -> Vec<NodeId> {
        let newly = self.dirty.mark_many(tree, nodes);
        for id in &newly {
            self.status.insert(*id, NodeStatus::Dirty);
        }
        newly
    }

    fn mark_all(&mut self, tree: &Tree) {
        self.dirty.mark_all(tree);
        self.order.invalidate();
        for id in tree.node_ids() {
            self.status.insert(id, NodeStatus::Dirty);
        }
        for node in tree.nodes() {
            if let (Some(subtree), Some(sub)) =
                (node.subtree.as_deref(), self.groups.get_mut(&node.id))
            {
                sub.mark_all(subtree);
            }
        }
    }

    fn forget(&mut self, id: NodeId) {
        self.dirty.settle(id);
        self.status.remove(&id);
        self.cache.evict(id);
        self.groups.remove(&id);
        self.compute_counts.remove(&id);
    }
}

/// A tree plus the state needed to evaluate it incrementally
pub struct TreeSession {
    tree: Tree,
    state: TreeState,
    registry: Arc<NodeRegistry>,
    extensions: Arc<ExecutorExtensions>,
    events: Arc<dyn EventSink>,
    passes: u64,
}

impl TreeSession {
    fn new(
        tree: Tree,
        registry: Arc<NodeRegistry>,
        extensions: Arc<ExecutorExtensions>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let state = TreeState::new(&tree);
        Self {
            tree,
            state,
            registry,
            extensions,
            events,
            passes: 0,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn id(&self) -> &str {
        &self.tree.id
    }

    /// Create a node of a registered kind
    pub fn add_node(&mut self, kind: &str, name: impl Into<String>) -> Result<NodeId> {
        let node = self.registry.instantiate(kind, name)?;
        let id = self.tree.add_node(node);
        self.structure_changed(&[id]);
        Ok(id)
    }

    /// Remove a node and its links, running its kind's removal hook
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let successors = self.tree.successors(id);
        let node = self.tree.remove_node(id)?;
        notify_removed(&self.registry, &self.extensions, &node);
        self.state.forget(id);
        self.structure_changed(&successors);
        Ok(node)
    }

    pub fn add_link(&mut self, from: OutputRef, to: InputRef) -> Result<LinkId> {
        let link = self.tree.add_link(from, to)?;
        self.structure_changed(&[to.node]);
        Ok(link)
    }

    /// Link two sockets by name
    pub fn connect(
        &mut self,
        from: NodeId,
        from_socket: &str,
        to: NodeId,
        to_socket: &str,
    ) -> Result<LinkId> {
        let link = self.tree.connect(from, from_socket, to, to_socket)?;
        self.structure_changed(&[to]);
        Ok(link)
    }

    pub fn remove_link(&mut self, id: LinkId) -> Result<Link> {
        let link = self.tree.remove_link(id)?;
        self.structure_changed(&[link.to.node]);
        Ok(link)
    }

    /// Set a property and mark the node's forward closure dirty
    pub fn set_property(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<()> {
        self.tree
            .node_mut(node)
            .ok_or(EngineError::UnknownNode(node))?
            .properties
            .insert(name.into(), value);
        self.touch(&[node]);
        Ok(())
    }

    /// Swap an output socket definition; returns the links that no longer fit
    pub fn replace_output_socket(
        &mut self,
        node: NodeId,
        index: usize,
        socket: SocketDef,
    ) -> Result<Vec<Link>> {
        let dropped = self.tree.replace_output_socket(node, index, socket)?;
        let mut affected = vec![node];
        affected.extend(dropped.iter().map(|l| l.to.node));
        self.structure_changed(&affected);
        Ok(dropped)
    }

    /// Mark nodes and their forward closure dirty; returns newly dirty nodes
    pub fn mark_dirty(&mut self, nodes: &[NodeId]) -> Vec<NodeId> {
        let existing: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|id| self.tree.contains(*id))
            .collect();
        self.touch(&existing)
    }

    /// Mark every node dirty, group subtrees included
    pub fn invalidate_all(&mut self) {
        self.state.mark_all(&self.tree);
        log::debug!("Invalidated all nodes of tree '{}'", self.tree.id);
        self.emit(EngineEvent::TreeModified {
            tree_id: self.tree.id.clone(),
            dirty: self.tree.node_ids(),
        });
    }

    /// Move `selection` into a new group node
    pub fn collapse_group(&mut self, name: &str, selection: &[NodeId]) -> Result<NodeId> {
        let group = groups::collapse_into_group(&mut self.tree, &self.registry, name, selection)?;
        for id in selection {
            self.state.forget(*id);
        }
        self.structure_changed(&[group]);
        Ok(group)
    }

    /// Dissolve a group node; returns the ids of the restored nodes
    pub fn expand_group(&mut self, group: NodeId) -> Result<Vec<NodeId>> {
        let successors = self.tree.successors(group);
        let restored = groups::expand_group(&mut self.tree, group)?;
        self.state.forget(group);
        let mut affected = restored.clone();
        affected.extend(successors.into_iter().filter(|id| self.tree.contains(*id)));
        self.structure_changed(&affected);
        Ok(restored)
    }

    /// Edit a group's subtree in place
    ///
    /// The whole subtree and the group node become dirty; the group's
    /// sockets are resynchronised with the subtree's boundary nodes.
    pub fn edit_group<R>(&mut self, group: NodeId, edit: impl FnOnce(&mut Tree) -> Result<R>) -> Result<R> {
        let node = self.tree.node_mut(group).ok_or(EngineError::UnknownNode(group))?;
        let subtree = node
            .subtree
            .as_deref_mut()
            .ok_or_else(|| EngineError::InvalidTree(format!("node {group} is not a group")))?;
        let result = edit(subtree);
        let (inputs, outputs) = groups::boundary_sockets(subtree);

        self.state.groups.remove(&group);
        let mut affected = vec![group];
        if node.inputs != inputs || node.outputs != outputs {
            let mut replacement = node.clone();
            replacement.inputs = inputs;
            replacement.outputs = outputs;
            let dropped = self.tree.rewrite_node(group, replacement)?;
            affected.extend(dropped.iter().map(|l| l.to.node));
        }
        self.structure_changed(&affected);
        result
    }

    /// Swap in a different tree (e.g. an undo snapshot); everything is dirty
    pub fn replace_tree(&mut self, tree: Tree) {
        self.tree = tree;
        self.state = TreeState::new(&self.tree);
        self.emit(EngineEvent::TreeModified {
            tree_id: self.tree.id.clone(),
            dirty: self.tree.node_ids(),
        });
    }

    /// Replace the tree with a snapshot, e.g. one returned by an [`UndoStack`]
    ///
    /// Snapshots do not keep node ids, so nodes are matched by name and
    /// kind; live nodes without a match get their removal hook.
    ///
    /// [`UndoStack`]: crate::UndoStack
    pub fn restore(&mut self, snapshot: &PersistedTree) -> Result<()> {
        let tree = snapshot.to_tree()?;
        let kept: BTreeSet<(&str, &str)> = snapshot
            .nodes
            .iter()
            .map(|n| (n.name.as_str(), n.kind.as_str()))
            .collect();
        for node in self.tree.nodes() {
            if !kept.contains(&(node.name.as_str(), node.kind.as_str())) {
                notify_removed(&self.registry, &self.extensions, node);
            }
        }
        self.replace_tree(tree);
        Ok(())
    }

    pub fn status(&self, node: NodeId) -> Option<NodeStatus> {
        self.state.status.get(&node).copied()
    }

    /// Cached value of an output socket, by name
    pub fn output(&self, node: NodeId, socket: &str) -> Option<&NestedValue> {
        let index = self.tree.node(node)?.output_index(socket)?;
        self.state.cache.value(OutputRef::new(node, index))
    }

    pub fn output_at(&self, output: OutputRef) -> Option<&NestedValue> {
        self.state.cache.value(output)
    }

    /// Number of successful computes of a node since it was created
    pub fn compute_count(&self, node: NodeId) -> u64 {
        self.state.compute_counts.get(&node).copied().unwrap_or(0)
    }

    /// Nodes the upgrade layer could not reconcile, with the reason
    pub fn flagged(&self) -> Vec<(NodeId, String)> {
        self.tree
            .nodes()
            .filter_map(|n| n.flag.as_ref().map(|reason| (n.id, reason.clone())))
            .collect()
    }

    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.state.dirty.nodes().iter().copied().collect()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// (hits, misses) of the schedule cache
    pub fn order_stats(&self) -> (u64, u64) {
        self.state.order.stats()
    }

    pub fn to_persisted(&self) -> PersistedTree {
        PersistedTree::from_tree(&self.tree)
    }

    fn structure_changed(&mut self, affected: &[NodeId]) {
        self.state.dirty.bump_epoch();
        self.touch(affected);
    }

    fn touch(&mut self, nodes: &[NodeId]) -> Vec<NodeId> {
        let newly = self.state.mark(&self.tree, nodes);
        if !newly.is_empty() {
            self.emit(EngineEvent::TreeModified {
                tree_id: self.tree.id.clone(),
                dirty: newly.clone(),
            });
        }
        newly
    }

    fn emit(&self, event: EngineEvent) {
        emit(self.events.as_ref(), event);
    }
}

impl std::fmt::Debug for TreeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSession")
            .field("tree", &self.tree.id)
            .field("nodes", &self.tree.node_count())
            .field("dirty", &self.state.dirty.nodes().len())
            .field("passes", &self.passes)
            .finish()
    }
}

fn notify_removed(registry: &NodeRegistry, extensions: &ExecutorExtensions, node: &Node) {
    if let Some(subtree) = node.subtree.as_deref() {
        for inner in subtree.nodes() {
            notify_removed(registry, extensions, inner);
        }
    }
    if let Some(kind) = registry.get(&node.kind) {
        kind.on_removed(node, extensions);
    }
}

fn emit(events: &dyn EventSink, event: EngineEvent) {
    if let Err(e) = events.send(event) {
        log::warn!("Failed to deliver engine event: {}", e);
    }
}

/// Evaluates trees against a registry
///
/// Holds what every pass shares: the registry, the configuration, the
/// injected collaborators and the event sink.
pub struct Engine {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    extensions: Arc<ExecutorExtensions>,
    events: Arc<dyn EventSink>,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            extensions: Arc::new(ExecutorExtensions::new()),
            events: Arc::new(NullEventSink),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extensions(&self) -> &ExecutorExtensions {
        &self.extensions
    }

    /// Token that cancels the next node step of any pass on this engine
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wrap an existing tree; every node starts dirty
    pub fn session(&self, tree: Tree) -> TreeSession {
        TreeSession::new(
            tree,
            self.registry.clone(),
            self.extensions.clone(),
            self.events.clone(),
        )
    }

    pub fn new_tree(&self, id: impl Into<String>, name: impl Into<String>) -> TreeSession {
        self.session(Tree::new(id, name))
    }

    /// Restore a persisted tree, upgrading its nodes before anything runs
    pub fn load_tree(&self, persisted: &PersistedTree) -> Result<(TreeSession, UpgradeReport)> {
        let mut tree = persisted.to_tree()?;
        let report = upgrade_tree(&mut tree, &self.registry);
        self.emit_upgrades(&report);
        log::info!(
            "Loaded tree '{}' with {} nodes",
            tree.id,
            tree.node_count()
        );
        Ok((self.session(tree), report))
    }

    /// Re-run upgrades on a live session after the registry changed, then
    /// mark everything dirty
    pub fn reload(&self, session: &mut TreeSession) -> UpgradeReport {
        let report = upgrade_tree(&mut session.tree, &self.registry);
        self.emit_upgrades(&report);
        session.state.dirty.bump_epoch();
        session.invalidate_all();
        report
    }

    /// Mark `nodes` dirty, then run one pass over everything pending
    pub fn tick(&self, session: &mut TreeSession, nodes: &[NodeId]) -> PassReport {
        session.mark_dirty(nodes);
        self.run_pass(session)
    }

    /// Compute the current dirty closure of a session
    pub fn run_pass(&self, session: &mut TreeSession) -> PassReport {
        session.passes += 1;
        let ctx = PassContext {
            tree_id: session.tree.id.clone(),
            pass_id: uuid::Uuid::new_v4().to_string(),
            pass: session.passes,
        };
        let mut report = PassReport::new(&ctx);
        let pending = session.dirty_nodes();

        log::debug!(
            "Pass {} on tree '{}': {} dirty nodes",
            ctx.pass,
            ctx.tree_id,
            pending.len()
        );
        self.emit(EngineEvent::PassStarted {
            tree_id: ctx.tree_id.clone(),
            pass_id: ctx.pass_id.clone(),
            nodes: pending,
        });

        self.evaluate(&session.tree, &mut session.state, &[], &ctx, 0, &mut report);
        // A request raised by the last node has nothing left to stop
        self.cancel.reset();

        if report.cancelled {
            log::info!(
                "Pass {} on tree '{}' cancelled after {} nodes",
                ctx.pass,
                ctx.tree_id,
                report.computed.len()
            );
            self.emit(EngineEvent::PassCancelled {
                tree_id: ctx.tree_id.clone(),
                pass_id: ctx.pass_id.clone(),
            });
        } else {
            log::debug!(
                "Pass {} on tree '{}' done: {} computed, {} failed, {} skipped",
                ctx.pass,
                ctx.tree_id,
                report.computed.len(),
                report.failed.len(),
                report.skipped.len()
            );
            self.emit(EngineEvent::PassCompleted {
                tree_id: ctx.tree_id.clone(),
                pass_id: ctx.pass_id.clone(),
                computed: report.computed.len(),
                failed: report.failed.len(),
            });
        }
        report
    }

    fn evaluate(
        &self,
        tree: &Tree,
        state: &mut TreeState,
        boundary: &[NestedValue],
        ctx: &PassContext,
        depth: usize,
        report: &mut PassReport,
    ) {
        let pending: BTreeSet<NodeId> = state.dirty.nodes().clone();
        if pending.is_empty() {
            return;
        }

        let order = match state.order.order(tree, &pending, state.dirty.epoch()) {
            Ok(order) => order,
            Err(e) => {
                if let EngineError::CyclicGraph { nodes } = &e {
                    log::warn!("Tree '{}' not evaluated: {}", tree.id, e);
                    self.emit(EngineEvent::CycleDetected {
                        tree_id: ctx.tree_id.clone(),
                        pass_id: ctx.pass_id.clone(),
                        nodes: nodes.clone(),
                    });
                }
                report.errors.push(e);
                return;
            }
        };
        report.order = order.clone();

        for id in order {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            let Some(node) = tree.node(id) else {
                continue;
            };

            let upstream = tree
                .predecessors(id)
                .into_iter()
                .find(|p| state.status.get(p) == Some(&NodeStatus::Failed));
            if let Some(upstream) = upstream {
                self.fail(state, report, ctx, id, EngineError::UpstreamFailed { node: id, upstream });
                continue;
            }
            if let Some(reason) = &node.flag {
                let error = EngineError::UnrecognizedNodeShape {
                    node: id,
                    kind: node.kind.clone(),
                    reason: reason.clone(),
                };
                self.fail(state, report, ctx, id, error);
                continue;
            }
            let Some(kind) = self.registry.get(&node.kind) else {
                self.fail(state, report, ctx, id, EngineError::UnknownNodeKind(node.kind.clone()));
                continue;
            };

            if self.config.skip_unlinked_pure && kind.is_pure() && !tree.any_output_linked(id) {
                log::trace!("Skipping unlinked pure node {} ('{}')", id, node.name);
                report.skipped.push(id);
                self.emit(EngineEvent::NodeSkipped {
                    tree_id: ctx.tree_id.clone(),
                    pass_id: ctx.pass_id.clone(),
                    node: id,
                    reason: "no linked outputs".to_string(),
                });
                continue;
            }

            state.status.insert(id, NodeStatus::Computing);
            let result = if node.kind == GROUP_KIND {
                self.compute_group(tree, node, &state.cache, &mut state.groups, ctx, depth)
            } else {
                let mut channel =
                    SocketChannel::new(tree, node, &state.cache, &self.extensions)
                        .with_boundary(boundary);
                kind.compute(&mut channel).map(|()| channel.into_pushed())
            };

            match result {
                Ok(pushed) => {
                    state.cache.commit(id, pushed, ctx.pass);
                    state.status.insert(id, NodeStatus::Clean);
                    state.dirty.settle(id);
                    *state.compute_counts.entry(id).or_default() += 1;
                    report.computed.push(id);
                    log::trace!("Computed node {} ('{}')", id, node.name);
                    self.emit(EngineEvent::NodeComputed {
                        tree_id: ctx.tree_id.clone(),
                        pass_id: ctx.pass_id.clone(),
                        node: id,
                    });
                }
                Err(EngineError::Cancelled) => {
                    state.status.insert(id, NodeStatus::Dirty);
                    report.cancelled = true;
                    return;
                }
                Err(e) => {
                    let message = match e {
                        EngineError::ComputeFailed(message) => message,
                        other => other.to_string(),
                    };
                    let error = EngineError::NodeCompute {
                        node: id,
                        name: node.name.clone(),
                        message,
                    };
                    self.fail(state, report, ctx, id, error);
                }
            }
        }
    }

    fn compute_group(
        &self,
        tree: &Tree,
        node: &Node,
        cache: &OutputCache,
        group_states: &mut BTreeMap<NodeId, TreeState>,
        ctx: &PassContext,
        depth: usize,
    ) -> Result<Vec<PushedOutput>> {
        if depth >= self.config.max_group_depth {
            return Err(EngineError::failed(format!(
                "group nesting exceeds {} levels",
                self.config.max_group_depth
            )));
        }
        let subtree = node
            .subtree
            .as_deref()
            .ok_or_else(|| EngineError::failed("group node has no subtree"))?;

        let inputs: Vec<NestedValue> = (0..node.inputs.len())
            .map(|index| resolve_input(tree, cache, node, index))
            .collect();
        let sub = group_states
            .entry(node.id)
            .or_insert_with(|| TreeState::new(subtree));
        sub.mark(subtree, &groups::group_inputs(subtree));

        let sub_ctx = PassContext {
            tree_id: subtree.id.clone(),
            ..ctx.clone()
        };
        let mut sub_report = PassReport::new(&sub_ctx);
        self.evaluate(subtree, sub, &inputs, &sub_ctx, depth + 1, &mut sub_report);

        if sub_report.cancelled {
            return Err(EngineError::Cancelled);
        }
        if !sub_report.errors.is_empty() {
            let messages: Vec<String> = sub_report.errors.iter().map(|e| e.to_string()).collect();
            return Err(EngineError::failed(messages.join("; ")));
        }

        let Some(output) = groups::group_output(subtree).and_then(|id| subtree.node(id)) else {
            return Ok(Vec::new());
        };
        Ok(node
            .outputs
            .iter()
            .enumerate()
            .map(|(index, socket)| PushedOutput {
                index,
                kind: socket.kind,
                value: if index < output.inputs.len() {
                    resolve_input(subtree, &sub.cache, output, index)
                } else {
                    NestedValue::empty()
                },
            })
            .collect())
    }

    fn fail(
        &self,
        state: &mut TreeState,
        report: &mut PassReport,
        ctx: &PassContext,
        id: NodeId,
        error: EngineError,
    ) {
        log::warn!("Node {} failed: {}", id, error);
        state.status.insert(id, NodeStatus::Failed);
        state.dirty.settle(id);
        report.failed.push(id);
        self.emit(EngineEvent::NodeFailed {
            tree_id: ctx.tree_id.clone(),
            pass_id: ctx.pass_id.clone(),
            node: id,
            error: error.to_string(),
        });
        report.errors.push(error);
    }

    fn emit_upgrades(&self, report: &UpgradeReport) {
        for upgraded in &report.upgraded {
            self.emit(EngineEvent::NodeUpgraded {
                tree_id: upgraded.tree_id.clone(),
                node: upgraded.node,
                from: upgraded.from,
                to: upgraded.to,
            });
        }
        for flagged in &report.flagged {
            self.emit(EngineEvent::NodeFlagged {
                tree_id: flagged.tree_id.clone(),
                node: flagged.node,
                reason: flagged.reason.clone(),
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        emit(self.events.as_ref(), event);
    }
}
