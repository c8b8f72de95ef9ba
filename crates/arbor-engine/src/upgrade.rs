//! Schema upgrades for loaded trees
//!
//! Every node is checked against the kind currently registered under its
//! kind identifier. Older versions are walked forward through the registered
//! upgrade steps; the result must then match the kind's declared shape.
//! Nodes that cannot be reconciled keep their loaded definition and carry a
//! flag, which makes the engine fail them (and only them, plus consumers)
//! during a pass.

use serde::Serialize;

use crate::error::EngineError;
use crate::graph::{Node, Tree};
use crate::registry::NodeRegistry;
use crate::types::NodeId;

/// A node that was rewritten to a newer version
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradedNode {
    pub tree_id: String,
    pub node: NodeId,
    pub kind: String,
    pub from: u32,
    pub to: u32,
}

/// A node left untouched because it could not be reconciled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedNode {
    pub tree_id: String,
    pub node: NodeId,
    pub kind: String,
    pub reason: String,
}

/// Outcome of upgrading one tree, subtrees included
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpgradeReport {
    pub upgraded: Vec<UpgradedNode>,
    pub flagged: Vec<FlaggedNode>,
}

impl UpgradeReport {
    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty()
    }

    /// One [`EngineError::UnrecognizedNodeShape`] per flagged node
    pub fn errors(&self) -> Vec<EngineError> {
        self.flagged
            .iter()
            .map(|f| EngineError::UnrecognizedNodeShape {
                node: f.node,
                kind: f.kind.clone(),
                reason: f.reason.clone(),
            })
            .collect()
    }
}

/// Reconcile every node of `tree` with the registry, in place
pub fn upgrade_tree(tree: &mut Tree, registry: &NodeRegistry) -> UpgradeReport {
    let mut report = UpgradeReport::default();
    upgrade_into(tree, registry, &mut report);
    if !report.upgraded.is_empty() || !report.flagged.is_empty() {
        log::info!(
            "Upgraded tree '{}': {} nodes rewritten, {} flagged",
            tree.id,
            report.upgraded.len(),
            report.flagged.len()
        );
    }
    report
}

fn upgrade_into(tree: &mut Tree, registry: &NodeRegistry, report: &mut UpgradeReport) {
    for id in tree.node_ids() {
        if let Some(node) = tree.node_mut(id) {
            if let Some(subtree) = node.subtree.as_deref_mut() {
                upgrade_into(subtree, registry, report);
            }
        }
        let Some(node) = tree.node(id) else {
            continue;
        };

        match reconcile(node, registry) {
            Ok(None) => {
                if let Some(node) = tree.node_mut(id) {
                    node.flag = None;
                }
            }
            Ok(Some(upgraded)) => {
                let entry = UpgradedNode {
                    tree_id: tree.id.clone(),
                    node: id,
                    kind: node.kind.clone(),
                    from: node.version,
                    to: upgraded.version,
                };
                match tree.rewrite_node(id, upgraded) {
                    Ok(dropped) => {
                        log::debug!(
                            "Node {} upgraded from v{} to v{} ({} links dropped)",
                            id,
                            entry.from,
                            entry.to,
                            dropped.len()
                        );
                        report.upgraded.push(entry);
                    }
                    Err(e) => flag(tree, id, e.to_string(), report),
                }
            }
            Err(reason) => flag(tree, id, reason, report),
        }
    }
}

/// `Ok(None)` if the node already fits, `Ok(Some(node))` with the rewritten
/// node, or the reason it cannot be reconciled
fn reconcile(node: &Node, registry: &NodeRegistry) -> std::result::Result<Option<Node>, String> {
    let kind = registry
        .get(&node.kind)
        .ok_or_else(|| format!("kind '{}' is not registered", node.kind))?;
    let current = kind.descriptor().version;

    let mut candidate = node.clone();
    let mut stepped = false;
    while candidate.version < current {
        let Some(step) = registry.upgrade_from(&node.kind, candidate.version) else {
            break;
        };
        if step.to <= candidate.version {
            return Err(format!(
                "upgrade step from v{} does not move forward",
                step.from
            ));
        }
        (step.apply)(&mut candidate)
            .map_err(|e| format!("upgrade from v{} failed: {}", step.from, e))?;
        candidate.version = step.to;
        stepped = true;
    }

    kind.check_shape(&candidate).map_err(|reason| {
        if candidate.version != current {
            format!("v{} has no upgrade path to v{current}: {reason}", candidate.version)
        } else {
            reason
        }
    })?;

    candidate.flag = None;
    Ok(stepped.then_some(candidate))
}

fn flag(tree: &mut Tree, id: NodeId, reason: String, report: &mut UpgradeReport) {
    let tree_id = tree.id.clone();
    let Some(node) = tree.node_mut(id) else {
        return;
    };
    log::warn!(
        "Node {} ('{}') of kind '{}' flagged: {}",
        id,
        node.name,
        node.kind,
        reason
    );
    node.flag = Some(reason.clone());
    report.flagged.push(FlaggedNode {
        tree_id,
        node: id,
        kind: node.kind.clone(),
        reason,
    });
}
