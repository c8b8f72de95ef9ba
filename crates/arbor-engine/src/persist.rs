//! Persisted tree layout and file-backed tree store
//!
//! A tree serializes as its node list and its link list. Links address
//! nodes by their position in the node list, so the layout does not depend
//! on runtime node ids. Only the upgrade layer interprets `version`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::graph::{Node, Tree};
use crate::types::{InputRef, NodeId, OutputRef, SocketDef};

/// Serialized form of a tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTree {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<PersistedNode>,
    #[serde(default)]
    pub links: Vec<PersistedLink>,
}

/// Serialized form of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedNode {
    pub name: String,
    pub kind: String,
    pub version: u32,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: Vec<SocketDef>,
    #[serde(default)]
    pub outputs: Vec<SocketDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree: Option<Box<PersistedTree>>,
}

/// Serialized form of a link: node list positions plus socket positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLink {
    pub from_node: usize,
    pub from_socket: usize,
    pub to_node: usize,
    pub to_socket: usize,
}

impl PersistedTree {
    /// Capture a tree, including group subtrees
    pub fn from_tree(tree: &Tree) -> Self {
        let positions: HashMap<NodeId, usize> = tree
            .nodes()
            .enumerate()
            .map(|(index, node)| (node.id, index))
            .collect();

        let nodes = tree
            .nodes()
            .map(|node| PersistedNode {
                name: node.name.clone(),
                kind: node.kind.clone(),
                version: node.version,
                properties: node.properties.clone(),
                inputs: node.inputs.clone(),
                outputs: node.outputs.clone(),
                subtree: node
                    .subtree
                    .as_deref()
                    .map(|sub| Box::new(Self::from_tree(sub))),
            })
            .collect();

        let links = tree
            .links()
            .filter_map(|link| {
                Some(PersistedLink {
                    from_node: *positions.get(&link.from.node)?,
                    from_socket: link.from.socket,
                    to_node: *positions.get(&link.to.node)?,
                    to_socket: link.to.socket,
                })
            })
            .collect();

        Self {
            id: tree.id.clone(),
            name: tree.name.clone(),
            nodes,
            links,
        }
    }

    /// Rebuild the runtime tree; node ids follow list order starting at 1
    pub fn to_tree(&self) -> Result<Tree> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (index, persisted) in self.nodes.iter().enumerate() {
            let mut node = Node::new(persisted.kind.clone(), persisted.name.clone());
            node.id = node_id(index);
            node.version = persisted.version;
            node.properties = persisted.properties.clone();
            node.inputs = persisted.inputs.clone();
            node.outputs = persisted.outputs.clone();
            node.subtree = match &persisted.subtree {
                Some(sub) => Some(Box::new(sub.to_tree()?)),
                None => None,
            };
            nodes.push(node);
        }

        let mut links = Vec::with_capacity(self.links.len());
        for link in &self.links {
            if link.from_node >= self.nodes.len() || link.to_node >= self.nodes.len() {
                return Err(EngineError::InvalidTree(format!(
                    "link {} -> {} points past the node list",
                    link.from_node, link.to_node
                )));
            }
            links.push((
                OutputRef::new(node_id(link.from_node), link.from_socket),
                InputRef::new(node_id(link.to_node), link.to_socket),
            ));
        }
        Tree::from_parts(self.id.clone(), self.name.clone(), nodes, links)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn node_id(index: usize) -> NodeId {
    NodeId(index as u64 + 1)
}

/// Metadata for a stored tree (for listing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMetadata {
    pub id: String,
    pub name: String,
    pub node_count: usize,
}

/// In-memory tree store with optional JSON file persistence
///
/// One file per tree, named `<id>.json`, in the persistence directory.
///
/// # Example
///
/// ```ignore
/// let mut store = TreeStore::with_persistence(".arbor/trees");
/// let count = store.load_from_disk()?;
/// store.insert(PersistedTree::from_tree(session.tree()))?;
/// ```
#[derive(Debug, Default)]
pub struct TreeStore {
    trees: HashMap<String, PersistedTree>,
    persist_path: Option<PathBuf>,
}

impl TreeStore {
    /// Create an in-memory store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to the given directory
    ///
    /// The directory is created on first save.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            trees: HashMap::new(),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load every `*.json` tree from the persistence directory
    ///
    /// Unparseable files are skipped with a warning. Returns the number of
    /// trees loaded.
    pub fn load_from_disk(&mut self) -> Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.extension().map_or(false, |e| e == "json") {
                let content = std::fs::read_to_string(&file_path)?;
                match PersistedTree::from_json(&content) {
                    Ok(tree) => {
                        log::info!("Loaded tree '{}' from {:?}", tree.id, file_path);
                        self.trees.insert(tree.id.clone(), tree);
                        count += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse tree from {:?}: {}", file_path, e);
                    }
                }
            }
        }
        Ok(count)
    }

    fn save_to_disk(&self, tree: &PersistedTree) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        std::fs::create_dir_all(path)?;
        let file_path = path.join(format!("{}.json", tree.id));
        std::fs::write(&file_path, tree.to_json()?)?;
        log::debug!("Saved tree '{}' to {:?}", tree.id, file_path);
        Ok(())
    }

    fn delete_from_disk(&self, id: &str) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        let file_path = path.join(format!("{id}.json"));
        if file_path.exists() {
            std::fs::remove_file(&file_path)?;
            log::debug!("Deleted tree '{}' from {:?}", id, file_path);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PersistedTree> {
        self.trees.get(id)
    }

    /// Insert or replace a tree, persisting it if enabled
    pub fn insert(&mut self, tree: PersistedTree) -> Result<()> {
        self.save_to_disk(&tree)?;
        self.trees.insert(tree.id.clone(), tree);
        Ok(())
    }

    /// Remove a tree; returns it if it existed
    pub fn remove(&mut self, id: &str) -> Result<Option<PersistedTree>> {
        self.delete_from_disk(id)?;
        Ok(self.trees.remove(id))
    }

    /// List stored trees, sorted by id
    pub fn list(&self) -> Vec<TreeMetadata> {
        let mut all: Vec<TreeMetadata> = self
            .trees
            .values()
            .map(|t| TreeMetadata {
                id: t.id.clone(),
                name: t.name.clone(),
                node_count: t.nodes.len(),
            })
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trees.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketKind;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new("tree-1", "Sample");
        let mut source = Node::new("number", "n");
        source.outputs.push(SocketDef::new("Value", SocketKind::Numbers));
        source
            .properties
            .insert("value".to_string(), serde_json::json!(2.5));
        let mut sink = Node::new("sink", "s");
        sink.inputs.push(SocketDef::new("In", SocketKind::Numbers).bound_to("fallback"));

        let mut inner = Tree::new("tree-1/g", "Inner");
        inner.add_node(Node::new("group-input", "Group Input"));
        let mut group = Node::new("group", "g");
        group.subtree = Some(Box::new(inner));

        let a = tree.add_node(source);
        let b = tree.add_node(sink);
        tree.add_node(group);
        tree.connect(a, "Value", b, "In").unwrap();
        tree
    }

    #[test]
    fn test_persisted_layout() {
        let persisted = PersistedTree::from_tree(&sample_tree());
        let json = serde_json::to_value(&persisted).unwrap();

        assert_eq!(json["nodes"][0]["kind"], "number");
        assert_eq!(json["nodes"][0]["properties"]["value"], 2.5);
        assert_eq!(json["nodes"][1]["inputs"][0]["bound"]["value"], "fallback");
        assert_eq!(
            json["links"][0],
            serde_json::json!({"fromNode": 0, "fromSocket": 0, "toNode": 1, "toSocket": 0})
        );
        assert!(json["nodes"][0].get("subtree").is_none());
        assert_eq!(json["nodes"][2]["subtree"]["name"], "Inner");
    }

    #[test]
    fn test_restore_keeps_topology() {
        let tree = sample_tree();
        let restored = PersistedTree::from_tree(&tree).to_tree().unwrap();

        assert_eq!(restored.node_count(), 3);
        assert_eq!(restored.successors(NodeId(1)), vec![NodeId(2)]);
        assert_eq!(
            restored.node(NodeId(3)).unwrap().subtree.as_ref().unwrap().node_count(),
            1
        );
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut persisted = PersistedTree::from_tree(&sample_tree());
        persisted.links[0].to_node = 9;
        assert!(matches!(persisted.to_tree(), Err(EngineError::InvalidTree(_))));
    }

    #[test]
    fn test_store_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let persisted = PersistedTree::from_tree(&sample_tree());

        let mut store = TreeStore::with_persistence(dir.path());
        store.insert(persisted.clone()).unwrap();
        assert!(dir.path().join("tree-1.json").exists());

        let mut reopened = TreeStore::with_persistence(dir.path());
        assert_eq!(reopened.load_from_disk().unwrap(), 1);
        assert_eq!(reopened.get("tree-1"), Some(&persisted));
        assert_eq!(reopened.list()[0].node_count, 3);

        assert!(reopened.remove("tree-1").unwrap().is_some());
        assert!(!dir.path().join("tree-1.json").exists());
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_store_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut store = TreeStore::with_persistence(dir.path());
        assert_eq!(store.load_from_disk().unwrap(), 0);

        let mut memory = TreeStore::new();
        assert_eq!(memory.load_from_disk().unwrap(), 0);
    }
}
