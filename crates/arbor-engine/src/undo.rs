//! Edit history over compressed tree snapshots
//!
//! Each entry is a zstd-compressed JSON [`PersistedTree`] labelled with the
//! edit that produced it. Hosts record an entry after every undoable edit and
//! hand the snapshot that `undo`/`redo` return to
//! [`TreeSession::restore`](crate::TreeSession::restore).

use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::persist::PersistedTree;

const COMPRESSION_LEVEL: i32 = 3;

struct Entry {
    label: String,
    bytes: Vec<u8>,
}

/// Bounded, linear edit history
pub struct UndoStack {
    entries: VecDeque<Entry>,
    /// Entry matching the live tree; `None` until something is recorded
    cursor: Option<usize>,
    capacity: usize,
}

impl UndoStack {
    /// Create a history holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.undo_depth)
    }

    /// Record the tree as it is after `label`; drops every redo entry
    pub fn record(&mut self, label: impl Into<String>, tree: &PersistedTree) -> Result<()> {
        let bytes = compress(tree)?;
        let keep = self.cursor.map_or(0, |c| c + 1);
        if self.entries.len() > keep {
            log::debug!("Discarding {} redo entries", self.entries.len() - keep);
            self.entries.truncate(keep);
        }

        self.entries.push_back(Entry {
            label: label.into(),
            bytes,
        });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = Some(self.entries.len() - 1);
        Ok(())
    }

    /// Step back; `Ok(None)` at the oldest entry
    pub fn undo(&mut self) -> Result<Option<PersistedTree>> {
        match self.cursor {
            Some(c) if c > 0 => self.move_to(c - 1).map(Some),
            _ => Ok(None),
        }
    }

    /// Step forward; `Ok(None)` at the newest entry
    pub fn redo(&mut self) -> Result<Option<PersistedTree>> {
        match self.cursor {
            Some(c) if c + 1 < self.entries.len() => self.move_to(c + 1).map(Some),
            _ => Ok(None),
        }
    }

    pub fn current(&self) -> Result<Option<PersistedTree>> {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .map(|e| decompress(&e.bytes))
            .transpose()
    }

    /// Label of the edit the live tree reflects
    pub fn current_label(&self) -> Option<&str> {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .map(|e| e.label.as_str())
    }

    /// Labels from oldest to newest
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    /// Total compressed bytes held
    pub fn compressed_size(&self) -> usize {
        self.entries.iter().map(|e| e.bytes.len()).sum()
    }

    fn move_to(&mut self, index: usize) -> Result<PersistedTree> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| EngineError::Compression(format!("no entry at {index}")))?;
        let tree = decompress(&entry.bytes)?;
        self.cursor = Some(index);
        Ok(tree)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn compress(tree: &PersistedTree) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(tree)?;
    zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| EngineError::Compression(e.to_string()))
}

fn decompress(bytes: &[u8]) -> Result<PersistedTree> {
    let json = zstd::decode_all(bytes).map_err(|e| EngineError::Compression(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PersistedNode;

    fn tree_with(nodes: usize) -> PersistedTree {
        PersistedTree {
            id: "t".to_string(),
            name: "T".to_string(),
            nodes: (0..nodes)
                .map(|i| PersistedNode {
                    name: format!("n{i}"),
                    kind: "number".to_string(),
                    version: 1,
                    properties: Default::default(),
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    subtree: None,
                })
                .collect(),
            links: Vec::new(),
        }
    }

    #[test]
    fn test_walk_history() {
        let mut history = UndoStack::new(10);
        assert!(history.current().unwrap().is_none());
        assert!(history.undo().unwrap().is_none());

        history.record("empty", &tree_with(0)).unwrap();
        history.record("add n0", &tree_with(1)).unwrap();
        history.record("add n1", &tree_with(2)).unwrap();

        assert_eq!(history.undo().unwrap().unwrap().nodes.len(), 1);
        assert_eq!(history.current_label(), Some("add n0"));
        assert_eq!(history.undo().unwrap().unwrap().nodes.len(), 0);
        assert!(history.undo().unwrap().is_none());
        assert!(!history.can_undo());

        assert_eq!(history.redo().unwrap().unwrap().nodes.len(), 1);
        assert!(history.can_redo());
    }

    #[test]
    fn test_record_after_undo_forks() {
        let mut history = UndoStack::new(10);
        history.record("a", &tree_with(0)).unwrap();
        history.record("b", &tree_with(1)).unwrap();
        history.record("c", &tree_with(2)).unwrap();

        history.undo().unwrap();
        history.record("d", &tree_with(5)).unwrap();

        assert!(!history.can_redo());
        assert_eq!(history.labels(), vec!["a", "b", "d"]);
        assert_eq!(history.current().unwrap().unwrap().nodes.len(), 5);
    }

    #[test]
    fn test_capacity_from_config() {
        let config = EngineConfig {
            undo_depth: 2,
            ..EngineConfig::default()
        };
        let mut history = UndoStack::from_config(&config);
        for n in 0..4 {
            history.record(format!("step {n}"), &tree_with(n)).unwrap();
        }

        assert_eq!(history.labels(), vec!["step 2", "step 3"]);
        assert_eq!(history.undo().unwrap().unwrap().nodes.len(), 2);
        assert!(!history.can_undo());
        assert!(history.compressed_size() > 0);

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.current_label(), None);
    }
}
