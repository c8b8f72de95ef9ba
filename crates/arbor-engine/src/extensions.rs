//! Typed extension map for injecting external collaborators
//!
//! Node kinds that write into something outside the engine (a scene, a
//! viewport, a file sink) receive it through `ExecutorExtensions` rather than
//! reaching for a global. The host fills the map once and hands it to the
//! [`Engine`](crate::Engine); every compute call can read it.
//!
//! # Example
//!
//! ```ignore
//! use arbor_engine::{extension_keys, ExecutorExtensions};
//! use std::sync::Arc;
//!
//! let scene: Arc<dyn SceneSink> = Arc::new(MemoryScene::new());
//! let mut ext = ExecutorExtensions::new();
//! ext.set(extension_keys::SCENE, scene);
//!
//! // Inside NodeKind::compute:
//! if let Some(scene) = channel.extensions().get::<Arc<dyn SceneSink>>(extension_keys::SCENE) {
//!     scene.publish(owner, meshes);
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;

use crate::error::{EngineError, Result};

type Collaborator = Box<dyn Any + Send + Sync>;

/// Collaborators injected by the host, keyed by name
#[derive(Default)]
pub struct ExecutorExtensions {
    collaborators: HashMap<String, Collaborator>,
}

impl ExecutorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collaborator; an earlier one under `key` is dropped
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, collaborator: T) {
        if self
            .collaborators
            .insert(key.to_string(), Box::new(collaborator))
            .is_some()
        {
            log::debug!("Replaced collaborator '{}'", key);
        }
    }

    /// The collaborator under `key`, if it has type `T`
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.collaborators.get(key)?.downcast_ref()
    }

    /// Like [`get`](Self::get), failing the calling node when absent
    pub fn require<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T> {
        match self.collaborators.get(key) {
            Some(c) => c.downcast_ref().ok_or_else(|| {
                EngineError::failed(format!("collaborator '{key}' has an unexpected type"))
            }),
            None => Err(EngineError::failed(format!("no '{key}' collaborator registered"))),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.collaborators.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.collaborators.remove(key).is_some()
    }
}

impl std::fmt::Debug for ExecutorExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.collaborators.keys().collect();
        keys.sort();
        f.debug_struct("ExecutorExtensions").field("keys", &keys).finish()
    }
}

/// Well-known extension keys
pub mod extension_keys {
    /// Scene collaborator written by viewer nodes
    pub const SCENE: &str = "scene";
}
