//! Extensions setup for host applications
//!
//! Hosts call [`setup_extensions`] before building the engine so viewer nodes
//! find a scene to publish into. Headless hosts get a [`MemoryScene`]; hosts
//! with a real viewport pass their own sink to
//! [`setup_extensions_with_scene`].
//!
//! # Example
//!
//! ```ignore
//! let mut extensions = arbor_engine::ExecutorExtensions::new();
//! let scene = arbor_nodes::setup_extensions(&mut extensions);
//! let engine = Engine::new(registry).with_extensions(extensions);
//! // scene.objects(...) shows what viewers published
//! ```

use std::sync::Arc;

use arbor_engine::{extension_keys, ExecutorExtensions};

use crate::output::{MemoryScene, SceneSink};

/// Register an in-memory scene and return it for inspection
pub fn setup_extensions(extensions: &mut ExecutorExtensions) -> Arc<MemoryScene> {
    let scene = Arc::new(MemoryScene::new());
    setup_extensions_with_scene(extensions, scene.clone());
    scene
}

/// Register a host-provided scene sink
pub fn setup_extensions_with_scene(extensions: &mut ExecutorExtensions, scene: Arc<dyn SceneSink>) {
    if extensions.has(extension_keys::SCENE) {
        log::info!("Replacing the registered scene sink");
    }
    extensions.set(extension_keys::SCENE, scene);
}
