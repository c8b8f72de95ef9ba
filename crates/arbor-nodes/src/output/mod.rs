//! Output nodes
//!
//! Nodes that write results into external collaborators.

mod mesh_viewer;
pub mod scene;

pub use mesh_viewer::MeshViewerKind;
pub use scene::{MemoryScene, MeshData, SceneObject, SceneSink};
