//! Scene collaborator
//!
//! Viewer nodes do not own the meshes they show. They publish into a
//! [`SceneSink`] injected through the engine's extensions, which keeps one
//! scene object per published mesh under the publishing node's owner key.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_engine::{extension_keys, ExecutorExtensions, Matrix4};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Geometry of one scene object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<[f64; 3]>,
    pub edges: Vec<[usize; 2]>,
    pub faces: Vec<Vec<usize>>,
    /// Object transform; `None` leaves the object at the origin
    pub matrix: Option<Matrix4>,
}

impl MeshData {
    /// Append `other`, offsetting its indices past this mesh's vertices
    pub fn join(&mut self, other: MeshData) {
        let offset = self.vertices.len();
        self.vertices.extend(other.vertices);
        self.edges
            .extend(other.edges.into_iter().map(|[a, b]| [a + offset, b + offset]));
        self.faces.extend(
            other
                .faces
                .into_iter()
                .map(|face| face.into_iter().map(|i| i + offset).collect()),
        );
    }

    /// Bake a transform into the vertex positions
    pub fn apply_matrix(&mut self, m: &Matrix4) {
        for v in &mut self.vertices {
            let [x, y, z] = *v;
            *v = [
                m[0][0] * x + m[0][1] * y + m[0][2] * z + m[0][3],
                m[1][0] * x + m[1][1] * y + m[1][2] * z + m[1][3],
                m[2][0] * x + m[2][1] * y + m[2][2] * z + m[2][3],
            ];
        }
    }
}

/// Receives meshes from viewer nodes
pub trait SceneSink: Send + Sync {
    /// Replace everything `owner` shows with `meshes`
    ///
    /// Returns one object handle per mesh, in order. Handles of objects that
    /// keep their slot are stable across calls.
    fn publish(&self, owner: &str, meshes: Vec<MeshData>) -> Vec<i64>;

    /// Remove every object `owner` shows
    fn clear(&self, owner: &str);
}

/// The scene sink registered in `extensions`, if any
pub fn scene_from(extensions: &ExecutorExtensions) -> Option<&Arc<dyn SceneSink>> {
    extensions.get::<Arc<dyn SceneSink>>(extension_keys::SCENE)
}

/// An object held by [`MemoryScene`]
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub handle: i64,
    pub mesh: MeshData,
}

#[derive(Debug, Default)]
struct SceneState {
    owners: BTreeMap<String, Vec<SceneObject>>,
    next_handle: i64,
}

/// In-process scene, for headless hosts and tests
#[derive(Debug, Default)]
pub struct MemoryScene {
    state: Mutex<SceneState>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects currently shown by `owner`
    pub fn objects(&self, owner: &str) -> Vec<SceneObject> {
        self.state
            .lock()
            .owners
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of objects in the scene
    pub fn object_count(&self) -> usize {
        self.state.lock().owners.values().map(Vec::len).sum()
    }

    pub fn owners(&self) -> Vec<String> {
        self.state.lock().owners.keys().cloned().collect()
    }
}

impl SceneSink for MemoryScene {
    fn publish(&self, owner: &str, meshes: Vec<MeshData>) -> Vec<i64> {
        let mut state = self.state.lock();
        let SceneState {
            owners,
            next_handle,
        } = &mut *state;
        let objects = owners.entry(owner.to_string()).or_default();

        objects.truncate(meshes.len());
        for (index, mesh) in meshes.into_iter().enumerate() {
            match objects.get_mut(index) {
                Some(object) => object.mesh = mesh,
                None => {
                    *next_handle += 1;
                    objects.push(SceneObject {
                        handle: *next_handle,
                        mesh,
                    });
                }
            }
        }
        log::trace!("Scene owner '{}' shows {} objects", owner, objects.len());
        objects.iter().map(|o| o.handle).collect()
    }

    fn clear(&self, owner: &str) {
        if let Some(objects) = self.state.lock().owners.remove(owner) {
            log::debug!("Cleared {} objects of '{}'", objects.len(), owner);
        }
    }
}
