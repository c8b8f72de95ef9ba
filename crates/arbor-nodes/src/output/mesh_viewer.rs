//! Mesh Viewer
//!
//! Publishes vertices, edges and faces to the scene as one object per
//! incoming object, or as a single merged object. Matrices either sit on
//! the objects or, when merging, are baked into the vertices first.

use std::sync::Arc;

use arbor_engine::{
    extension_keys, Alignment, BroadcastOptions, ExecutorExtensions, KindRegistration,
    NestedValue, Node, NodeCategory, NodeDescriptor, NodeKind, Result, SocketChannel, SocketDef,
    SocketKind,
};

use super::scene::{scene_from, MeshData, SceneSink};

pub struct MeshViewerKind;

impl MeshViewerKind {
    pub const KIND: &'static str = "mesh-viewer";

    pub const PORT_VERTICES: &'static str = "Vertices";
    pub const PORT_EDGES: &'static str = "Edges";
    pub const PORT_FACES: &'static str = "Faces";
    pub const PORT_MATRIX: &'static str = "Matrix";
    pub const PORT_OBJECTS: &'static str = "Objects";

    /// Merge every object into one
    pub const PROP_MERGE: &'static str = "merge";
    /// Key the scene files this node's objects under
    pub const PROP_BASE_NAME: &'static str = "base_name";
}

impl NodeKind for MeshViewerKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::KIND, "Mesh Viewer", NodeCategory::Output)
            .description("Shows meshes in the scene")
            .input(SocketDef::new(Self::PORT_VERTICES, SocketKind::Vertices))
            .input(SocketDef::new(Self::PORT_EDGES, SocketKind::Edges))
            .input(SocketDef::new(Self::PORT_FACES, SocketKind::Faces))
            .input(SocketDef::new(Self::PORT_MATRIX, SocketKind::Matrix))
            .output(SocketDef::new(Self::PORT_OBJECTS, SocketKind::Objects))
            .property(Self::PROP_MERGE, serde_json::json!(false))
            .property(Self::PROP_BASE_NAME, serde_json::json!(""))
    }

    fn on_created(&self, node: &mut Node) {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        node.properties.insert(
            Self::PROP_BASE_NAME.to_string(),
            serde_json::json!(format!("{}.{}", node.name, &suffix[..8])),
        );
    }

    fn on_removed(&self, node: &Node, extensions: &ExecutorExtensions) {
        if let Some(scene) = scene_from(extensions) {
            scene.clear(&owner_key(node));
        }
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        let scene = channel
            .extensions()
            .require::<Arc<dyn SceneSink>>(extension_keys::SCENE)?
            .clone();
        let merge: bool = channel.property_as(Self::PROP_MERGE)?;

        let inputs = vec![
            channel.pull_owned(Self::PORT_VERTICES)?,
            channel.pull_owned(Self::PORT_EDGES)?,
            channel.pull_owned(Self::PORT_FACES)?,
            channel.pull_owned(Self::PORT_MATRIX)?,
        ];
        let options = BroadcastOptions::new(Alignment::Cycle, 1).with_defaults(vec![
            None,
            Some(NestedValue::empty()),
            Some(NestedValue::empty()),
            None,
        ]);
        let aligned = arbor_engine::broadcast_with(inputs, &options);
        let meshes = build_meshes(&aligned);
        let meshes = if merge { merge_meshes(meshes) } else { meshes };

        let owner = owner_key(channel.node());
        log::debug!("Mesh viewer '{}' publishing {} objects", owner, meshes.len());
        let handles = scene.publish(&owner, meshes);
        channel.push(Self::PORT_OBJECTS, handles.into())
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(MeshViewerKind) }));

fn owner_key(node: &Node) -> String {
    match node
        .properties
        .get(MeshViewerKind::PROP_BASE_NAME)
        .and_then(|v| v.as_str())
    {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}.{}", node.name, node.id.0),
    }
}

/// One mesh per object slot of the aligned channels
fn build_meshes(aligned: &[NestedValue]) -> Vec<MeshData> {
    let (verts, edges, faces, matrices) = (
        column(aligned, 0),
        column(aligned, 1),
        column(aligned, 2),
        column(aligned, 3),
    );
    let count = verts.len().max(matrices.len());

    (0..count)
        .map(|i| MeshData {
            vertices: verts.get(i).map(points).unwrap_or_default(),
            edges: edges
                .get(i)
                .map(indices)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|e| match e.as_slice() {
                    [a, b] => Some([*a, *b]),
                    _ => None,
                })
                .collect(),
            faces: faces.get(i).map(indices).unwrap_or_default(),
            matrix: matrices.get(i).and_then(|m| m.as_matrix()).copied(),
        })
        .collect()
}

fn column(aligned: &[NestedValue], channel: usize) -> &[NestedValue] {
    aligned.get(channel).and_then(|c| c.as_list()).unwrap_or(&[])
}

/// Bake matrices and join everything into a single mesh
fn merge_meshes(meshes: Vec<MeshData>) -> Vec<MeshData> {
    let mut merged = MeshData::default();
    for mut mesh in meshes {
        if let Some(matrix) = mesh.matrix.take() {
            mesh.apply_matrix(&matrix);
        }
        merged.join(mesh);
    }
    vec![merged]
}

fn points(object: &NestedValue) -> Vec<[f64; 3]> {
    object
        .as_list()
        .unwrap_or(&[])
        .iter()
        .filter_map(|p| {
            p.as_vector().or_else(|| match p.flatten_f64().as_slice() {
                [x, y, z] => Some([*x, *y, *z]),
                _ => None,
            })
        })
        .collect()
}

fn indices(object: &NestedValue) -> Vec<Vec<usize>> {
    object
        .as_list()
        .unwrap_or(&[])
        .iter()
        .map(|item| {
            item.as_list()
                .unwrap_or(&[])
                .iter()
                .filter_map(|i| i.as_i64().and_then(|i| usize::try_from(i).ok()))
                .collect()
        })
        .collect()
}
