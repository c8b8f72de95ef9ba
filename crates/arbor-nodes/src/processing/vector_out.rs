//! Vector Out
//!
//! Splits vectors into X, Y and Z number channels, object by object.

use std::sync::Arc;

use arbor_engine::{
    KindRegistration, NestedValue, NodeCategory, NodeDescriptor, NodeKind, Result, SocketChannel,
    SocketDef, SocketKind,
};

pub struct VectorOutKind;

impl VectorOutKind {
    pub const KIND: &'static str = "vector-out";

    pub const PORT_VECTORS: &'static str = "Vectors";
    pub const PORT_X: &'static str = "X";
    pub const PORT_Y: &'static str = "Y";
    pub const PORT_Z: &'static str = "Z";
}

impl NodeKind for VectorOutKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::KIND, "Vector Out", NodeCategory::Processing)
            .description("Splits vectors into X, Y and Z")
            .input(SocketDef::new(Self::PORT_VECTORS, SocketKind::Vertices))
            .output(SocketDef::new(Self::PORT_X, SocketKind::Numbers))
            .output(SocketDef::new(Self::PORT_Y, SocketKind::Numbers))
            .output(SocketDef::new(Self::PORT_Z, SocketKind::Numbers))
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        let vectors = channel.pull(Self::PORT_VECTORS, false, None)?;
        let [xs, ys, zs] = split(&vectors);
        for (port, value) in [(Self::PORT_X, xs), (Self::PORT_Y, ys), (Self::PORT_Z, zs)] {
            if channel.is_linked(port) {
                channel.push(port, value)?;
            }
        }
        Ok(())
    }

    fn is_pure(&self) -> bool {
        true
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(VectorOutKind) }));

fn split(vectors: &NestedValue) -> [NestedValue; 3] {
    let mut axes: [Vec<NestedValue>; 3] = Default::default();
    for object in vectors.as_list().unwrap_or(&[]) {
        let mut columns: [Vec<NestedValue>; 3] = Default::default();
        for point in object.as_list().unwrap_or(&[]) {
            let Some(v) = point.as_vector() else {
                continue;
            };
            for (column, coordinate) in columns.iter_mut().zip(v) {
                column.push(NestedValue::Float(coordinate));
            }
        }
        for (axis, column) in axes.iter_mut().zip(columns) {
            axis.push(NestedValue::List(column));
        }
    }
    axes.map(NestedValue::List)
}
