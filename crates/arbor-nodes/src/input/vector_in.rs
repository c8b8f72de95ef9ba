//! Vector In
//!
//! Zips X, Y and Z number channels into vectors. Object counts and the
//! element counts within each object are aligned by repeating the last
//! entry of the shorter channels.

use std::sync::Arc;

use arbor_engine::{
    Alignment, KindRegistration, NestedValue, NodeCategory, NodeDescriptor, NodeKind, Result,
    SocketChannel, SocketDef, SocketKind,
};

pub struct VectorInKind;

impl VectorInKind {
    pub const KIND: &'static str = "vector-in";

    pub const PORT_X: &'static str = "X";
    pub const PORT_Y: &'static str = "Y";
    pub const PORT_Z: &'static str = "Z";
    pub const PORT_VECTORS: &'static str = "Vectors";
}

impl NodeKind for VectorInKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::KIND, "Vector In", NodeCategory::Input)
            .description("Builds vectors from X, Y and Z numbers")
            .input(SocketDef::new(Self::PORT_X, SocketKind::Numbers).bound_to("x"))
            .input(SocketDef::new(Self::PORT_Y, SocketKind::Numbers).bound_to("y"))
            .input(SocketDef::new(Self::PORT_Z, SocketKind::Numbers).bound_to("z"))
            .output(SocketDef::new(Self::PORT_VECTORS, SocketKind::Vertices))
            .property("x", serde_json::json!(0.0))
            .property("y", serde_json::json!(0.0))
            .property("z", serde_json::json!(0.0))
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        if !channel.is_linked(Self::PORT_VECTORS) {
            return Ok(());
        }
        let inputs = vec![
            channel.pull_owned(Self::PORT_X)?,
            channel.pull_owned(Self::PORT_Y)?,
            channel.pull_owned(Self::PORT_Z)?,
        ];
        channel.push(Self::PORT_VECTORS, zip_vectors(inputs))
    }

    fn is_pure(&self) -> bool {
        true
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(VectorInKind) }));

fn zip_vectors(inputs: Vec<NestedValue>) -> NestedValue {
    // An empty channel means no objects at all
    if inputs.iter().any(NestedValue::is_empty) {
        return NestedValue::empty();
    }
    let aligned = arbor_engine::broadcast(inputs, Alignment::RepeatLast, 2);
    let [xs, ys, zs] = match <[NestedValue; 3]>::try_from(aligned) {
        Ok(channels) => channels,
        Err(_) => return NestedValue::empty(),
    };

    let objects = xs
        .into_list()
        .into_iter()
        .zip(ys.into_list())
        .zip(zs.into_list())
        .map(|((x, y), z)| {
            let points: Vec<NestedValue> = x
                .into_list()
                .iter()
                .zip(y.into_list().iter())
                .zip(z.into_list().iter())
                .map(|((x, y), z)| {
                    NestedValue::Vector([
                        x.as_f64().unwrap_or(0.0),
                        y.as_f64().unwrap_or(0.0),
                        z.as_f64().unwrap_or(0.0),
                    ])
                })
                .collect();
            NestedValue::List(points)
        })
        .collect();
    NestedValue::List(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_last_per_level() {
        let x = NestedValue::from(vec![vec![1.0, 2.0, 3.0], vec![10.0]]);
        let y = NestedValue::from(vec![vec![0.5]]);
        let z = NestedValue::from(vec![vec![0.0, 1.0]]);

        let vectors = zip_vectors(vec![x, y, z]);

        assert_eq!(
            vectors,
            NestedValue::from(vec![
                vec![[1.0, 0.5, 0.0], [2.0, 0.5, 1.0], [3.0, 0.5, 1.0]],
                vec![[10.0, 0.5, 0.0], [10.0, 0.5, 1.0]],
            ])
        );
    }

    #[test]
    fn test_empty_channel_yields_no_objects() {
        let x = NestedValue::from(vec![vec![1.0]]);
        let vectors = zip_vectors(vec![x, NestedValue::empty(), NestedValue::from(vec![vec![0.0]])]);
        assert!(vectors.is_empty());
    }
}
