//! Number
//!
//! Publishes its `value` property as a single-object Numbers value.

use std::sync::Arc;

use arbor_engine::{
    KindRegistration, NodeCategory, NodeDescriptor, NodeKind, Result, SocketChannel, SocketDef,
    SocketKind,
};

pub struct NumberKind;

impl NumberKind {
    pub const KIND: &'static str = "number";
    pub const PORT_VALUE: &'static str = "Value";
    pub const PROP_VALUE: &'static str = "value";
}

impl NodeKind for NumberKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::KIND, "Number", NodeCategory::Input)
            .description("A constant number")
            .output(SocketDef::new(Self::PORT_VALUE, SocketKind::Numbers))
            .property(Self::PROP_VALUE, serde_json::json!(0.0))
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        let value: f64 = channel.property_as(Self::PROP_VALUE)?;
        channel.push(Self::PORT_VALUE, vec![vec![value]].into())
    }

    fn is_pure(&self) -> bool {
        true
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(NumberKind) }));
