//! Scalar Math
//!
//! Applies a binary operation to two Numbers channels. Objects are paired
//! cyclically; within a pair of objects the shorter list repeats its last
//! element.
//!
//! Version 1 of this kind named its sockets `X`, `Y` and `Out` and stored the
//! operation as an upper-case `mode` property. [`upgrade_v1`] rewrites such
//! nodes to the current shape.

use std::str::FromStr;
use std::sync::Arc;

use arbor_engine::{
    Alignment, BroadcastOptions, EngineError, KindRegistration, NestedValue, Node, NodeCategory,
    NodeDescriptor, NodeKind, Result, SocketChannel, SocketDef, SocketKind, UpgradeRegistration,
};
use serde::{Deserialize, Serialize};

/// Operation applied element-wise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Min,
    Max,
}

impl MathOp {
    pub const ALL: [MathOp; 7] = [
        MathOp::Add,
        MathOp::Subtract,
        MathOp::Multiply,
        MathOp::Divide,
        MathOp::Power,
        MathOp::Min,
        MathOp::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Subtract => "subtract",
            MathOp::Multiply => "multiply",
            MathOp::Divide => "divide",
            MathOp::Power => "power",
            MathOp::Min => "min",
            MathOp::Max => "max",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> Result<f64> {
        Ok(match self {
            MathOp::Add => a + b,
            MathOp::Subtract => a - b,
            MathOp::Multiply => a * b,
            MathOp::Divide => {
                if b == 0.0 {
                    return Err(EngineError::failed("division by zero"));
                }
                a / b
            }
            MathOp::Power => a.powf(b),
            MathOp::Min => a.min(b),
            MathOp::Max => a.max(b),
        })
    }
}

impl FromStr for MathOp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        MathOp::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidProperty {
                name: ScalarMathKind::PROP_OPERATION.to_string(),
                message: format!("unknown operation '{s}'"),
            })
    }
}

pub struct ScalarMathKind;

impl ScalarMathKind {
    pub const KIND: &'static str = "scalar-math";
    pub const VERSION: u32 = 2;

    pub const PORT_A: &'static str = "A";
    pub const PORT_B: &'static str = "B";
    pub const PORT_RESULT: &'static str = "Result";

    pub const PROP_A: &'static str = "a";
    pub const PROP_B: &'static str = "b";
    pub const PROP_OPERATION: &'static str = "operation";
}

impl NodeKind for ScalarMathKind {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new(Self::KIND, "Scalar Math", NodeCategory::Processing)
            .version(Self::VERSION)
            .description("Element-wise math on two number channels")
            .input(SocketDef::new(Self::PORT_A, SocketKind::Numbers).bound_to(Self::PROP_A))
            .input(SocketDef::new(Self::PORT_B, SocketKind::Numbers).bound_to(Self::PROP_B))
            .output(SocketDef::new(Self::PORT_RESULT, SocketKind::Numbers))
            .property(Self::PROP_A, serde_json::json!(0.0))
            .property(Self::PROP_B, serde_json::json!(0.0))
            .property(Self::PROP_OPERATION, serde_json::json!("add"))
    }

    fn compute(&self, channel: &mut SocketChannel<'_>) -> Result<()> {
        let op: MathOp = channel.property_as(Self::PROP_OPERATION)?;
        let inputs = vec![
            channel.pull_owned(Self::PORT_A)?,
            channel.pull_owned(Self::PORT_B)?,
        ];
        let result = apply_aligned(op, inputs)?;
        channel.push(Self::PORT_RESULT, result)
    }

    fn is_pure(&self) -> bool {
        true
    }
}

inventory::submit!(KindRegistration(|| -> Arc<dyn NodeKind> { Arc::new(ScalarMathKind) }));

inventory::submit!(UpgradeRegistration {
    kind: ScalarMathKind::KIND,
    from: 1,
    to: 2,
    apply: upgrade_v1,
});

fn apply_aligned(op: MathOp, inputs: Vec<NestedValue>) -> Result<NestedValue> {
    let options = BroadcastOptions::new(Alignment::RepeatLast, 2).at_level(0, Alignment::Cycle);
    let mut aligned = arbor_engine::broadcast_with(inputs, &options).into_iter();
    let (Some(a), Some(b)) = (aligned.next(), aligned.next()) else {
        return Ok(NestedValue::empty());
    };

    let objects = a
        .into_list()
        .into_iter()
        .zip(b.into_list())
        .map(|(xs, ys)| {
            let values = xs
                .into_list()
                .iter()
                .zip(ys.into_list().iter())
                .map(|(x, y)| {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    op.apply(x, y).map(NestedValue::Float)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(NestedValue::List(values))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(NestedValue::List(objects))
}

/// Rewrite a version 1 node: `X`/`Y`/`Out` sockets become `A`/`B`/`Result`
/// and the upper-case `mode` property becomes `operation`
pub fn upgrade_v1(node: &mut Node) -> Result<()> {
    for (old, new, property) in [
        ("X", ScalarMathKind::PORT_A, ScalarMathKind::PROP_A),
        ("Y", ScalarMathKind::PORT_B, ScalarMathKind::PROP_B),
    ] {
        let index = node.input_index(old).ok_or_else(|| EngineError::UnknownSocket {
            node: node.id,
            socket: old.to_string(),
        })?;
        node.inputs[index] = SocketDef::new(new, SocketKind::Numbers).bound_to(property);

        let value = node
            .properties
            .remove(&old.to_ascii_lowercase())
            .unwrap_or_else(|| serde_json::json!(0.0));
        node.properties.insert(property.to_string(), value);
    }

    let out = node.output_index("Out").ok_or_else(|| EngineError::UnknownSocket {
        node: node.id,
        socket: "Out".to_string(),
    })?;
    node.outputs[out] = SocketDef::new(ScalarMathKind::PORT_RESULT, SocketKind::Numbers);

    let mode = node
        .properties
        .remove("mode")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "ADD".to_string());
    let op: MathOp = mode.parse()?;
    node.properties.insert(
        ScalarMathKind::PROP_OPERATION.to_string(),
        serde_json::json!(op.as_str()),
    );
    Ok(())
}
