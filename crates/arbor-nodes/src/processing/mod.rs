//! Processing nodes

mod scalar_math;
mod vector_out;

pub use scalar_math::{MathOp, ScalarMathKind};
pub use vector_out::VectorOutKind;
