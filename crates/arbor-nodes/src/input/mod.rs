//! Input nodes
//!
//! Nodes that turn properties into socket data.

mod number;
mod vector_in;

pub use number::NumberKind;
pub use vector_in::VectorInKind;
