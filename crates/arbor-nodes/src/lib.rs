//! Arbor Nodes
//!
//! Built-in node kinds for the Arbor dataflow engine. Every kind submits
//! itself at link time, so `NodeRegistry::with_builtins()` picks all of them
//! up once this crate is linked.
//!
//! # Categories
//!
//! - **Input**: constants and vector assembly
//! - **Processing**: math and vector decomposition
//! - **Output**: viewers publishing into the scene collaborator

pub mod input;
pub mod output;
pub mod processing;
pub mod setup;

pub use input::*;
pub use output::*;
pub use processing::*;
pub use setup::{setup_extensions, setup_extensions_with_scene};
