//! Arbor Engine - incremental dataflow evaluation for node-based geometry
//!
//! Trees of nodes exchange ragged nested values over typed sockets. The
//! engine keeps every tree's outputs cached and, after an edit, recomputes
//! only the forward closure of what changed. It supports:
//!
//! - Broadcasting of ragged inputs (repeat-last or cyclic alignment)
//! - Deterministic topological passes with cycle reporting
//! - Failure isolation: a failing node fails its consumers, nothing else
//! - Group nodes evaluating embedded subtrees
//! - Versioned node kinds with in-place upgrades on load
//! - JSON persistence and compressed snapshot undo/redo
//! - A periodic tick driver on tokio
//!
//! # Architecture
//!
//! - `NodeRegistry`: kind identifier to `NodeKind` implementation, plus upgrades
//! - `Tree`: nodes and links with an incrementally maintained adjacency index
//! - `TreeSession`: a tree with its dirty set, statuses and output cache
//! - `Engine`: runs passes over sessions and streams `EngineEvent`s
//!
//! # Example
//!
//! ```ignore
//! use arbor_engine::{Engine, NodeRegistry};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(Arc::new(NodeRegistry::with_builtins()));
//! let mut session = engine.new_tree("main", "Main");
//! let n = session.add_node("number", "N")?;
//! let report = engine.run_pass(&mut session);
//! ```

pub mod broadcast;
pub mod builder;
pub mod channel;
pub mod config;
pub mod descriptor;
pub mod dirty;
pub mod engine;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod groups;
pub mod persist;
pub mod registry;
pub mod scheduler;
pub mod tick;
pub mod types;
pub mod undo;
pub mod upgrade;
pub mod value;

// Re-export key types
pub use broadcast::{broadcast, broadcast_with, Alignment, BroadcastOptions};
pub use builder::TreeBuilder;
pub use channel::{resolve_input, OutputCache, SocketChannel};
pub use config::EngineConfig;
pub use descriptor::{NodeCategory, NodeDescriptor, PropertyDef};
pub use engine::{CancelToken, Engine, PassReport, TreeSession};
pub use error::{EngineError, Result};
pub use events::{ChannelEventSink, EngineEvent, EventSink, NullEventSink, VecEventSink};
pub use extensions::{extension_keys, ExecutorExtensions};
pub use graph::{Link, Node, Tree};
pub use groups::{GROUP_INPUT_KIND, GROUP_KIND, GROUP_OUTPUT_KIND};
pub use persist::{PersistedTree, TreeStore};
pub use registry::{KindRegistration, NodeKind, NodeRegistry, UpgradeRegistration};
pub use tick::{spawn_configured_ticker, spawn_ticker, TickHandle};
pub use types::{BoundDefault, InputRef, LinkId, NodeId, NodeStatus, OutputRef, SocketDef, SocketKind};
pub use undo::UndoStack;
pub use upgrade::{upgrade_tree, UpgradeReport};
pub use value::{Matrix4, NestedValue};
