//! Error types for the dataflow engine

use thiserror::Error;

use crate::types::{LinkId, NodeId, SocketKind};

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Link between sockets whose kinds cannot be converted
    #[error("Incompatible sockets: cannot link {from:?} output to {to:?} input")]
    IncompatibleSocket { from: SocketKind, to: SocketKind },

    /// Destination input already has a link
    #[error("Input '{socket}' on node {node} is already linked")]
    DuplicateInputLink { node: NodeId, socket: String },

    /// The requested node set contains a cycle
    #[error("Cycle detected between nodes {}", format_nodes(.nodes))]
    CyclicGraph { nodes: Vec<NodeId> },

    /// A node's compute step failed
    #[error("Node {node} ('{name}') failed: {message}")]
    NodeCompute {
        node: NodeId,
        name: String,
        message: String,
    },

    /// A node was not computed because something upstream failed
    #[error("Node {node} skipped: upstream node {upstream} failed")]
    UpstreamFailed { node: NodeId, upstream: NodeId },

    /// A loaded node could not be reconciled with its registered kind
    #[error("Unrecognized shape for node {node} of kind '{kind}': {reason}")]
    UnrecognizedNodeShape {
        node: NodeId,
        kind: String,
        reason: String,
    },

    /// Node not present in the tree
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Socket not present on the node
    #[error("Unknown socket '{socket}' on node {node}")]
    UnknownSocket { node: NodeId, socket: String },

    /// Link not present in the tree
    #[error("Unknown link: {0}")]
    UnknownLink(LinkId),

    /// Kind not present in the registry
    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    /// A property could not be read as the requested type
    #[error("Invalid property '{name}': {message}")]
    InvalidProperty { name: String, message: String },

    /// A persisted tree references nodes or sockets that don't exist
    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    /// Raised by node kinds from inside compute
    #[error("{0}")]
    ComputeFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pass was cancelled
    #[error("Pass cancelled")]
    Cancelled,
}

impl EngineError {
    /// Create a compute failure with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ComputeFailed(msg.into())
    }

    /// Nodes this error is attributed to, if any
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Self::DuplicateInputLink { node, .. }
            | Self::NodeCompute { node, .. }
            | Self::UpstreamFailed { node, .. }
            | Self::UnrecognizedNodeShape { node, .. }
            | Self::UnknownSocket { node, .. }
            | Self::UnknownNode(node) => vec![*node],
            Self::CyclicGraph { nodes } => nodes.clone(),
            _ => Vec::new(),
        }
    }
}

fn format_nodes(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
