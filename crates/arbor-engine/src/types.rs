//! Core types for dataflow trees
//!
//! Identifiers, socket kinds and socket definitions shared by the graph
//! model, the socket channel and the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::NestedValue;

/// Identifier of a node within one tree
///
/// Identifiers are handed out in creation order, so comparing two ids
/// compares creation order. The scheduler relies on this for tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a link within one tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// An output socket, addressed by node and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: NodeId,
    pub socket: usize,
}

impl OutputRef {
    pub fn new(node: NodeId, socket: usize) -> Self {
        Self { node, socket }
    }
}

/// An input socket, addressed by node and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputRef {
    pub node: NodeId,
    pub socket: usize,
}

impl InputRef {
    pub fn new(node: NodeId, socket: usize) -> Self {
        Self { node, socket }
    }
}

/// The semantic type of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketKind {
    /// Objects x points, vector leaves
    Vertices,
    /// Objects x edges x vertex indices
    Edges,
    /// Objects x faces x vertex indices
    Faces,
    /// Objects x numbers
    Numbers,
    /// List of 4x4 matrices
    Matrix,
    /// List of external object handles
    Objects,
    /// Accepts any data
    Any,
}

impl SocketKind {
    /// Nesting depth of data carried by this kind
    pub fn depth(self) -> usize {
        match self {
            Self::Vertices | Self::Numbers | Self::Any => 2,
            Self::Edges | Self::Faces => 3,
            Self::Matrix | Self::Objects => 1,
        }
    }

    /// Check if an output of this kind can feed an input of `target` kind
    pub fn is_convertible_to(self, target: SocketKind) -> bool {
        // Any is compatible with everything
        if self == Self::Any || target == Self::Any {
            return true;
        }

        // Generic data sockets share one representation
        if self.is_generic_data() && target.is_generic_data() {
            return true;
        }

        self == target
    }

    fn is_generic_data(self) -> bool {
        matches!(self, Self::Numbers | Self::Edges | Self::Faces)
    }
}

/// Fallback value used by an input socket that has no link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BoundDefault {
    /// A fixed value
    Literal(NestedValue),
    /// The current value of a node property
    Property(String),
}

/// Definition of a socket on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketDef {
    /// Socket name, unique per direction on one node
    pub name: String,
    /// Semantic type
    pub kind: SocketKind,
    /// Value used when an input is not linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<BoundDefault>,
}

impl SocketDef {
    /// Create a socket with no bound default
    pub fn new(name: impl Into<String>, kind: SocketKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bound: None,
        }
    }

    /// Bind this socket to a node property
    pub fn bound_to(mut self, property: impl Into<String>) -> Self {
        self.bound = Some(BoundDefault::Property(property.into()));
        self
    }

    /// Bind this socket to a literal value
    pub fn with_default(mut self, value: impl Into<NestedValue>) -> Self {
        self.bound = Some(BoundDefault::Literal(value.into()));
        self
    }
}

/// Evaluation state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Cached outputs reflect current inputs and configuration
    Clean,
    /// Something upstream or the node itself changed since the last compute
    Dirty,
    /// Being computed by an active pass
    Computing,
    /// The last compute attempt failed, or an upstream node failed
    Failed,
}
