//! Event types for streaming pass progress
//!
//! Events are sent from the engine to the host (a UI, a log, a test) to
//! report which nodes ran, failed, were skipped or flagged.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Trait for receiving engine events
///
/// Abstracts over the transport (channel, UI bridge, collector) so the
/// engine does not depend on one.
pub trait EventSink: Send + Sync {
    /// Returns an error if the event could not be delivered
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when delivering an event fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A pass started over the given nodes
    #[serde(rename_all = "camelCase")]
    PassStarted {
        tree_id: String,
        pass_id: String,
        nodes: Vec<NodeId>,
    },

    /// A node computed successfully
    #[serde(rename_all = "camelCase")]
    NodeComputed {
        tree_id: String,
        pass_id: String,
        node: NodeId,
    },

    /// A node failed, or was not run because something upstream failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        tree_id: String,
        pass_id: String,
        node: NodeId,
        error: String,
    },

    /// A node was left dirty without running
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        tree_id: String,
        pass_id: String,
        node: NodeId,
        reason: String,
    },

    /// The pass found a cycle and computed nothing
    #[serde(rename_all = "camelCase")]
    CycleDetected {
        tree_id: String,
        pass_id: String,
        nodes: Vec<NodeId>,
    },

    /// The upgrade layer could not reconcile a node
    #[serde(rename_all = "camelCase")]
    NodeFlagged {
        tree_id: String,
        node: NodeId,
        reason: String,
    },

    /// The upgrade layer rewrote a node
    #[serde(rename_all = "camelCase")]
    NodeUpgraded {
        tree_id: String,
        node: NodeId,
        from: u32,
        to: u32,
    },

    /// A pass ran to the end
    #[serde(rename_all = "camelCase")]
    PassCompleted {
        tree_id: String,
        pass_id: String,
        computed: usize,
        failed: usize,
    },

    /// A pass stopped early on cancellation
    #[serde(rename_all = "camelCase")]
    PassCancelled { tree_id: String, pass_id: String },

    /// An edit marked nodes dirty
    #[serde(rename_all = "camelCase")]
    TreeModified { tree_id: String, dirty: Vec<NodeId> },
}

/// A sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A sink that collects events, for tests and diagnostics
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events over a tokio channel
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}
