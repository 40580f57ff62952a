//! The `ExecutableNode` trait — the contract every node action must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{NodeError, PayloadShape};

/// The value threaded from node to node.
pub type Payload = Value;

/// Context handed to an action for the duration of one step.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the engine instance driving this step.
    pub engine_id: Uuid,
    /// ID of the current run; a new one starts on every reset.
    pub run_id: Uuid,
    /// ID of the node being entered.
    pub node_id: String,
    /// Cancelled when the engine is reset while this step is in flight.
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    /// A context that is never cancelled, for driving actions outside an engine.
    pub fn detached(node_id: impl Into<String>) -> Self {
        Self {
            engine_id: Uuid::nil(),
            run_id: Uuid::new_v4(),
            node_id: node_id.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// The core node trait.
///
/// The engine calls `execute` when a step *enters* the node, passing the
/// payload produced by the previous node, and keeps whatever comes back.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Transform the in-flight payload.
    async fn execute(&self, input: Payload, ctx: &ExecutionContext) -> Result<Payload, NodeError>;

    /// Shape this node accepts. Checked when an edge into the node is
    /// registered and again before each execution.
    fn input_shape(&self) -> PayloadShape {
        PayloadShape::Any
    }

    /// Shape this node promises to return.
    fn output_shape(&self) -> PayloadShape {
        PayloadShape::Any
    }
}
