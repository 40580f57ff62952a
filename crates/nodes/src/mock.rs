//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ExecutableNode, ExecutionContext, NodeError, Payload};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Append the node's name to the payload (an array; other values are
    /// wrapped into one first).
    Append,
    /// Fail with `NodeError::Failed`.
    Fail(String),
    /// Suspend until the step's cancellation token fires, then report
    /// `NodeError::Cancelled`.
    WaitForCancel,
}

/// A mock node that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions and appended to the payload.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    fn with(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that appends its name to the payload trail.
    pub fn appending(name: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Append)
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Fail(msg.into()))
    }

    /// Create a mock that never completes on its own.
    pub fn waiting_for_cancel(name: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::WaitForCancel)
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Inputs seen so far, in call order.
    pub fn inputs(&self) -> Vec<Value> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, input: Payload, ctx: &ExecutionContext) -> Result<Payload, NodeError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.clone());

        match &self.behaviour {
            MockBehaviour::Append => {
                let mut trail = match input {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                trail.push(json!(self.name));
                Ok(Value::Array(trail))
            }
            MockBehaviour::Fail(msg) => Err(NodeError::Failed(msg.clone())),
            MockBehaviour::WaitForCancel => {
                ctx.cancel.cancelled().await;
                Err(NodeError::Cancelled)
            }
        }
    }
}
