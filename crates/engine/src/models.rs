//! Core domain models for the flow engine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodes::{ExecutableNode, Payload, PayloadShape};

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// Presentation role of a node. The editor picks a visual style from it; the
/// engine never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    #[default]
    Transform,
    Sink,
}

// ---------------------------------------------------------------------------
// Successor
// ---------------------------------------------------------------------------

/// Where execution goes after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Successor {
    /// No edge has been registered from this node and it isn't terminal.
    Unset,
    /// Terminal node: `run` stops once it has been entered.
    End,
    /// The node an edge points at.
    Node(String),
}

impl Successor {
    pub fn is_end(&self) -> bool {
        matches!(self, Successor::End)
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Successor::Node(id) => Some(id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Everything needed to register a node.
pub struct NodeConfig {
    pub id: String,
    pub kind: NodeKind,
    pub action: Arc<dyn ExecutableNode>,
    pub description: String,
    /// Initial display data forwarded to the editor.
    pub display: Value,
    /// Register the node with `Successor::End` instead of `Successor::Unset`.
    pub terminal: bool,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, kind: NodeKind, action: impl ExecutableNode + 'static) -> Self {
        Self::from_arc(id, kind, Arc::new(action))
    }

    pub fn from_arc(id: impl Into<String>, kind: NodeKind, action: Arc<dyn ExecutableNode>) -> Self {
        Self {
            id: id.into(),
            kind,
            action,
            description: String::new(),
            display: Value::Null,
            terminal: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn display(mut self, display: Value) -> Self {
        self.display = display;
        self
    }

    /// Mark the node as a sink: `run` halts after entering it.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

// ---------------------------------------------------------------------------
// RegisteredNode
// ---------------------------------------------------------------------------

/// A node as held by the registry.
#[derive(Clone)]
pub struct RegisteredNode {
    pub id: String,
    pub kind: NodeKind,
    pub action: Arc<dyn ExecutableNode>,
    pub description: String,
    pub successor: Successor,
    pub input_shape: PayloadShape,
    pub output_shape: PayloadShape,
}

impl fmt::Debug for RegisteredNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("successor", &self.successor)
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// Derived execution state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Cursor is on the start node.
    Idle,
    /// At least one step has completed since the last reset.
    Running,
    /// A step failed; only `reset` leaves this state.
    Failed,
}

/// Result of a single successful `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// The node that was entered.
    pub node_id: String,
    /// Payload returned by its action.
    pub payload: Payload,
    /// Whether the entered node is terminal.
    pub reached_end: bool,
}

/// Result of a successful `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Number of steps taken by this call.
    pub steps: usize,
    /// Node the cursor rests on.
    pub node_id: String,
    pub payload: Payload,
}
