//! Engine-level error types.

use std::time::Duration;

use nodes::{NodeError, PayloadShape};
use thiserror::Error;

/// Errors produced by the flow engine (registration + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Registration errors ------

    /// A node with this ID is already registered.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that isn't registered.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Declared shapes on either side of an edge (or of a step) disagree.
    #[error("shape mismatch at node '{node_id}': expected {expected}, found {found}")]
    ShapeMismatch {
        node_id: String,
        expected: PayloadShape,
        found: PayloadShape,
    },

    /// Following successors from the start node loops back on itself.
    #[error("flow graph contains a cycle through '{0}'")]
    CycleDetected(String),

    // ------ Execution errors ------

    /// The current node has no usable successor: either no edge was ever
    /// registered from it, or the node itself is not registered.
    #[error("node '{node_id}' has no resolvable successor{}", fmt_successor(.successor))]
    UnresolvedSuccessor {
        node_id: String,
        successor: Option<String>,
    },

    /// The entered node's action failed; the cursor was not advanced.
    #[error("node '{node_id}' failed: {source}")]
    Action {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// The entered node's action did not finish in time.
    #[error("node '{node_id}' timed out after {timeout:?}")]
    ActionTimeout { node_id: String, timeout: Duration },

    /// A previous step failed; `reset` must be called before stepping again.
    #[error("execution failed at node '{node_id}'; reset required")]
    ResetRequired { node_id: String },

    /// Another step or run is already in flight on this engine.
    #[error("another step is already in flight")]
    Busy,

    /// The engine was reset while this step was suspended; its result was
    /// discarded.
    #[error("step into node '{node_id}' was superseded by a reset")]
    Superseded { node_id: String },

    /// `run` entered more nodes than the configured limit.
    #[error("run exceeded the limit of {0} steps")]
    StepLimitExceeded(usize),

    // ------ Definition errors ------

    /// A graph definition names a node type the catalog doesn't know.
    #[error("node '{node_id}' has unknown node type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    /// The catalog rejected a node's config.
    #[error("node '{node_id}' has invalid config: {source}")]
    InvalidNodeConfig {
        node_id: String,
        #[source]
        source: NodeError,
    },
}

fn fmt_successor(successor: &Option<String>) -> String {
    match successor {
        Some(id) => format!(" (points at unregistered node '{id}')"),
        None => String::new(),
    }
}
