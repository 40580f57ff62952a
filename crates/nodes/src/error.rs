//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method or by a catalog factory.
///
/// The engine never retries: any of these aborts the current step and puts
/// the engine into its failed state until the caller resets it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// The action ran and could not produce an output.
    #[error("node action failed: {0}")]
    Failed(String),

    /// The incoming payload is not something this node can work with.
    #[error("invalid node input: {0}")]
    InvalidInput(String),

    /// The node's static configuration is unusable.
    #[error("invalid node config: {0}")]
    InvalidConfig(String),

    /// The action observed the cancellation token and gave up.
    #[error("node action cancelled")]
    Cancelled,
}
