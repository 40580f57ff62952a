//! `engine` crate — node registry, execution cursor and the flow controller.

pub mod config;
pub mod controller;
pub mod cursor;
pub mod definition;
pub mod error;
pub mod events;
pub mod mirror;
pub mod models;
pub mod registry;
pub mod watcher;

pub use config::EngineConfig;
pub use controller::FlowEngine;
pub use definition::{Edge, GraphDefinition, NodeDefinition};
pub use error::EngineError;
pub use events::EngineEvent;
pub use mirror::{EditorMirror, RecordingEditor, TracingEditor, VisualEdge, VisualNode};
pub use models::{ExecutionState, NodeConfig, NodeKind, RunOutcome, StepOutcome, Successor};
pub use registry::TopologyEvent;

#[cfg(test)]
mod controller_tests;
