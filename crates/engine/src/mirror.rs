//! Boundary with the graph editor.
//!
//! The engine tells the editor about every node and edge it registers so the
//! canvas can draw them. Calls are fire-and-forget and the editor never
//! writes back into the engine.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::models::NodeKind;

/// Visual counterpart of a registered node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualNode {
    pub id: String,
    pub kind: NodeKind,
    /// Initial display payload.
    pub data: Value,
}

/// Visual counterpart of a registered edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisualEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl VisualEdge {
    pub fn between(source: &str, target: &str) -> Self {
        Self {
            id: format!("{source}_to_{target}"),
            source: source.to_owned(),
            target: target.to_owned(),
        }
    }
}

/// Receiver of mirrored create calls.
pub trait EditorMirror: Send + Sync {
    fn create_node(&self, node: VisualNode);
    fn create_edge(&self, edge: VisualEdge);
}

/// Editor stand-in that only logs. Used when no canvas is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEditor;

impl EditorMirror for TracingEditor {
    fn create_node(&self, node: VisualNode) {
        debug!(id = %node.id, kind = ?node.kind, data = %node.data, "editor: create node");
    }

    fn create_edge(&self, edge: VisualEdge) {
        debug!(id = %edge.id, source = %edge.source, target = %edge.target, "editor: create edge");
    }
}

/// Keeps every mirrored call in memory.
#[derive(Debug, Default)]
pub struct RecordingEditor {
    nodes: Mutex<Vec<VisualNode>>,
    edges: Mutex<Vec<VisualEdge>>,
}

impl RecordingEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<VisualNode> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn edges(&self) -> Vec<VisualEdge> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EditorMirror for RecordingEditor {
    fn create_node(&self, node: VisualNode) {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).push(node);
    }

    fn create_edge(&self, edge: VisualEdge) {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner).push(edge);
    }
}
