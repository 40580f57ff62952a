//! Serializable graph definitions.
//!
//! A definition names each node's type instead of carrying its action; the
//! action is built from a [`NodeCatalog`] when the definition is loaded.
//! Nodes are registered before edges, so the order of entries in the file
//! has no effect on execution order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use nodes::NodeCatalog;

use crate::config::{EngineConfig, DEFAULT_START_ID};
use crate::controller::FlowEngine;
use crate::mirror::EditorMirror;
use crate::models::{NodeConfig, NodeKind};
use crate::EngineError;

fn default_start() -> String {
    DEFAULT_START_ID.to_owned()
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single node in a graph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Name of a type registered in the catalog.
    pub node_type: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub description: String,
    /// Passed to the catalog factory.
    #[serde(default)]
    pub config: Value,
    /// Initial display payload for the editor.
    #[serde(default)]
    pub display: Value,
    /// Whether `run` halts after entering this node.
    #[serde(default)]
    pub terminal: bool,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to its successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

// ---------------------------------------------------------------------------
// GraphDefinition
// ---------------------------------------------------------------------------

/// A complete graph: nodes, edges and the initial payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// ID of the start node.
    #[serde(default = "default_start")]
    pub start: String,
    /// Initial payload.
    #[serde(default)]
    pub input: Value,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Create a fresh engine whose start node is this definition's `start`,
    /// then load the definition into it.
    pub fn build(
        &self,
        editor: Arc<dyn EditorMirror>,
        config: EngineConfig,
        catalog: &NodeCatalog,
    ) -> Result<FlowEngine, EngineError> {
        let engine = FlowEngine::new(editor, config.with_start_id(self.start.clone()));
        self.load_into(&engine, catalog)?;
        Ok(engine)
    }

    /// Register every node, then every edge, then set the input.
    ///
    /// # Errors
    /// - [`EngineError::UnknownNodeType`] for a type missing from `catalog`.
    /// - [`EngineError::InvalidNodeConfig`] when a factory rejects a config.
    /// - Any registration error from [`FlowEngine::add_node`] or
    ///   [`FlowEngine::add_edge`].
    pub fn load_into(&self, engine: &FlowEngine, catalog: &NodeCatalog) -> Result<(), EngineError> {
        for def in &self.nodes {
            let action = catalog
                .build(&def.node_type, &def.config)
                .ok_or_else(|| EngineError::UnknownNodeType {
                    node_id: def.id.clone(),
                    node_type: def.node_type.clone(),
                })?
                .map_err(|source| EngineError::InvalidNodeConfig {
                    node_id: def.id.clone(),
                    source,
                })?;

            let mut config = NodeConfig::from_arc(def.id.clone(), def.kind, action)
                .description(def.description.clone())
                .display(def.display.clone());
            if def.terminal {
                config = config.terminal();
            }
            engine.add_node(config)?;
        }

        for edge in &self.edges {
            engine.add_edge(&edge.from, &edge.to)?;
        }

        engine.add_input(self.input.clone());
        info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            start = %self.start,
            "graph definition loaded"
        );
        Ok(())
    }
}
