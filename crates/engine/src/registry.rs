//! Node registry and edge index — the single source of truth for topology.
//!
//! Rules enforced:
//! 1. Node IDs are unique; registering an existing ID is rejected.
//! 2. Both endpoints of an edge must be registered.
//! 3. A node has at most one successor; a later edge from the same source
//!    replaces the earlier one.
//! 4. The source's declared output shape must be accepted by the target.
//!
//! Every successful mutation returns a [`TopologyEvent`] describing it. The
//! controller hands that event to the watcher, which invalidates execution
//! progress.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{NodeConfig, RegisteredNode, Successor};
use crate::EngineError;

/// A structural change to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopologyEvent {
    NodeAdded {
        node_id: String,
        terminal: bool,
    },
    EdgeSet {
        source: String,
        target: String,
        /// Previous target of `source`, if an edge was overwritten.
        replaced: Option<String>,
    },
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, RegisteredNode>,
    revision: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNodeId`] if the ID is taken. The existing node
    /// is left untouched.
    pub fn register_node(&mut self, config: NodeConfig) -> Result<TopologyEvent, EngineError> {
        if self.nodes.contains_key(&config.id) {
            return Err(EngineError::DuplicateNodeId(config.id));
        }

        let successor = if config.terminal { Successor::End } else { Successor::Unset };
        let node = RegisteredNode {
            id: config.id.clone(),
            kind: config.kind,
            input_shape: config.action.input_shape(),
            output_shape: config.action.output_shape(),
            action: config.action,
            description: config.description,
            successor,
        };
        self.nodes.insert(config.id.clone(), node);
        self.revision += 1;

        Ok(TopologyEvent::NodeAdded {
            node_id: config.id,
            terminal: config.terminal,
        })
    }

    /// Point `source` at `target`, replacing any previous successor.
    ///
    /// # Errors
    /// - [`EngineError::UnknownNodeReference`] if either end is unregistered.
    /// - [`EngineError::ShapeMismatch`] if `target` can't accept what
    ///   `source` produces.
    pub fn register_edge(&mut self, source: &str, target: &str) -> Result<TopologyEvent, EngineError> {
        let target_node = self.nodes.get(target).ok_or_else(|| EngineError::UnknownNodeReference {
            node_id: target.to_owned(),
            side: "target",
        })?;
        let target_shape = target_node.input_shape;

        let source_node = self.nodes.get_mut(source).ok_or_else(|| EngineError::UnknownNodeReference {
            node_id: source.to_owned(),
            side: "source",
        })?;

        if !target_shape.accepts(source_node.output_shape) {
            return Err(EngineError::ShapeMismatch {
                node_id: target.to_owned(),
                expected: target_shape,
                found: source_node.output_shape,
            });
        }

        let previous = std::mem::replace(&mut source_node.successor, Successor::Node(target.to_owned()));
        self.revision += 1;

        Ok(TopologyEvent::EdgeSet {
            source: source.to_owned(),
            target: target.to_owned(),
            replaced: previous.node_id().map(str::to_owned),
        })
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredNode> {
        self.nodes.get(id)
    }

    pub fn successor_of(&self, id: &str) -> Option<&Successor> {
        self.nodes.get(id).map(|n| &n.successor)
    }

    /// Registered IDs, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of structural mutations so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The node a step from `current` would enter.
    ///
    /// # Errors
    /// [`EngineError::UnresolvedSuccessor`] when `current` is unregistered,
    /// has no edge, is terminal, or points at an unregistered node.
    pub fn resolve_next(&self, current: &str) -> Result<&RegisteredNode, EngineError> {
        let unresolved = |successor: Option<String>| EngineError::UnresolvedSuccessor {
            node_id: current.to_owned(),
            successor,
        };

        match self.successor_of(current) {
            Some(Successor::Node(next)) => self.nodes.get(next).ok_or_else(|| unresolved(Some(next.clone()))),
            _ => Err(unresolved(None)),
        }
    }

    /// IDs that a full run from `start` would enter, in order.
    ///
    /// # Errors
    /// - [`EngineError::UnresolvedSuccessor`] if the chain breaks before a
    ///   terminal node.
    /// - [`EngineError::CycleDetected`] if the chain revisits a node.
    pub fn execution_order(&self, start: &str) -> Result<Vec<String>, EngineError> {
        let mut order = Vec::new();
        let mut seen: HashSet<&str> = HashSet::from([start]);
        let mut current = start;

        loop {
            match self.successor_of(current) {
                Some(Successor::End) => return Ok(order),
                Some(Successor::Node(_)) => {
                    let next = self.resolve_next(current)?;
                    if !seen.insert(next.id.as_str()) {
                        return Err(EngineError::CycleDetected(next.id.clone()));
                    }
                    order.push(next.id.clone());
                    current = next.id.as_str();
                }
                Some(Successor::Unset) | None => {
                    return Err(EngineError::UnresolvedSuccessor {
                        node_id: current.to_owned(),
                        successor: None,
                    })
                }
            }
        }
    }
}
