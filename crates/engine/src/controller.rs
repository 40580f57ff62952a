//! Flow execution controller.
//!
//! `FlowEngine` is the central orchestrator:
//! 1. Registers nodes and edges, mirroring each one to the editor.
//! 2. Resets the cursor whenever the topology changes.
//! 3. `step` enters the successor of the current node, runs that node's
//!    action on the in-flight payload and moves the cursor onto it.
//! 4. `run` steps until the current node is terminal.
//!
//! The handle is cheap to clone. State sits behind a mutex that is never
//! held across an `.await`; concurrent callers are serialised by the
//! cursor's in-flight claim instead.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutionContext, Payload, PayloadShape};

use crate::config::EngineConfig;
use crate::cursor::{ExecutionCursor, Failure, OpTicket};
use crate::events::EngineEvent;
use crate::mirror::{EditorMirror, VisualEdge, VisualNode};
use crate::models::{ExecutionState, NodeConfig, RunOutcome, StepOutcome, Successor};
use crate::registry::NodeRegistry;
use crate::watcher::TopologyWatcher;
use crate::EngineError;

struct EngineState {
    registry: NodeRegistry,
    cursor: ExecutionCursor,
}

struct Inner {
    id: Uuid,
    config: EngineConfig,
    editor: Arc<dyn EditorMirror>,
    watcher: TopologyWatcher,
    state: Mutex<EngineState>,
}

/// In-flight claim on the cursor, released when the operation returns or
/// its future is dropped. Dropping also cancels the action's token.
struct Claim<'a> {
    engine: &'a FlowEngine,
    ticket: OpTicket,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.ticket.cancel.cancel();
        self.engine.lock().cursor.finish(&self.ticket);
    }
}

/// One independent flow graph and its execution state.
#[derive(Clone)]
pub struct FlowEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngine")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl FlowEngine {
    /// Create an empty engine that mirrors its topology to `editor`.
    pub fn new(editor: Arc<dyn EditorMirror>, config: EngineConfig) -> Self {
        let state = EngineState {
            registry: NodeRegistry::new(),
            cursor: ExecutionCursor::new(config.start_id.clone()),
        };
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                watcher: TopologyWatcher::new(config.event_capacity),
                config,
                editor,
                state: Mutex::new(state),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Graph construction
    // -----------------------------------------------------------------------

    /// Set the payload every reset restores, then reset.
    pub fn add_input(&self, payload: Payload) {
        let mut state = self.lock();
        state.cursor.set_initial(payload);
        self.inner.watcher.reset(&mut state.cursor);
    }

    /// Register a node and mirror it to the editor.
    ///
    /// The editor is called after the state lock is released, so concurrent
    /// registrations can reach the editor in a different order than the
    /// registry. Callers that need both orders to agree register from one
    /// task.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNodeId`] if the ID is already registered.
    pub fn add_node(&self, config: NodeConfig) -> Result<(), EngineError> {
        let visual = VisualNode {
            id: config.id.clone(),
            kind: config.kind,
            data: config.display.clone(),
        };

        {
            let mut state = self.lock();
            let event = state.registry.register_node(config)?;
            self.inner.watcher.observe_topology(event, &mut state.cursor);
        }

        self.inner.editor.create_node(visual);
        Ok(())
    }

    /// Make `target` the successor of `source` and mirror the edge.
    ///
    /// Mirrored outside the state lock, like [`FlowEngine::add_node`].
    ///
    /// # Errors
    /// [`EngineError::UnknownNodeReference`] or [`EngineError::ShapeMismatch`];
    /// nothing changes in either case.
    pub fn add_edge(&self, source: &str, target: &str) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            let event = state.registry.register_edge(source, target)?;
            self.inner.watcher.observe_topology(event, &mut state.cursor);
        }

        self.inner.editor.create_edge(VisualEdge::between(source, target));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Return to the start node with the initial payload.
    ///
    /// A step suspended in an action when this is called gets its
    /// cancellation token fired, and its result is thrown away.
    pub fn reset(&self) {
        let mut state = self.lock();
        self.inner.watcher.reset(&mut state.cursor);
        info!(engine_id = %self.inner.id, "engine reset");
    }

    /// Enter the successor of the current node.
    ///
    /// # Errors
    /// - [`EngineError::UnresolvedSuccessor`] if there is nothing to enter.
    /// - [`EngineError::ShapeMismatch`] if the payload doesn't fit the node.
    /// - [`EngineError::Action`] / [`EngineError::ActionTimeout`] if the
    ///   action fails; the engine then requires a reset.
    /// - [`EngineError::Busy`], [`EngineError::ResetRequired`],
    ///   [`EngineError::Superseded`] from the in-flight guard.
    #[instrument(skip(self), fields(engine_id = %self.inner.id))]
    pub async fn step(&self) -> Result<StepOutcome, EngineError> {
        let claim = self.claim()?;
        // Bound first so the claim outlives the borrowed future.
        let outcome = self.advance(&claim.ticket).await;
        outcome
    }

    /// Step until the current node is terminal.
    ///
    /// # Errors
    /// Anything [`FlowEngine::step`] returns, plus
    /// [`EngineError::StepLimitExceeded`] after `max_run_steps` steps.
    #[instrument(skip(self), fields(engine_id = %self.inner.id))]
    pub async fn run(&self) -> Result<RunOutcome, EngineError> {
        let claim = self.claim()?;
        let outcome = self.run_claimed(&claim.ticket).await;
        outcome
    }

    fn claim(&self) -> Result<Claim<'_>, EngineError> {
        let ticket = self.lock().cursor.begin()?;
        Ok(Claim { engine: self, ticket })
    }

    async fn run_claimed(&self, ticket: &OpTicket) -> Result<RunOutcome, EngineError> {
        let limit = self.inner.config.max_run_steps;
        let mut steps = 0usize;

        loop {
            {
                let state = self.lock();
                let current = state.cursor.current_id();
                if !state.cursor.is_current(ticket) {
                    return Err(EngineError::Superseded {
                        node_id: current.to_owned(),
                    });
                }
                if state.registry.successor_of(current).is_some_and(Successor::is_end) {
                    info!(node = %current, steps, payload = %state.cursor.payload(), "run reached terminal node");
                    self.inner.watcher.publish(EngineEvent::RunFinished {
                        node_id: current.to_owned(),
                        steps,
                    });
                    return Ok(RunOutcome {
                        steps,
                        node_id: current.to_owned(),
                        payload: state.cursor.payload().clone(),
                    });
                }
            }

            if steps >= limit {
                warn!(limit, "run stopped at step limit");
                return Err(EngineError::StepLimitExceeded(limit));
            }

            self.advance(ticket).await?;
            steps += 1;
        }
    }

    /// One step under an existing claim.
    async fn advance(&self, ticket: &OpTicket) -> Result<StepOutcome, EngineError> {
        let (from, next, input) = {
            let state = self.lock();
            let from = state.cursor.current_id().to_owned();
            if !state.cursor.is_current(ticket) {
                return Err(EngineError::Superseded { node_id: from });
            }

            let next = state.registry.resolve_next(&from)?.clone();
            let input = state.cursor.payload().clone();
            if !next.input_shape.matches(&input) {
                return Err(EngineError::ShapeMismatch {
                    node_id: next.id,
                    expected: next.input_shape,
                    found: PayloadShape::of(&input),
                });
            }
            (from, next, input)
        };

        let ctx = ExecutionContext {
            engine_id: self.inner.id,
            run_id: ticket.run_id,
            node_id: next.id.clone(),
            cancel: ticket.cancel.clone(),
        };
        debug!(from = %from, to = %next.id, payload = %input, "entering node");

        let executed = match self.inner.config.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, next.action.execute(input, &ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    return self.commit_failure(ticket, &next.id, EngineError::ActionTimeout {
                        node_id: next.id.clone(),
                        timeout,
                    })
                }
            },
            None => next.action.execute(input, &ctx).await,
        };

        let payload = match executed {
            Ok(payload) => payload,
            Err(source) => {
                return self.commit_failure(ticket, &next.id, EngineError::Action {
                    node_id: next.id.clone(),
                    source,
                })
            }
        };
        if !next.output_shape.matches(&payload) {
            let err = EngineError::ShapeMismatch {
                node_id: next.id.clone(),
                expected: next.output_shape,
                found: PayloadShape::of(&payload),
            };
            return self.commit_failure(ticket, &next.id, err);
        }

        let mut state = self.lock();
        if !state.cursor.is_current(ticket) {
            warn!(node = %next.id, "discarding step result superseded by reset");
            return Err(EngineError::Superseded { node_id: next.id });
        }

        state.cursor.advance(&next.id, payload.clone());
        self.inner.watcher.observe_cursor(&state.cursor);
        self.inner.watcher.publish(EngineEvent::Stepped {
            from,
            to: next.id.clone(),
        });
        debug!(node = %next.id, payload = %payload, "node completed");

        let reached_end = state
            .registry
            .successor_of(&next.id)
            .is_some_and(Successor::is_end);
        Ok(StepOutcome {
            node_id: next.id,
            payload,
            reached_end,
        })
    }

    /// Record a failed step unless a reset already superseded it.
    fn commit_failure<T>(&self, ticket: &OpTicket, node_id: &str, err: EngineError) -> Result<T, EngineError> {
        let mut state = self.lock();
        if !state.cursor.is_current(ticket) {
            warn!(node = %node_id, error = %err, "discarding failure superseded by reset");
            return Err(EngineError::Superseded {
                node_id: node_id.to_owned(),
            });
        }

        error!(node = %node_id, error = %err, "step failed");
        state.cursor.fail(node_id, err.to_string());
        self.inner.watcher.publish(EngineEvent::StepFailed {
            node_id: node_id.to_owned(),
            message: err.to_string(),
        });
        Err(err)
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn current_id(&self) -> String {
        self.lock().cursor.current_id().to_owned()
    }

    pub fn payload(&self) -> Payload {
        self.lock().cursor.payload().clone()
    }

    pub fn initial_input(&self) -> Payload {
        self.lock().cursor.initial().clone()
    }

    /// True once the cursor has left the start node.
    pub fn is_running(&self) -> bool {
        self.lock().cursor.is_running()
    }

    pub fn state(&self) -> ExecutionState {
        self.lock().cursor.state()
    }

    pub fn failure(&self) -> Option<Failure> {
        self.lock().cursor.failure().cloned()
    }

    pub fn successor_of(&self, id: &str) -> Option<Successor> {
        self.lock().registry.successor_of(id).cloned()
    }

    pub fn description(&self, id: &str) -> Option<String> {
        self.lock().registry.get(id).map(|n| n.description.clone())
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.lock().registry.node_ids()
    }

    /// Number of topology mutations so far.
    pub fn revision(&self) -> u64 {
        self.lock().registry.revision()
    }

    /// Node IDs a full run from the start node would enter.
    pub fn execution_order(&self) -> Result<Vec<String>, EngineError> {
        let state = self.lock();
        state.registry.execution_order(state.cursor.start_id())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.watcher.subscribe()
    }

    /// Receiver of the derived `running` flag.
    pub fn running_watch(&self) -> watch::Receiver<bool> {
        self.inner.watcher.running()
    }
}
