//! Execution cursor: where execution stands and what it carries.
//!
//! The cursor also owns the in-flight guard. A `step` or `run` claims the
//! cursor with [`ExecutionCursor::begin`] and gets an [`OpTicket`] stamped
//! with the current generation. Every reset bumps the generation and cancels
//! the ticket's token, so a continuation that resumes after a reset can tell
//! it is stale and must not write.

use nodes::Payload;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::ExecutionState;
use crate::EngineError;

/// A failed step, kept until the next reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The node whose action was being entered.
    pub node_id: String,
    pub message: String,
}

/// Claim on the cursor held by an in-flight `step` or `run`.
#[derive(Debug, Clone)]
pub struct OpTicket {
    pub generation: u64,
    pub run_id: Uuid,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct ExecutionCursor {
    start_id: String,
    current_id: String,
    payload: Payload,
    initial: Payload,
    failure: Option<Failure>,
    generation: u64,
    run_id: Uuid,
    in_flight: Option<OpTicket>,
}

impl ExecutionCursor {
    pub fn new(start_id: impl Into<String>) -> Self {
        let start_id = start_id.into();
        Self {
            current_id: start_id.clone(),
            start_id,
            payload: Value::Null,
            initial: Value::Null,
            failure: None,
            generation: 0,
            run_id: Uuid::new_v4(),
            in_flight: None,
        }
    }

    /// Replace the payload every reset restores. Does not reset by itself.
    pub fn set_initial(&mut self, payload: Payload) {
        self.initial = payload;
    }

    /// Back to the start node with the initial payload.
    ///
    /// Drops any failure, releases and cancels the in-flight claim and
    /// starts a new generation.
    pub fn reset(&mut self) {
        if let Some(ticket) = self.in_flight.take() {
            ticket.cancel.cancel();
        }
        self.current_id.clone_from(&self.start_id);
        self.payload = self.initial.clone();
        self.failure = None;
        self.generation += 1;
        self.run_id = Uuid::new_v4();
    }

    /// Claim the cursor for a step or run.
    ///
    /// # Errors
    /// - [`EngineError::Busy`] if another operation holds the claim.
    /// - [`EngineError::ResetRequired`] if a failure is pending.
    pub fn begin(&mut self) -> Result<OpTicket, EngineError> {
        if self.in_flight.is_some() {
            return Err(EngineError::Busy);
        }
        if let Some(failure) = &self.failure {
            return Err(EngineError::ResetRequired {
                node_id: failure.node_id.clone(),
            });
        }

        let ticket = OpTicket {
            generation: self.generation,
            run_id: self.run_id,
            cancel: CancellationToken::new(),
        };
        self.in_flight = Some(ticket.clone());
        Ok(ticket)
    }

    /// Whether no reset has happened since `ticket` was issued.
    pub fn is_current(&self, ticket: &OpTicket) -> bool {
        self.generation == ticket.generation
    }

    /// Release the claim. A stale ticket releases nothing: its claim was
    /// already dropped by the reset that made it stale.
    pub fn finish(&mut self, ticket: &OpTicket) {
        if self.is_current(ticket) {
            self.in_flight = None;
        }
    }

    /// Record that `node_id` completed with `payload`.
    pub fn advance(&mut self, node_id: &str, payload: Payload) {
        self.current_id = node_id.to_owned();
        self.payload = payload;
    }

    /// Record a failed step. The cursor stays where it was.
    pub fn fail(&mut self, node_id: &str, message: impl Into<String>) {
        self.failure = Some(Failure {
            node_id: node_id.to_owned(),
            message: message.into(),
        });
    }

    pub fn start_id(&self) -> &str {
        &self.start_id
    }

    pub fn current_id(&self) -> &str {
        &self.current_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn initial(&self) -> &Payload {
        &self.initial
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True once the cursor has moved past the start node. Depends on the
    /// current ID alone.
    pub fn is_running(&self) -> bool {
        self.current_id != self.start_id
    }

    pub fn state(&self) -> ExecutionState {
        if self.failure.is_some() {
            ExecutionState::Failed
        } else if self.is_running() {
            ExecutionState::Running
        } else {
            ExecutionState::Idle
        }
    }
}
