//! Engine events.
//!
//! Each engine owns a broadcast channel; subscribers that lag behind lose the
//! oldest events rather than slowing the engine down.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::registry::TopologyEvent;

/// Something that happened inside an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TopologyChanged(TopologyEvent),
    Reset { run_id: Uuid },
    Stepped { from: String, to: String },
    StepFailed { node_id: String, message: String },
    RunFinished { node_id: String, steps: usize },
}

/// Fan-out of [`EngineEvent`]s to every subscriber.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Sending fails only when nobody is subscribed.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
