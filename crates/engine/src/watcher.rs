//! Topology watcher.
//!
//! Consumes the [`TopologyEvent`]s the registry returns and resets the cursor
//! for every one of them: any structural edit invalidates all progress, even
//! when it touches nodes off the current path. It also derives the `running`
//! flag from the cursor and publishes it on a watch channel.

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::cursor::ExecutionCursor;
use crate::events::{EngineEvent, EventBus};
use crate::registry::TopologyEvent;

#[derive(Debug)]
pub struct TopologyWatcher {
    events: EventBus,
    running: watch::Sender<bool>,
}

impl TopologyWatcher {
    pub fn new(event_capacity: usize) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            events: EventBus::new(event_capacity),
            running,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn running(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        self.events.publish(event);
    }

    /// React to a structural change: reset the cursor and announce both.
    pub fn observe_topology(&self, event: TopologyEvent, cursor: &mut ExecutionCursor) {
        info!(?event, "topology changed, resetting to start node");
        self.events.publish(EngineEvent::TopologyChanged(event));
        self.reset(cursor);
    }

    /// Reset the cursor and announce it.
    pub fn reset(&self, cursor: &mut ExecutionCursor) {
        cursor.reset();
        debug!(
            run_id = %cursor.run_id(),
            generation = cursor.generation(),
            payload = %cursor.payload(),
            "cursor reset"
        );
        self.events.publish(EngineEvent::Reset { run_id: cursor.run_id() });
        self.observe_cursor(cursor);
    }

    /// Re-derive `running` after the cursor moved.
    pub fn observe_cursor(&self, cursor: &ExecutionCursor) {
        let running = cursor.is_running();
        self.running.send_if_modified(|current| {
            if *current == running {
                return false;
            }
            *current = running;
            true
        });
    }
}
