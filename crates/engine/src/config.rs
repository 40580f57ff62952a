//! Tuning knobs for the flow engine.

use std::time::Duration;

/// Identity the cursor rests on before any step has run.
pub const DEFAULT_START_ID: &str = "start";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ID of the start node. The cursor begins here and returns here on reset.
    pub start_id: String,
    /// Upper bound on the number of steps a single `run` may take.
    pub max_run_steps: usize,
    /// Abort a step whose action takes longer than this.
    pub step_timeout: Option<Duration>,
    /// Buffer size of the engine event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_id: DEFAULT_START_ID.to_owned(),
            max_run_steps: 10_000,
            step_timeout: None,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_start_id(mut self, start_id: impl Into<String>) -> Self {
        self.start_id = start_id.into();
        self
    }

    pub fn with_max_run_steps(mut self, max_run_steps: usize) -> Self {
        self.max_run_steps = max_run_steps;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }
}
