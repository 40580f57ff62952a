//! `nodeflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — load a graph definition and print its execution order.
//! - `run`      — execute a graph definition and print the final payload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{EngineConfig, EngineError, FlowEngine, GraphDefinition, TracingEditor};
use nodes::{NodeCatalog, Payload};

#[derive(Parser)]
#[command(
    name = "nodeflow",
    about = "Run chains of computation nodes defined as JSON graphs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a graph definition and print the order nodes would run in.
    Validate {
        /// Path to the graph JSON file.
        path: PathBuf,
    },
    /// Execute a graph definition.
    Run {
        /// Path to the graph JSON file.
        path: PathBuf,
        /// Initial payload as JSON, overriding the file's `input`.
        #[arg(long)]
        input: Option<String>,
        /// Execute one node at a time, logging each payload.
        #[arg(long)]
        step: bool,
        /// Stop a run after this many steps.
        #[arg(long, env = "NODEFLOW_MAX_STEPS", default_value_t = 10_000)]
        max_steps: usize,
        /// Fail a step whose action takes longer than this.
        #[arg(long, env = "NODEFLOW_STEP_TIMEOUT_MS")]
        step_timeout_ms: Option<u64>,
    },
}

fn load(path: &Path, config: EngineConfig) -> Result<FlowEngine> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let definition = GraphDefinition::from_json(&content).context("invalid graph JSON")?;
    let engine = definition.build(Arc::new(TracingEditor), config, &NodeCatalog::builtin())?;
    Ok(engine)
}

/// Step from the start node until a terminal node is entered, failing after
/// `max_steps` steps like `FlowEngine::run` does.
async fn step_to_end(engine: &FlowEngine, max_steps: usize) -> Result<Payload, EngineError> {
    let start = &engine.config().start_id;
    if engine.successor_of(start).is_some_and(|s| s.is_end()) {
        return Ok(engine.payload());
    }

    let mut steps = 0usize;
    loop {
        if steps >= max_steps {
            return Err(EngineError::StepLimitExceeded(max_steps));
        }
        let outcome = engine.step().await?;
        steps += 1;
        info!(step = steps, node = %outcome.node_id, payload = %outcome.payload, "stepped");
        if outcome.reached_end {
            return Ok(outcome.payload);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let engine = load(&path, EngineConfig::default())?;
            match engine.execution_order() {
                Ok(order) => {
                    println!("✅ Graph is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            path,
            input,
            step,
            max_steps,
            step_timeout_ms,
        } => {
            let mut config = EngineConfig::default().with_max_run_steps(max_steps);
            if let Some(ms) = step_timeout_ms {
                config = config.with_step_timeout(Duration::from_millis(ms));
            }

            let engine = load(&path, config)?;
            if let Some(raw) = input {
                let payload = serde_json::from_str(&raw).context("--input is not valid JSON")?;
                engine.add_input(payload);
            }

            let payload = if step {
                step_to_end(&engine, max_steps).await?
            } else {
                let outcome = engine.run().await?;
                info!(steps = outcome.steps, node = %outcome.node_id, "run finished");
                outcome.payload
            };

            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_from(json: &str, max_steps: usize) -> FlowEngine {
        GraphDefinition::from_json(json)
            .unwrap()
            .build(
                Arc::new(TracingEditor),
                EngineConfig::default().with_max_run_steps(max_steps),
                &NodeCatalog::builtin(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn stepping_reaches_the_output() {
        let engine = engine_from(include_str!("../../../graphs/arithmetic.json"), 10);
        assert_eq!(step_to_end(&engine, 10).await.unwrap(), json!(4));
        assert_eq!(engine.current_id(), "out");
    }

    #[tokio::test]
    async fn stepping_a_cycle_stops_at_the_limit() {
        let engine = engine_from(
            r#"{
                "input": 1,
                "nodes": [
                    { "id": "start", "node_type": "passthrough" },
                    { "id": "a", "node_type": "add", "config": { "operand": 1 } },
                    { "id": "b", "node_type": "passthrough" }
                ],
                "edges": [
                    { "from": "start", "to": "a" },
                    { "from": "a", "to": "b" },
                    { "from": "b", "to": "a" }
                ]
            }"#,
            5,
        );

        let err = step_to_end(&engine, 5).await.unwrap_err();
        assert!(matches!(err, EngineError::StepLimitExceeded(5)));
        // start -> a -> b -> a -> b -> a, adding one on each visit to a.
        assert_eq!(engine.current_id(), "a");
        assert_eq!(engine.payload(), json!(4));
    }

    #[tokio::test]
    async fn terminal_start_returns_the_input() {
        let engine = engine_from(
            r#"{
                "input": { "v": 1 },
                "nodes": [{ "id": "start", "node_type": "output", "terminal": true }]
            }"#,
            5,
        );

        assert_eq!(step_to_end(&engine, 5).await.unwrap(), json!({ "v": 1 }));
        assert_eq!(engine.run().await.unwrap().steps, 0);
    }
}
