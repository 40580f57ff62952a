//! Behavioural tests for `FlowEngine`.
//!
//! Node actions are `MockNode`s from the nodes crate, so each test can see
//! which nodes ran, in which order and with what input.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use nodes::builtin::{Arithmetic, ArithmeticOp, Passthrough};
use nodes::mock::MockNode;
use nodes::{from_fn, NodeError, Payload, PayloadShape};

use crate::{
    EngineConfig, EngineError, EngineEvent, ExecutionState, FlowEngine, NodeConfig, NodeKind,
    RecordingEditor, Successor, VisualEdge, VisualNode,
};

fn new_engine() -> (FlowEngine, Arc<RecordingEditor>) {
    new_engine_with(EngineConfig::default())
}

fn new_engine_with(config: EngineConfig) -> (FlowEngine, Arc<RecordingEditor>) {
    let editor = Arc::new(RecordingEditor::new());
    (FlowEngine::new(editor.clone(), config), editor)
}

fn start() -> NodeConfig {
    NodeConfig::new("start", NodeKind::Source, Passthrough)
}

fn mock(node: &Arc<MockNode>) -> NodeConfig {
    NodeConfig::from_arc(node.name.clone(), NodeKind::Transform, node.clone())
}

fn mock_sink(node: &Arc<MockNode>) -> NodeConfig {
    NodeConfig::from_arc(node.name.clone(), NodeKind::Sink, node.clone()).terminal()
}

/// start → a → b → sink, registered in the given orders.
fn linear_chain(node_order: &[&str], edge_order: &[(&str, &str)]) -> (FlowEngine, Vec<Arc<MockNode>>) {
    let (engine, _) = new_engine();
    let mocks: Vec<Arc<MockNode>> = ["a", "b", "sink"]
        .into_iter()
        .map(|name| Arc::new(MockNode::appending(name)))
        .collect();

    for id in node_order {
        let config = match *id {
            "start" => start(),
            "sink" => mock_sink(&mocks[2]),
            "a" => mock(&mocks[0]),
            "b" => mock(&mocks[1]),
            other => panic!("unexpected node {other}"),
        };
        engine.add_node(config).unwrap();
    }
    for (from, to) in edge_order {
        engine.add_edge(from, to).unwrap();
    }
    engine.add_input(json!(["x"]));
    (engine, mocks)
}

// ============================================================
// Ordering
// ============================================================

#[tokio::test]
async fn run_composes_actions_along_edges() {
    let (engine, mocks) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );

    let outcome = engine.run().await.unwrap();

    assert_eq!(outcome.payload, json!(["x", "a", "b", "sink"]));
    assert_eq!(outcome.node_id, "sink");
    assert_eq!(outcome.steps, 3);
    for m in &mocks {
        assert_eq!(m.call_count(), 1);
    }
}

#[tokio::test]
async fn result_is_independent_of_registration_order() {
    let (forward, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    let (shuffled, _) = linear_chain(
        &["sink", "b", "start", "a"],
        &[("b", "sink"), ("start", "a"), ("a", "b")],
    );

    let a = forward.run().await.unwrap();
    let b = shuffled.run().await.unwrap();
    assert_eq!(a.payload, b.payload);
    assert_eq!(a.steps, b.steps);
}

#[tokio::test]
async fn later_edge_from_same_source_wins() {
    let (engine, _) = new_engine();
    let n = Arc::new(MockNode::appending("n"));
    let p = Arc::new(MockNode::appending("p"));
    let q = Arc::new(MockNode::appending("q"));

    engine.add_node(start()).unwrap();
    engine.add_node(mock(&n)).unwrap();
    engine.add_node(mock_sink(&p)).unwrap();
    engine.add_node(mock_sink(&q)).unwrap();
    engine.add_edge("start", "n").unwrap();
    engine.add_edge("n", "p").unwrap();
    engine.add_edge("n", "q").unwrap();

    assert_eq!(engine.successor_of("n"), Some(Successor::Node("q".into())));

    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome.payload, json!(["n", "q"]));
    assert_eq!(p.call_count(), 0);
}

#[tokio::test]
async fn start_node_action_is_never_entered() {
    let (engine, _) = new_engine();
    let start_mock = Arc::new(MockNode::appending("start"));
    let sink = Arc::new(MockNode::appending("sink"));

    engine
        .add_node(NodeConfig::from_arc("start", NodeKind::Source, start_mock.clone()))
        .unwrap();
    engine.add_node(mock_sink(&sink)).unwrap();
    engine.add_edge("start", "sink").unwrap();

    engine.run().await.unwrap();
    assert_eq!(start_mock.call_count(), 0);
    assert_eq!(sink.call_count(), 1);
}

// ============================================================
// Termination
// ============================================================

#[tokio::test]
async fn run_halts_on_sink_without_reentering_it() {
    let (engine, _) = new_engine();
    let a = Arc::new(MockNode::appending("a"));
    let sink = Arc::new(MockNode::appending("sink"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock(&a)).unwrap();
    engine.add_node(mock_sink(&sink)).unwrap();
    engine.add_edge("start", "a").unwrap();
    engine.add_edge("a", "sink").unwrap();

    let first = engine.run().await.unwrap();
    assert_eq!(first.steps, 2);
    assert_eq!(sink.call_count(), 1);

    // Still parked on the sink: nothing left to do.
    let again = engine.run().await.unwrap();
    assert_eq!(again.steps, 0);
    assert_eq!(sink.call_count(), 1);
    assert!(engine.is_running());
}

#[tokio::test]
async fn step_reports_when_a_terminal_node_is_entered() {
    let (engine, _) = new_engine();
    let a = Arc::new(MockNode::appending("a"));
    let sink = Arc::new(MockNode::appending("sink"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock(&a)).unwrap();
    engine.add_node(mock_sink(&sink)).unwrap();
    engine.add_edge("start", "a").unwrap();
    engine.add_edge("a", "sink").unwrap();

    let first = engine.step().await.unwrap();
    assert_eq!(first.node_id, "a");
    assert!(!first.reached_end);

    let second = engine.step().await.unwrap();
    assert_eq!(second.node_id, "sink");
    assert!(second.reached_end);

    assert!(matches!(
        engine.step().await,
        Err(EngineError::UnresolvedSuccessor { node_id, successor: None }) if node_id == "sink"
    ));
}

#[tokio::test]
async fn unresolved_successor_does_not_advance() {
    let (engine, _) = new_engine();
    let a = Arc::new(MockNode::appending("a"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock(&a)).unwrap();
    engine.add_edge("start", "a").unwrap();

    engine.step().await.unwrap();
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::UnresolvedSuccessor { node_id, .. } if node_id == "a"));
    assert_eq!(engine.current_id(), "a");
    assert_eq!(a.call_count(), 1);
    assert_eq!(engine.state(), ExecutionState::Running);
}

#[tokio::test]
async fn missing_start_node_is_unresolved() {
    let (engine, _) = new_engine();
    assert!(matches!(
        engine.step().await,
        Err(EngineError::UnresolvedSuccessor { node_id, .. }) if node_id == "start"
    ));
}

#[tokio::test]
async fn cycle_hits_the_step_limit() {
    let (engine, _) = new_engine_with(EngineConfig::default().with_max_run_steps(5));
    let a = Arc::new(MockNode::appending("a"));
    let b = Arc::new(MockNode::appending("b"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock(&a)).unwrap();
    engine.add_node(mock(&b)).unwrap();
    engine.add_edge("start", "a").unwrap();
    engine.add_edge("a", "b").unwrap();
    engine.add_edge("b", "a").unwrap();

    assert!(matches!(engine.execution_order(), Err(EngineError::CycleDetected(_))));
    assert!(matches!(engine.run().await, Err(EngineError::StepLimitExceeded(5))));
    assert_eq!(a.call_count() + b.call_count(), 5);
}

// ============================================================
// Reset & invalidation
// ============================================================

#[tokio::test]
async fn reset_restores_start_and_initial_input() {
    let (engine, mocks) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );

    engine.step().await.unwrap();
    engine.step().await.unwrap();
    assert!(engine.is_running());
    assert_eq!(engine.payload(), json!(["x", "a", "b"]));

    engine.reset();

    assert_eq!(engine.current_id(), "start");
    assert!(!engine.is_running());
    assert_eq!(engine.payload(), json!(["x"]));
    assert_eq!(engine.state(), ExecutionState::Idle);

    // A second run over the same input gives the same answer.
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome.payload, json!(["x", "a", "b", "sink"]));
    assert_eq!(mocks[0].call_count(), 2);
}

#[tokio::test]
async fn add_input_resets_progress() {
    let (engine, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    engine.step().await.unwrap();

    engine.add_input(json!(["y"]));

    assert!(!engine.is_running());
    assert_eq!(engine.initial_input(), json!(["y"]));
    assert_eq!(engine.payload(), json!(["y"]));
}

#[tokio::test]
async fn unrelated_node_resets_progress() {
    let (engine, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    engine.step().await.unwrap();
    assert!(engine.is_running());

    engine
        .add_node(NodeConfig::new("elsewhere", NodeKind::Transform, Passthrough))
        .unwrap();

    assert!(!engine.is_running());
    assert_eq!(engine.current_id(), "start");
    assert_eq!(engine.payload(), json!(["x"]));
}

#[tokio::test]
async fn unrelated_edge_resets_progress() {
    let (engine, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    engine
        .add_node(NodeConfig::new("island", NodeKind::Transform, Passthrough))
        .unwrap();
    engine
        .add_node(NodeConfig::new("island_sink", NodeKind::Sink, Passthrough).terminal())
        .unwrap();
    engine.step().await.unwrap();
    engine.step().await.unwrap();

    engine.add_edge("island", "island_sink").unwrap();

    assert!(!engine.is_running());
    assert_eq!(engine.current_id(), "start");
}

#[tokio::test]
async fn rejected_mutation_keeps_progress() {
    let (engine, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    engine.step().await.unwrap();
    let revision = engine.revision();

    assert!(matches!(
        engine.add_node(NodeConfig::new("a", NodeKind::Transform, Passthrough)),
        Err(EngineError::DuplicateNodeId(id)) if id == "a"
    ));
    assert!(matches!(
        engine.add_edge("a", "ghost"),
        Err(EngineError::UnknownNodeReference { .. })
    ));

    assert!(engine.is_running());
    assert_eq!(engine.current_id(), "a");
    assert_eq!(engine.revision(), revision);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn failed_first_step_enters_failed_state() {
    let (engine, _) = new_engine();
    let bad = Arc::new(MockNode::failing("bad", "model unavailable"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock_sink(&bad)).unwrap();
    engine.add_edge("start", "bad").unwrap();
    engine.add_input(json!(1));

    let err = engine.step().await.unwrap_err();
    assert!(matches!(
        &err,
        EngineError::Action { node_id, source: NodeError::Failed(msg) }
            if node_id == "bad" && msg == "model unavailable"
    ));

    // The cursor never moved, so the engine is not running, but it is failed.
    assert!(!engine.is_running());
    assert_eq!(engine.current_id(), "start");
    assert_eq!(engine.state(), ExecutionState::Failed);
    assert_eq!(engine.failure().unwrap().node_id, "bad");

    assert!(matches!(
        engine.step().await,
        Err(EngineError::ResetRequired { node_id }) if node_id == "bad"
    ));
    assert!(matches!(engine.run().await, Err(EngineError::ResetRequired { .. })));
    assert_eq!(bad.call_count(), 1);

    engine.reset();
    assert_eq!(engine.state(), ExecutionState::Idle);
    assert!(engine.failure().is_none());
    assert_eq!(engine.payload(), json!(1));
}

#[tokio::test]
async fn failure_mid_run_keeps_last_good_position() {
    let (engine, _) = new_engine();
    let a = Arc::new(MockNode::appending("a"));
    let bad = Arc::new(MockNode::failing("bad", "boom"));
    let sink = Arc::new(MockNode::appending("sink"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock(&a)).unwrap();
    engine.add_node(mock(&bad)).unwrap();
    engine.add_node(mock_sink(&sink)).unwrap();
    engine.add_edge("start", "a").unwrap();
    engine.add_edge("a", "bad").unwrap();
    engine.add_edge("bad", "sink").unwrap();
    engine.add_input(json!([]));

    assert!(matches!(engine.run().await, Err(EngineError::Action { .. })));

    assert_eq!(engine.current_id(), "a");
    assert_eq!(engine.payload(), json!(["a"]));
    assert!(engine.is_running());
    assert_eq!(engine.state(), ExecutionState::Failed);
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn input_shape_mismatch_is_a_precondition_error() {
    let (engine, _) = new_engine();
    engine.add_node(start()).unwrap();
    engine
        .add_node(
            NodeConfig::new("plus", NodeKind::Transform, Arithmetic::new(ArithmeticOp::Add, 1.into()))
                .terminal(),
        )
        .unwrap();
    engine.add_edge("start", "plus").unwrap();
    engine.add_input(json!("text"));

    assert!(matches!(
        engine.step().await,
        Err(EngineError::ShapeMismatch {
            expected: PayloadShape::Number,
            found: PayloadShape::String,
            ..
        })
    ));
    assert_eq!(engine.state(), ExecutionState::Idle);

    engine.add_input(json!(1));
    assert_eq!(engine.step().await.unwrap().payload, json!(2));
}

#[tokio::test]
async fn output_breaking_its_declared_shape_fails_the_step() {
    let (engine, _) = new_engine();
    let liar = from_fn(|_: Payload| async { Ok::<_, NodeError>(json!("not a number")) })
        .with_shapes(PayloadShape::Any, PayloadShape::Number);
    engine.add_node(start()).unwrap();
    engine
        .add_node(NodeConfig::new("liar", NodeKind::Transform, liar).terminal())
        .unwrap();
    engine.add_edge("start", "liar").unwrap();

    assert!(matches!(
        engine.step().await,
        Err(EngineError::ShapeMismatch { node_id, .. }) if node_id == "liar"
    ));
    assert_eq!(engine.state(), ExecutionState::Failed);
    assert_eq!(engine.current_id(), "start");
}

#[tokio::test(start_paused = true)]
async fn slow_action_times_out() {
    let (engine, _) =
        new_engine_with(EngineConfig::default().with_step_timeout(Duration::from_millis(50)));
    let slow = Arc::new(MockNode::waiting_for_cancel("slow"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock_sink(&slow)).unwrap();
    engine.add_edge("start", "slow").unwrap();

    assert!(matches!(
        engine.step().await,
        Err(EngineError::ActionTimeout { node_id, .. }) if node_id == "slow"
    ));
    assert_eq!(engine.state(), ExecutionState::Failed);
}

// ============================================================
// Concurrency guard
// ============================================================

fn slow_graph() -> (FlowEngine, Arc<MockNode>) {
    let (engine, _) = new_engine();
    let slow = Arc::new(MockNode::waiting_for_cancel("slow"));
    engine.add_node(start()).unwrap();
    engine.add_node(mock_sink(&slow)).unwrap();
    engine.add_edge("start", "slow").unwrap();
    engine.add_input(json!("x"));
    (engine, slow)
}

async fn wait_until_called(node: &MockNode) {
    while node.call_count() == 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn reset_during_suspended_step_discards_its_result() {
    let (engine, slow) = slow_graph();

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.step().await }
    });
    wait_until_called(&slow).await;

    engine.reset();
    let result = pending.await.unwrap();

    assert!(matches!(result, Err(EngineError::Superseded { node_id }) if node_id == "slow"));
    assert_eq!(engine.current_id(), "start");
    assert!(!engine.is_running());
    assert_eq!(engine.state(), ExecutionState::Idle);
    assert_eq!(engine.payload(), json!("x"));
}

#[tokio::test]
async fn topology_change_during_suspended_step_discards_its_result() {
    let (engine, slow) = slow_graph();

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });
    wait_until_called(&slow).await;

    engine
        .add_node(NodeConfig::new("late", NodeKind::Transform, Passthrough))
        .unwrap();

    assert!(matches!(pending.await.unwrap(), Err(EngineError::Superseded { .. })));
    assert_eq!(engine.current_id(), "start");
    assert_eq!(engine.state(), ExecutionState::Idle);
}

#[tokio::test]
async fn concurrent_step_is_rejected() {
    let (engine, slow) = slow_graph();

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.step().await }
    });
    wait_until_called(&slow).await;

    assert!(matches!(engine.step().await, Err(EngineError::Busy)));
    assert!(matches!(engine.run().await, Err(EngineError::Busy)));
    assert_eq!(slow.call_count(), 1);

    engine.reset();
    assert!(pending.await.unwrap().is_err());
}

#[tokio::test]
async fn dropped_step_releases_its_claim() {
    let (engine, slow) = slow_graph();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), engine.step()).await;
    assert!(abandoned.is_err());
    assert_eq!(slow.call_count(), 1);
    assert_eq!(engine.state(), ExecutionState::Idle);

    // The claim is gone, so the next step enters the node again instead of
    // reporting Busy; it waits for cancellation, so cancel it via reset.
    let retry = tokio::spawn({
        let engine = engine.clone();
        async move { engine.step().await }
    });
    while slow.call_count() < 2 {
        tokio::task::yield_now().await;
    }
    engine.reset();
    assert!(matches!(retry.await.unwrap(), Err(EngineError::Superseded { .. })));
}

#[tokio::test]
async fn step_succeeds_after_a_dropped_step() {
    let (engine, _) = new_engine();
    let calls = Arc::new(AtomicUsize::new(0));
    let stalls_once = from_fn({
        let calls = calls.clone();
        move |input: Payload| {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    std::future::pending::<()>().await;
                }
                Ok::<_, NodeError>(input)
            }
        }
    });
    engine.add_node(start()).unwrap();
    engine
        .add_node(NodeConfig::new("gate", NodeKind::Sink, stalls_once).terminal())
        .unwrap();
    engine.add_edge("start", "gate").unwrap();
    engine.add_input(json!(7));

    assert!(tokio::time::timeout(Duration::from_millis(20), engine.step()).await.is_err());

    let outcome = engine.step().await.unwrap();
    assert_eq!(outcome.node_id, "gate");
    assert_eq!(outcome.payload, json!(7));
    assert!(outcome.reached_end);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================
// Editor mirror & observation
// ============================================================

#[test]
fn registrations_are_mirrored_to_the_editor() {
    let (engine, editor) = new_engine();
    engine
        .add_node(start().description("entry").display(json!({ "value": 3 })))
        .unwrap();
    engine
        .add_node(NodeConfig::new("out", NodeKind::Sink, Passthrough).terminal())
        .unwrap();
    engine.add_edge("start", "out").unwrap();
    let _ = engine.add_node(NodeConfig::new("out", NodeKind::Sink, Passthrough));

    assert_eq!(
        editor.nodes(),
        vec![
            VisualNode { id: "start".into(), kind: NodeKind::Source, data: json!({ "value": 3 }) },
            VisualNode { id: "out".into(), kind: NodeKind::Sink, data: json!(null) },
        ]
    );
    assert_eq!(editor.edges(), vec![VisualEdge::between("start", "out")]);
    assert_eq!(editor.edges()[0].id, "start_to_out");
    assert_eq!(engine.description("start").as_deref(), Some("entry"));
}

#[tokio::test]
async fn steps_are_broadcast_and_running_is_watched() {
    let (engine, _) = linear_chain(
        &["start", "a", "b", "sink"],
        &[("start", "a"), ("a", "b"), ("b", "sink")],
    );
    let mut events = engine.subscribe();
    let mut running = engine.running_watch();
    assert!(!*running.borrow_and_update());

    engine.step().await.unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        EngineEvent::Stepped { from: "start".into(), to: "a".into() }
    );
    assert!(running.has_changed().unwrap());
    assert!(*running.borrow_and_update());

    engine.reset();
    assert!(matches!(events.try_recv().unwrap(), EngineEvent::Reset { .. }));
    assert!(!*running.borrow_and_update());
}

#[test]
fn engines_are_independent() {
    let (one, _) = new_engine();
    let (two, _) = new_engine();
    one.add_node(start()).unwrap();

    assert_ne!(one.id(), two.id());
    assert_eq!(one.node_ids(), vec!["start"]);
    assert!(two.node_ids().is_empty());
}
