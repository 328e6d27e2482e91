mod common;

use std::sync::Arc;

use common::*;
use pipeline_graph::error::GraphError;
use pipeline_graph::graph::{build_graph, BuildOptions, GraphView, NodeType, StepsView};
use pipeline_graph::models::{
    ErrorInfo, ExecutionNode, FlowGraph, InMemoryExecution, InMemoryRun, Label, NodeId, NodeKind,
    RunBuilder, RunId, RunInfo, RunResult,
};
use pipeline_graph::status::Status;

fn node(id: &str, kind: NodeKind, ts: i64, parents: &[&str], enclosing: &[&str]) -> ExecutionNode {
    ExecutionNode::new(id, RunId::from("live#1"), kind, ts)
        .with_parents(parents.iter().map(|p| NodeId::from(*p)).collect())
        .with_enclosing(enclosing.iter().map(|e| NodeId::from(*e)).collect())
}

/// Two live branches; `fast` already finished at 1s, `slow` is still running
fn live_parallel() -> InMemoryRun {
    let nodes = vec![
        node("2", NodeKind::FlowStart, 0, &[], &[]),
        node("3", NodeKind::BlockStart, 0, &["2"], &[]).with_function("parallel"),
        node("4", NodeKind::BlockStart, 0, &["3"], &["3"])
            .with_function("parallel")
            .with_label(Label::Branch("fast".to_string())),
        node("5", NodeKind::BlockStart, 0, &["3"], &["3"])
            .with_function("parallel")
            .with_label(Label::Branch("slow".to_string())),
        node("6", NodeKind::AtomicStep, 0, &["4"], &["4", "3"]).with_function("sh"),
        node("7", NodeKind::AtomicStep, 0, &["5"], &["5", "3"]).with_function("sh"),
        node(
            "8",
            NodeKind::BlockEnd {
                start: NodeId::from("4"),
            },
            1_000,
            &["6"],
            &["3"],
        ),
    ];
    InMemoryRun::new(
        RunId::from("live#1"),
        RunInfo::running(0),
        Arc::new(InMemoryExecution::from_nodes(nodes)),
    )
}

#[test]
fn test_finished_branch_is_complete_while_sibling_runs() {
    let graph = build_at(&live_parallel(), 5_000);
    let view = GraphView::current(&graph);

    let fast = stage_named(&view, "fast");
    assert_eq!(fast.status, Status::Success);
    assert_eq!(fast.total_duration_millis, 1_000);

    let slow = stage_named(&view, "slow");
    assert_eq!(slow.status, Status::InProgress);
    assert_eq!(slow.total_duration_millis, 5_000);

    let parallel = stage_named(&view, "Parallel");
    assert_eq!(parallel.status, Status::InProgress);
    assert_eq!(parallel.total_duration_millis, 5_000);
    assert!(!view.complete);
}

#[test]
fn test_snapshot_ignores_nodes_appended_later() {
    let run = live_parallel();
    let graph = FlowGraph::snapshot(&run).unwrap();
    assert_eq!(graph.len(), 7);

    let handle = run.execution_handle().unwrap();
    handle.append(node("9", NodeKind::AtomicStep, 2_000, &["7"], &["5", "3"]));
    assert_eq!(graph.len(), 7);
    assert!(graph.get(&NodeId::from("9")).is_none());

    let refreshed = FlowGraph::snapshot(&run).unwrap();
    assert_eq!(refreshed.len(), 8);
}

#[test]
fn test_node_from_another_run_is_rejected() {
    let mut builder = RunBuilder::new("shop#20", 0);
    let last = builder.step("sh", 10);
    let run = builder.build_running();
    let stray = ExecutionNode::new("4", RunId::from("other#1"), NodeKind::AtomicStep, 10)
        .with_parents(vec![last]);
    run.execution_handle().unwrap().append(stray);

    let error = build_graph(&run, 0, BuildOptions::default()).unwrap_err();
    match error {
        GraphError::ForeignNode {
            node_id,
            expected,
            actual,
        } => {
            assert_eq!(node_id, NodeId::from("4"));
            assert_eq!(expected, RunId::from("shop#20"));
            assert_eq!(actual, RunId::from("other#1"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_dangling_parent_is_reported() {
    let builder = RunBuilder::new("shop#21", 0);
    let run = builder.build_running();
    let orphan = ExecutionNode::new("3", RunId::from("shop#21"), NodeKind::AtomicStep, 10)
        .with_parents(vec![NodeId::from("99")]);
    run.execution_handle().unwrap().append(orphan);

    let error = build_graph(&run, 0, BuildOptions::default()).unwrap_err();
    assert_eq!(
        error,
        GraphError::MissingNode {
            node_id: NodeId::from("99"),
            referenced_by: NodeId::from("3"),
        }
    );
    assert!(!error.is_retryable());
}

#[test]
fn test_uncaught_error_attaches_to_innermost_stage() {
    let mut builder = RunBuilder::new("shop#22", 0);
    builder.open_stage("Outer");
    let inner = builder.open_stage("Inner");
    let thrower = builder.failing_step("sh", 10, "segfault");
    let run = builder.finish_with_error(
        RunResult::Failure,
        ErrorInfo::new("segfault").with_origin(thrower),
    );
    let graph = build_at(&run, 0);

    let exception = graph.unhandled_exception().unwrap();
    assert_eq!(exception.parent, Some(inner.clone()));
    assert!(graph
        .stage_like_nodes()
        .iter()
        .all(|s| s.node_type == NodeType::Stage));

    let view = GraphView::current(&graph);
    assert_eq!(stage_named(&view, "Inner").status, Status::Failure);
    assert_eq!(stage_named(&view, "Outer").status, Status::Failure);

    let steps = StepsView::current(&graph);
    let owned: Vec<NodeType> = steps.steps_for(&inner).iter().map(|s| s.node_type).collect();
    assert_eq!(owned, vec![NodeType::Step, NodeType::UnhandledException]);
}

#[test]
fn test_aborted_run_marks_open_stage_aborted() {
    let mut builder = RunBuilder::new("shop#23", 0);
    builder.stage("Build", |b| {
        b.step("sh", 100);
    });
    builder.open_stage("Wait");
    builder.step("sleep", 5_000);
    let run = builder.finish_with_error(
        RunResult::Aborted,
        ErrorInfo::interrupted("Aborted by admin", RunResult::Aborted),
    );
    let graph = build_at(&run, 0);
    let view = GraphView::current(&graph);

    assert_eq!(stage_named(&view, "Build").status, Status::Success);
    assert_eq!(stage_named(&view, "Wait").status, Status::Aborted);
    assert!(graph.unhandled_exception().is_none());
    assert_eq!(graph.run_status(), Some(Status::Aborted));
}

#[test]
fn test_input_answered_counts_as_pause_of_its_stage() {
    let mut builder = RunBuilder::new("shop#24", 0);
    builder.stage("Approve", |b| {
        b.step("echo", 1_000);
        b.input(Some(4_000));
        b.step("sh", 1_000);
    });
    let run = builder.finish(RunResult::Success);
    let view = GraphView::current(&build_at(&run, 0));

    let approve = stage_named(&view, "Approve");
    assert_eq!(approve.status, Status::Success);
    assert_eq!(approve.total_duration_millis, 6_000);
    assert_eq!(approve.pause_duration_millis, 4_000);
}

#[test]
fn test_skipped_children_can_be_kept() {
    let mut builder = RunBuilder::new("shop#25", 0);
    builder.open_stage("Deploy");
    builder.mark_last(|n| n.stage_skip = Some(pipeline_graph::models::StageSkip::Conditional));
    builder.stage("Canary", |b| {
        b.step("sh", 10);
    });
    builder.close_stage();
    let run = builder.finish(RunResult::Success);

    let dropped = GraphView::current(&build_at(&run, 0));
    assert_eq!(dropped.all_stages().len(), 1);

    let options = BuildOptions {
        drop_skipped_children: false,
        ..BuildOptions::default()
    };
    let kept = GraphView::current(&build_graph(&run, 0, options).unwrap());
    let names: Vec<&str> = kept.all_stages().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Deploy", "Canary"]);
}
