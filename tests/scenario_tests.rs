//! End-to-end scenarios: scripted runs through the full pipeline into consumer views.

mod common;

use std::sync::Arc;

use common::*;
use pipeline_graph::clock::ManualClock;
use pipeline_graph::config::GraphConfig;
use pipeline_graph::graph::{build_graph, BuildOptions, GraphView, NodeType, StepsView};
use pipeline_graph::models::{
    InMemoryRun, NodeId, PipelineRun, QueueState, RunBuilder, RunId, RunInfo, RunResult,
};
use pipeline_graph::status::{Status, StatusApiVersion};
use pipeline_graph::PipelineGraphService;

#[test]
fn test_sequential_stages_with_warning_and_skip() {
    let run = build_test_deploy();
    let graph = build_at(&run, 0);
    let view = GraphView::current(&graph);

    let summary: Vec<(&str, Status)> = view
        .stages
        .iter()
        .map(|s| (s.name.as_str(), s.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Build", Status::Success),
            ("Test", Status::Unstable),
            ("Deploy", Status::NotExecuted),
        ]
    );

    let build = stage_named(&view, "Build");
    assert_eq!(build.start_time_millis, 0);
    assert_eq!(build.total_duration_millis, 2_000);

    let test = stage_named(&view, "Test");
    assert_eq!(test.start_time_millis, 2_000);
    assert_eq!(test.total_duration_millis, 1_000);

    let deploy = stage_named(&view, "Deploy");
    assert!(deploy.placeholder);
    assert_eq!(deploy.total_duration_millis, 0);

    let steps = StepsView::current(&graph);
    assert_eq!(steps.steps_for(&build.id).len(), 1);
    assert_eq!(steps.steps_for(&test.id).len(), 2);
    assert!(steps.steps_for(&deploy.id).is_empty());
    assert!(steps.steps.contains_key(&deploy.id));
}

#[test]
fn test_parallel_branches_aggregate_worst_status_and_longest_time() {
    let run = parallel_with_failing_branch();
    let graph = build_at(&run, 0);
    let view = GraphView::current(&graph);

    assert_eq!(view.stages.len(), 1);
    let parallel = &view.stages[0];
    assert_eq!(parallel.node_type, NodeType::Parallel);
    assert_eq!(parallel.name, "Parallel");
    assert_eq!(parallel.status, Status::Failure);
    assert_eq!(parallel.total_duration_millis, 10_000);

    let branches: Vec<(&str, Status, i64)> = parallel
        .children
        .iter()
        .map(|b| (b.name.as_str(), b.status, b.total_duration_millis))
        .collect();
    assert_eq!(
        branches,
        vec![
            ("A", Status::Success, 10_000),
            ("B", Status::Failure, 3_000),
        ]
    );
    assert_eq!(graph.run_status(), Some(Status::Failure));
}

#[test]
fn test_legacy_view_dissolves_parallel_wrapper() {
    let run = parallel_with_failing_branch();
    let graph = build_at(&run, 0);
    let view = GraphView::legacy(&graph, StatusApiVersion::V1);

    let names: Vec<&str> = view.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(view
        .stages
        .iter()
        .all(|s| s.node_type == NodeType::ParallelBranch));
}

#[tokio::test]
async fn test_paused_stage_keeps_growing_with_the_clock() {
    let clock = Arc::new(ManualClock::new(5_000));
    let service = PipelineGraphService::with_clock(GraphConfig::default(), clock.clone());
    let run: Arc<dyn PipelineRun> = Arc::new(waiting_for_approval());

    let view = service.graph_view(Arc::clone(&run)).await.unwrap();
    assert!(!view.complete);
    let approve = stage_named(&view, "Approve");
    assert_eq!(approve.status, Status::PausedPendingInput);
    assert_eq!(approve.start_time_millis, 1_000);
    assert_eq!(approve.total_duration_millis, 4_000);
    assert_eq!(approve.pause_duration_millis, 3_000);

    clock.advance(3_000);
    let view = service.graph_view(Arc::clone(&run)).await.unwrap();
    let approve = stage_named(&view, "Approve");
    assert_eq!(approve.status, Status::PausedPendingInput);
    assert_eq!(approve.total_duration_millis, 7_000);
    assert_eq!(approve.pause_duration_millis, 6_000);

    let steps = service.steps_view(run).await.unwrap();
    let statuses: Vec<Status> = steps
        .steps_for(&approve.id)
        .iter()
        .map(|s| s.status)
        .collect();
    assert_eq!(statuses, vec![Status::Success, Status::PausedPendingInput]);
}

#[test]
fn test_queued_stage_is_coerced_for_v1_consumers() {
    let mut builder = RunBuilder::new("shop#17", 0);
    builder.open_stage("Deploy");
    builder.queued_block(QueueState::Queued);
    let run = builder.build_running();
    let graph = build_at(&run, 1_000);

    let current = GraphView::current(&graph);
    assert_eq!(stage_named(&current, "Deploy").status, Status::Queued);

    let legacy = GraphView::legacy(&graph, StatusApiVersion::V1);
    assert_eq!(stage_named(&legacy, "Deploy").status, Status::InProgress);

    let v2 = GraphView::legacy(&graph, StatusApiVersion::V2);
    assert_eq!(stage_named(&v2, "Deploy").status, Status::Queued);
}

#[test]
fn test_uncaught_error_outside_stages_becomes_pseudo_stage() {
    let run = failure_outside_stages();
    let graph = build_at(&run, 0);
    let view = GraphView::current(&graph);

    assert_eq!(view.stages.len(), 1);
    let pseudo = &view.stages[0];
    assert_eq!(pseudo.node_type, NodeType::UnhandledException);
    assert_eq!(pseudo.status, Status::Failure);
    assert!(pseudo.synthetic);
    assert_eq!(pseudo.id, NodeId::from("4"));

    let steps = StepsView::current(&graph);
    let owned = steps.steps_for(&pseudo.id);
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].node_type, NodeType::UnhandledException);
    assert_eq!(owned[0].status, Status::Failure);
    assert_eq!(owned[0].error_message.as_deref(), Some("command not found"));
}

#[test]
fn test_same_name_branch_absorbs_its_stage() {
    let run = same_name_branch_and_stage();
    let graph = build_at(&run, 0);
    let view = GraphView::current(&graph);

    assert_eq!(view.stages.len(), 1);
    let wrapper = &view.stages[0];
    assert_eq!(wrapper.node_type, NodeType::Parallel);
    assert_eq!(wrapper.children.len(), 1);
    let branch = &wrapper.children[0];
    assert_eq!(branch.name, "X");
    assert_eq!(branch.node_type, NodeType::ParallelBranch);
    assert!(branch.children.is_empty());

    let steps = StepsView::current(&graph);
    assert_eq!(steps.steps_for(&branch.id).len(), 2);
    assert_eq!(view.all_stages().len(), 2);
}

#[test]
fn test_collapse_can_be_disabled() {
    let run = same_name_branch_and_stage();
    let options = BuildOptions {
        collapse_same_name_wrappers: false,
        ..BuildOptions::default()
    };
    let graph = build_graph(&run, 0, options).unwrap();
    let view = GraphView::current(&graph);

    let types: Vec<NodeType> = view.all_stages().iter().map(|s| s.node_type).collect();
    assert_eq!(
        types,
        vec![NodeType::Parallel, NodeType::ParallelBranch, NodeType::Stage]
    );
    let stage = view.all_stages()[2];
    assert_eq!(StepsView::current(&graph).steps_for(&stage.id).len(), 2);
}

#[test]
fn test_run_that_never_started_has_an_empty_tree() {
    let run = InMemoryRun::not_started(RunId::from("shop#18"), RunInfo::running(0));
    let graph = build_at(&run, 0);
    assert!(graph.is_empty());

    let view = GraphView::current(&graph);
    assert!(view.stages.is_empty());
    assert!(StepsView::current(&graph).steps.is_empty());
}

#[test]
fn test_views_serialize_with_wire_names() {
    let run = build_test_deploy();
    let graph = build_at(&run, 0);
    let json = serde_json::to_value(GraphView::current(&graph)).unwrap();

    let stages = json["stages"].as_array().unwrap();
    assert_eq!(stages[0]["name"], "Build");
    assert_eq!(stages[0]["type"], "STAGE");
    assert_eq!(stages[1]["status"], "UNSTABLE");
    assert_eq!(stages[2]["status"], "NOT_EXECUTED");
    assert_eq!(json["complete"], true);
}
