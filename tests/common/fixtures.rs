//! Scripted runs and lookup helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeline_graph::graph::{build_graph, BuildOptions, GraphView, PipelineGraph, StageView};
use pipeline_graph::models::{
    ErrorInfo, FlowExecution, InMemoryRun, PipelineRun, RunBuilder, RunId, RunInfo, RunResult,
    StageSkip,
};

/// Build with default options, panicking on failure
pub fn build_at(run: &dyn PipelineRun, now_millis: i64) -> PipelineGraph {
    build_graph(run, now_millis, BuildOptions::default()).expect("graph should build")
}

/// First stage named `name`, anywhere in the tree
pub fn stage_named<'a>(view: &'a GraphView, name: &str) -> &'a StageView {
    view.all_stages()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no stage named {name} in {view:?}"))
}

/// Build (2s) succeeds, Test records a warning, Deploy is skipped after the warning
pub fn build_test_deploy() -> InMemoryRun {
    let mut builder = RunBuilder::new("shop#12", 0);
    builder.stage("Build", |b| {
        b.step("sh", 2_000);
    });
    builder.stage("Test", |b| {
        b.step("sh", 1_000);
        b.warning_step(RunResult::Unstable, "3 tests failed");
    });
    builder.skipped_stage("Deploy", StageSkip::Unstable);
    builder.finish(RunResult::Unstable)
}

/// Branch A runs 10s and succeeds, branch B fails after 3s
pub fn parallel_with_failing_branch() -> InMemoryRun {
    let mut builder = RunBuilder::new("shop#13", 0);
    builder.parallel(&["A", "B"], |branch, b| {
        if branch == "A" {
            b.step("sh", 10_000);
        } else {
            b.failing_step("sh", 3_000, "exit code 2");
            b.fail_block(ErrorInfo::new("exit code 2"));
        }
    });
    builder.finish(RunResult::Failure)
}

/// A live run sitting on an unanswered input inside the Approve stage
///
/// The stage opens at 1s, the prompt appears at 2s.
pub fn waiting_for_approval() -> InMemoryRun {
    let mut builder = RunBuilder::new("shop#14", 0);
    builder.step("checkout", 1_000);
    builder.open_stage("Approve");
    builder.step("echo", 1_000);
    builder.input(None);
    builder.build_running()
}

/// A step outside any stage throws and fails the run
pub fn failure_outside_stages() -> InMemoryRun {
    let mut builder = RunBuilder::new("shop#15", 0);
    let thrower = builder.failing_step("sh", 500, "command not found");
    builder.finish_with_error(
        RunResult::Failure,
        ErrorInfo::new("command not found").with_origin(thrower),
    )
}

/// Parallel branch X whose only child is a stage also named X
pub fn same_name_branch_and_stage() -> InMemoryRun {
    let mut builder = RunBuilder::new("shop#16", 0);
    builder.parallel(&["X"], |_, b| {
        b.stage("X", |b| {
            b.step("sh", 100);
            b.step("sh", 200);
        });
    });
    builder.finish(RunResult::Success)
}

/// A run that counts how often its execution is read and blocks each read for `delay`
pub struct CountingRun {
    inner: InMemoryRun,
    reads: AtomicUsize,
    delay: Duration,
}

impl CountingRun {
    pub fn new(inner: InMemoryRun, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PipelineRun for CountingRun {
    fn run_id(&self) -> RunId {
        self.inner.run_id()
    }

    fn info(&self) -> RunInfo {
        self.inner.info()
    }

    fn execution(&self) -> Option<Arc<dyn FlowExecution>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.execution()
    }
}
