//! # In-Memory Executions
//!
//! Thread-safe, append-only implementations of the engine seam plus [`RunBuilder`], a small
//! scripting DSL that records node sequences the way the engine lays them out (two-level
//! stage blocks, parallel forks joined by a multi-parent end node, flow start/end).
//!
//! ```rust
//! use pipeline_graph::models::{RunBuilder, RunResult};
//!
//! let mut builder = RunBuilder::new("demo#1", 0);
//! builder.stage("Build", |b| {
//!     b.step("sh", 2_000);
//! });
//! builder.parallel(&["unit", "lint"], |branch, b| {
//!     b.step("sh", if branch == "unit" { 5_000 } else { 1_000 });
//! });
//! let run = builder.finish(RunResult::Success);
//! # let _ = run;
//! ```

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::node::{
    ErrorInfo, ExecutionNode, Label, NodeId, NodeKind, PauseCause, PauseInfo, QueueState,
    StageSkip, WarningInfo,
};
use super::run::{FlowExecution, PipelineRun, RunId, RunInfo, RunResult};
use crate::constants::{display_names, functions};

/// Append-only node store
#[derive(Debug, Default)]
pub struct InMemoryExecution {
    nodes: RwLock<BTreeMap<NodeId, ExecutionNode>>,
}

impl InMemoryExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = ExecutionNode>) -> Self {
        let execution = Self::new();
        for node in nodes {
            execution.append(node);
        }
        execution
    }

    /// Record a node; an id that already exists is left untouched
    pub fn append(&self, node: ExecutionNode) {
        self.nodes.write().entry(node.id.clone()).or_insert(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl FlowExecution for InMemoryExecution {
    fn heads(&self) -> Vec<NodeId> {
        let nodes = self.nodes.read();
        let referenced: HashSet<&NodeId> = nodes.values().flat_map(|n| n.parents.iter()).collect();
        nodes
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect()
    }

    fn node(&self, id: &NodeId) -> Option<ExecutionNode> {
        self.nodes.read().get(id).cloned()
    }
}

/// A run backed by an [`InMemoryExecution`]
#[derive(Debug)]
pub struct InMemoryRun {
    run_id: RunId,
    info: RwLock<RunInfo>,
    execution: Option<Arc<InMemoryExecution>>,
}

impl InMemoryRun {
    pub fn new(run_id: RunId, info: RunInfo, execution: Arc<InMemoryExecution>) -> Self {
        Self {
            run_id,
            info: RwLock::new(info),
            execution: Some(execution),
        }
    }

    /// A run whose execution never started
    pub fn not_started(run_id: RunId, info: RunInfo) -> Self {
        Self {
            run_id,
            info: RwLock::new(info),
            execution: None,
        }
    }

    pub fn set_info(&self, info: RunInfo) {
        *self.info.write() = info;
    }

    /// Handle for appending nodes while the run is live
    pub fn execution_handle(&self) -> Option<Arc<InMemoryExecution>> {
        self.execution.clone()
    }
}

impl PipelineRun for InMemoryRun {
    fn run_id(&self) -> RunId {
        self.run_id.clone()
    }

    fn info(&self) -> RunInfo {
        self.info.read().clone()
    }

    fn execution(&self) -> Option<Arc<dyn FlowExecution>> {
        self.execution
            .as_ref()
            .map(|e| Arc::clone(e) as Arc<dyn FlowExecution>)
    }
}

#[derive(Debug)]
struct OpenBlock {
    start: NodeId,
    end_error: Option<ErrorInfo>,
}

/// Scripts a run node by node with a virtual wall clock
#[derive(Debug)]
pub struct RunBuilder {
    run_id: RunId,
    start_millis: i64,
    now: i64,
    next_id: u64,
    flow_start: NodeId,
    tips: Vec<NodeId>,
    open: Vec<OpenBlock>,
    nodes: Vec<ExecutionNode>,
}

impl RunBuilder {
    pub fn new(run_id: &str, start_millis: i64) -> Self {
        let run_id = RunId::from(run_id);
        let flow_start = ExecutionNode::new("2", run_id.clone(), NodeKind::FlowStart, start_millis)
            .with_display_name(display_names::PIPELINE_START);
        let flow_start_id = flow_start.id.clone();
        Self {
            run_id,
            start_millis,
            now: start_millis,
            next_id: 3,
            flow_start: flow_start_id.clone(),
            tips: vec![flow_start_id],
            open: Vec::new(),
            nodes: vec![flow_start],
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn advance(&mut self, millis: i64) -> &mut Self {
        self.now += millis;
        self
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from(self.next_id);
        self.next_id += 1;
        let enclosing = self.open.iter().rev().map(|b| b.start.clone()).collect();
        let node = ExecutionNode::new(id.clone(), self.run_id.clone(), kind, self.now)
            .with_parents(std::mem::take(&mut self.tips))
            .with_enclosing(enclosing);
        self.nodes.push(node);
        self.tips = vec![id.clone()];
        id
    }

    fn last_mut(&mut self) -> &mut ExecutionNode {
        // The flow start node is always present
        let index = self.nodes.len() - 1;
        &mut self.nodes[index]
    }

    /// Adjust the most recently recorded node
    pub fn mark_last(&mut self, configure: impl FnOnce(&mut ExecutionNode)) -> &mut Self {
        configure(self.last_mut());
        self
    }

    /// Record an atomic step that runs for `millis`
    pub fn step(&mut self, function: &str, millis: i64) -> NodeId {
        self.step_with(function, millis, |_| {})
    }

    pub fn step_with(
        &mut self,
        function: &str,
        millis: i64,
        configure: impl FnOnce(&mut ExecutionNode),
    ) -> NodeId {
        let id = self.push(NodeKind::AtomicStep);
        let node = self.last_mut();
        node.function_name = Some(function.to_string());
        configure(node);
        self.now += millis;
        id
    }

    /// A step that fails with `message`
    pub fn failing_step(&mut self, function: &str, millis: i64, message: &str) -> NodeId {
        self.step_with(function, millis, |n| n.error = Some(ErrorInfo::new(message)))
    }

    /// A step recording a non-fatal warning
    pub fn warning_step(&mut self, result: RunResult, message: &str) -> NodeId {
        self.step_with("unstable", 0, |n| {
            n.warning = Some(WarningInfo {
                result,
                message: Some(message.to_string()),
            })
        })
    }

    /// An input prompt; `answered_after` closes the pause, `None` leaves it waiting
    pub fn input(&mut self, answered_after: Option<i64>) -> NodeId {
        let started = self.now;
        let id = self.step_with(functions::INPUT, 0, |n| {
            n.pause.push(PauseInfo {
                cause: PauseCause::Input,
                started_millis: started,
                ended_millis: answered_after.map(|d| started + d),
            })
        });
        if let Some(waited) = answered_after {
            self.now += waited;
        }
        id
    }

    /// A node block waiting in the executor queue
    pub fn queued_block(&mut self, state: QueueState) -> NodeId {
        let id = self.open_block("node", None);
        self.last_mut().queue_state = Some(state);
        id
    }

    /// Legacy marker-scoped stage: one labelled atomic node
    pub fn legacy_stage(&mut self, name: &str) -> NodeId {
        let id = self.push(NodeKind::AtomicStep);
        let node = self.last_mut();
        node.function_name = Some(functions::STAGE.to_string());
        node.label = Some(Label::Stage(name.to_string()));
        id
    }

    pub fn open_block(&mut self, function: &str, label: Option<Label>) -> NodeId {
        let id = self.push(NodeKind::BlockStart);
        let node = self.last_mut();
        node.function_name = Some(function.to_string());
        node.label = label;
        self.open.push(OpenBlock {
            start: id.clone(),
            end_error: None,
        });
        id
    }

    /// Make the end node of the innermost open block carry `error`
    pub fn fail_block(&mut self, error: ErrorInfo) -> &mut Self {
        if let Some(block) = self.open.last_mut() {
            block.end_error = Some(error);
        }
        self
    }

    /// Make both block levels of the innermost stage carry `error`
    pub fn fail_stage(&mut self, error: ErrorInfo) -> &mut Self {
        let depth = self.open.len();
        for block in self.open.iter_mut().skip(depth.saturating_sub(2)) {
            block.end_error = Some(error.clone());
        }
        self
    }

    /// Close the innermost open block; a no-op when none is open
    pub fn close_block(&mut self) -> Option<NodeId> {
        let block = self.open.pop()?;
        let id = self.push(NodeKind::BlockEnd {
            start: block.start,
        });
        self.last_mut().error = block.end_error;
        Some(id)
    }

    /// Open both levels of a block-scoped stage, returning the labelled body start
    pub fn open_stage(&mut self, name: &str) -> NodeId {
        self.open_block(functions::STAGE, None);
        self.open_block(functions::STAGE, Some(Label::Stage(name.to_string())))
    }

    pub fn close_stage(&mut self) {
        self.close_block();
        self.close_block();
    }

    pub fn stage(&mut self, name: &str, body: impl FnOnce(&mut RunBuilder)) -> NodeId {
        let id = self.open_stage(name);
        body(self);
        self.close_stage();
        id
    }

    /// A stage whose body never ran
    pub fn skipped_stage(&mut self, name: &str, reason: StageSkip) -> NodeId {
        let id = self.open_stage(name);
        self.last_mut().stage_skip = Some(reason);
        self.close_stage();
        id
    }

    /// Fork into named branches that all start now; the join happens once the slowest ends
    ///
    /// Branches are recorded one after another, so ids stay contiguous per branch.
    pub fn parallel(
        &mut self,
        branches: &[&str],
        mut body: impl FnMut(&str, &mut RunBuilder),
    ) -> NodeId {
        let parallel = self.open_block(functions::PARALLEL, None);
        let fork_time = self.now;
        let mut ends = Vec::with_capacity(branches.len());
        let mut join_time = fork_time;
        let mut branch_error = None;
        for branch in branches.iter().copied() {
            self.now = fork_time;
            self.tips = vec![parallel.clone()];
            self.open_block(functions::PARALLEL, Some(Label::Branch(branch.to_string())));
            body(branch, self);
            let error = self.open.last().and_then(|b| b.end_error.clone());
            if branch_error.is_none() {
                branch_error = error;
            }
            if let Some(end) = self.close_block() {
                ends.push(end);
            }
            join_time = join_time.max(self.now);
        }
        self.now = join_time;
        self.tips = ends;
        if let Some(error) = branch_error {
            self.fail_block(error);
        }
        self.close_block();
        parallel
    }

    /// Fork into branches that are still running, leaving the parallel block open
    ///
    /// Every branch start is recorded first. Branches named in `running` then record their
    /// body and stay open; the others record theirs and close, so ids interleave the way a
    /// live engine writes them and the latest node of the fork is a finished branch end.
    /// Meant to be snapshotted with [`RunBuilder::build_running`].
    pub fn live_parallel(
        &mut self,
        branches: &[&str],
        running: &[&str],
        mut body: impl FnMut(&str, &mut RunBuilder),
    ) -> NodeId {
        let parallel = self.open_block(functions::PARALLEL, None);
        let fork_time = self.now;
        let depth = self.open.len();

        let mut starts = Vec::with_capacity(branches.len());
        for branch in branches.iter().copied() {
            self.tips = vec![parallel.clone()];
            let start = self.open_block(functions::PARALLEL, Some(Label::Branch(branch.to_string())));
            self.open.truncate(depth);
            starts.push((branch, start));
        }

        let (live, finished): (Vec<_>, Vec<_>) = starts
            .into_iter()
            .partition(|(branch, _)| running.contains(branch));
        let mut tips = Vec::new();
        let mut latest = fork_time;
        for (branch, start) in live.into_iter().chain(finished) {
            self.now = fork_time;
            self.tips = vec![start.clone()];
            self.open.push(OpenBlock {
                start,
                end_error: None,
            });
            body(branch, self);
            if running.contains(&branch) {
                self.open.truncate(depth);
            } else {
                while self.open.len() > depth {
                    self.close_block();
                }
            }
            tips.append(&mut self.tips);
            latest = latest.max(self.now);
        }
        self.tips = tips;
        self.now = latest;
        parallel
    }

    /// Snapshot the script as a run that is still building
    pub fn build_running(&self) -> InMemoryRun {
        InMemoryRun::new(
            self.run_id.clone(),
            RunInfo::running(self.start_millis),
            Arc::new(InMemoryExecution::from_nodes(self.nodes.clone())),
        )
    }

    /// Close every open block, append the flow end, and return the completed run
    pub fn finish(self, result: RunResult) -> InMemoryRun {
        self.finish_inner(result, None)
    }

    /// Like [`RunBuilder::finish`], with the run failing on an uncaught error
    pub fn finish_with_error(self, result: RunResult, error: ErrorInfo) -> InMemoryRun {
        self.finish_inner(result, Some(error))
    }

    fn finish_inner(mut self, result: RunResult, error: Option<ErrorInfo>) -> InMemoryRun {
        while !self.open.is_empty() {
            if let Some(error) = &error {
                self.fail_block(error.clone());
            }
            self.close_block();
        }
        let flow_start = self.flow_start.clone();
        self.push(NodeKind::FlowEnd { start: flow_start });
        self.last_mut().error = error;
        let info = RunInfo::finished(self.start_millis, self.now - self.start_millis, result);
        InMemoryRun::new(
            self.run_id,
            info,
            Arc::new(InMemoryExecution::from_nodes(self.nodes)),
        )
    }

    pub fn nodes(&self) -> &[ExecutionNode] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_records_two_block_levels() {
        let mut builder = RunBuilder::new("job#1", 0);
        let body = builder.stage("Build", |b| {
            b.step("sh", 100);
        });
        let nodes = builder.nodes();
        // flow start, outer, body, sh, body end, outer end
        assert_eq!(nodes.len(), 6);
        assert_eq!(body, NodeId::from("4"));
        assert_eq!(nodes[0].name(), display_names::PIPELINE_START);
        assert_eq!(nodes[1].function_name.as_deref(), Some(functions::STAGE));
        assert_eq!(nodes[2].label, Some(Label::Stage("Build".to_string())));
        assert_eq!(nodes[3].enclosing, vec![NodeId::from("4"), NodeId::from("3")]);
        assert_eq!(
            nodes[4].kind,
            NodeKind::BlockEnd {
                start: NodeId::from("4")
            }
        );
    }

    #[test]
    fn test_parallel_joins_all_branch_ends() {
        let mut builder = RunBuilder::new("job#1", 0);
        builder.parallel(&["A", "B"], |branch, b| {
            b.step("sh", if branch == "A" { 10_000 } else { 3_000 });
        });
        let join = builder.nodes().last().unwrap();
        assert_eq!(join.parents.len(), 2);
        assert_eq!(join.timestamp_millis, 10_000);
    }

    #[test]
    fn test_heads_track_live_branches() {
        let mut builder = RunBuilder::new("job#1", 0);
        builder.open_block("parallel", None);
        builder.open_block("parallel", Some(Label::Branch("A".to_string())));
        builder.step("sh", 10);
        let run = builder.build_running();
        let execution = run.execution().unwrap();
        assert_eq!(execution.heads(), vec![NodeId::from("5")]);

        let handle = run.execution_handle().unwrap();
        let extra = ExecutionNode::new("6", RunId::from("job#1"), NodeKind::AtomicStep, 20)
            .with_parents(vec![NodeId::from("5")]);
        handle.append(extra);
        assert_eq!(execution.heads(), vec![NodeId::from("6")]);
    }

    #[test]
    fn test_live_parallel_interleaves_branch_ids() {
        let mut builder = RunBuilder::new("job#1", 0);
        builder.live_parallel(&["A", "B"], &["B"], |branch, b| {
            b.step("sh", if branch == "A" { 1_000 } else { 5_000 });
        });
        // 3 parallel, 4 A, 5 B, 6 sh in B, 7 sh in A, 8 end A
        let nodes = builder.nodes();
        assert_eq!(nodes.len(), 7);
        assert_eq!(nodes[4].enclosing, vec![NodeId::from("5"), NodeId::from("3")]);
        assert_eq!(nodes[5].enclosing, vec![NodeId::from("4"), NodeId::from("3")]);
        assert_eq!(
            nodes[6].kind,
            NodeKind::BlockEnd {
                start: NodeId::from("4")
            }
        );

        let run = builder.build_running();
        let mut heads = run.execution().unwrap().heads();
        heads.sort();
        assert_eq!(heads, vec![NodeId::from("6"), NodeId::from("8")]);
    }

    #[test]
    fn test_finish_closes_open_blocks() {
        let mut builder = RunBuilder::new("job#1", 0);
        builder.open_stage("Deploy");
        builder.step("sh", 50);
        let run = builder.finish(RunResult::Success);
        let execution = run.execution().unwrap();
        let heads = execution.heads();
        assert_eq!(heads.len(), 1);
        let end = execution.node(&heads[0]).unwrap();
        assert!(matches!(end.kind, NodeKind::FlowEnd { .. }));
        assert_eq!(run.info().duration_millis, Some(50));
    }
}
