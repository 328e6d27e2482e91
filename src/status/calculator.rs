//! # Status Calculation
//!
//! Derives the status of a chunk from the node that closes it and the state of the run.
//!
//! ## Decision order
//!
//! 1. A skipped stage or an explicitly not-executed node is `NOT_EXECUTED`.
//! 2. The open tip of a live run is `QUEUED`, `ABORTED`, `PAUSED_PENDING_INPUT` or
//!    `IN_PROGRESS` depending on what the last node is waiting for. The tip of a finished
//!    run takes the run's own result.
//! 3. A completed chunk is `FAILURE` (or its interruption result) when the closing node
//!    carries an error, otherwise the worst warning inside it, otherwise `SUCCESS`.
//!
//! A branch chunk closed by its own end node is completed, even while sibling branches are
//! still running and the end is therefore a head. An enclosing open block whose latest node
//! happens to be that end is still live.

use super::Status;
use crate::analysis::{Chunk, ParallelRelationship};
use crate::models::{ExecutionNode, FlowGraph, GraphNode, NodeRole, QueueState, RunResult};

pub struct StatusCalculator<'a> {
    graph: &'a FlowGraph,
}

impl<'a> StatusCalculator<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self { graph }
    }

    /// Status of `chunk`; `None` when its nodes are not part of the snapshot
    pub fn compute_status(&self, chunk: &Chunk) -> Option<Status> {
        let first = self.graph.node(&chunk.first)?;
        let last = self.graph.get(&chunk.last)?;

        if last.node.not_executed || self.is_skipped(first, &last.node) {
            return Some(Status::NotExecuted);
        }

        let is_open_tip = chunk.after.is_none() || self.graph.is_head(last.id());
        if is_open_tip && !closes_own_branch(self.graph, chunk, last) {
            let info = self.graph.info();
            if info.building {
                return Some(live_status(&last.node));
            }
            return Some(
                info.result
                    .map(RunResult::to_status)
                    .unwrap_or(Status::NotExecuted),
            );
        }

        Some(self.completed_status(chunk, &last.node))
    }

    /// Worst status across the branches of a parallel block
    pub fn compute_parallel_status(&self, parallel: &ParallelRelationship) -> Option<Status> {
        let branches = parallel
            .branches
            .iter()
            .filter_map(|branch| self.compute_status(&branch.chunk));
        Status::worst(branches).or_else(|| self.compute_status(&parallel.chunk))
    }

    fn is_skipped(&self, first: &ExecutionNode, last: &ExecutionNode) -> bool {
        if first.stage_skip.is_some() || last.stage_skip.is_some() {
            return true;
        }
        last.kind
            .start_of()
            .and_then(|start| self.graph.node(start))
            .is_some_and(|start| start.stage_skip.is_some())
    }

    fn completed_status(&self, chunk: &Chunk, last: &ExecutionNode) -> Status {
        if let Some(error) = &last.error {
            return error
                .interruption
                .map(RunResult::to_status)
                .unwrap_or(Status::Failure);
        }
        self.graph
            .nodes_in_chunk(chunk)
            .filter_map(|n| n.node.warning.as_ref().map(|w| w.result))
            .max()
            .map(RunResult::to_status)
            .unwrap_or(Status::Success)
    }
}

/// Status of the node a live run is currently sitting on
fn live_status(last: &ExecutionNode) -> Status {
    match last.queue_state {
        Some(QueueState::Queued) => Status::Queued,
        Some(QueueState::Cancelled) => Status::Aborted,
        Some(QueueState::Launched) | None if last.is_paused_for_input() => {
            Status::PausedPendingInput
        }
        Some(QueueState::Launched) | None => Status::InProgress,
    }
}

/// Whether `last` is the end of the parallel branch that `chunk` starts
pub(crate) fn closes_own_branch(graph: &FlowGraph, chunk: &Chunk, last: &GraphNode) -> bool {
    last.role == NodeRole::BlockEnd
        && last.node.kind.start_of() == Some(&chunk.first)
        && graph.role(&chunk.first) == Some(NodeRole::ParallelBranch)
}
