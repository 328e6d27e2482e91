//! # Timing Calculation
//!
//! Wall-clock span of a chunk: from its first node (or the run start for the flow start) to
//! the node that followed it, or to "now" while the run is live.

use serde::{Deserialize, Serialize};

use super::calculator::closes_own_branch;
use crate::analysis::{Chunk, ParallelRelationship};
use crate::models::FlowGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingInfo {
    pub start_time_millis: i64,
    pub total_duration_millis: i64,
    pub pause_duration_millis: i64,
}

impl TimingInfo {
    /// Clamps the pause into `[0, total]`
    pub fn new(start_time_millis: i64, total_duration_millis: i64, pause_duration_millis: i64) -> Self {
        let total_duration_millis = total_duration_millis.max(0);
        Self {
            start_time_millis,
            total_duration_millis,
            pause_duration_millis: pause_duration_millis.clamp(0, total_duration_millis),
        }
    }

    /// Timing of something that never ran
    pub fn zero(start_time_millis: i64) -> Self {
        Self::new(start_time_millis, 0, 0)
    }

    /// Time actually spent executing
    pub fn execution_duration_millis(&self) -> i64 {
        self.total_duration_millis - self.pause_duration_millis
    }
}

pub struct TimingCalculator<'a> {
    graph: &'a FlowGraph,
    now_millis: i64,
}

impl<'a> TimingCalculator<'a> {
    pub fn new(graph: &'a FlowGraph, now_millis: i64) -> Self {
        Self { graph, now_millis }
    }

    /// Timing of `chunk` given the pause accumulated inside it
    pub fn compute_timing(&self, accumulated_pause_millis: i64, chunk: &Chunk) -> Option<TimingInfo> {
        let first = self.graph.node(&chunk.first)?;
        let last = self.graph.get(&chunk.last)?;
        let info = self.graph.info();

        let start = if self.graph.is_root(&chunk.first) {
            info.start_time_millis
        } else {
            first.timestamp_millis
        };

        let end = if closes_own_branch(self.graph, chunk, last) {
            last.node.timestamp_millis
        } else if let Some(after) = chunk.after.as_ref().and_then(|a| self.graph.node(a)) {
            after.timestamp_millis
        } else if info.building {
            self.now_millis
        } else {
            info.end_time_millis()
                .unwrap_or(last.node.timestamp_millis)
        };

        Some(TimingInfo::new(start, end - start, accumulated_pause_millis))
    }

    /// Pause recorded on the nodes of `chunk`, open pauses measured to now
    pub fn accumulated_pause(&self, chunk: &Chunk) -> i64 {
        self.graph
            .nodes_in_chunk(chunk)
            .map(|n| n.node.pause_millis(self.now_millis))
            .sum()
    }

    pub fn chunk_timing(&self, chunk: &Chunk) -> Option<TimingInfo> {
        self.compute_timing(self.accumulated_pause(chunk), chunk)
    }

    /// Aggregate timing of a parallel block
    ///
    /// Branches run concurrently, so the pause is the longest branch pause rather than a
    /// sum. A finished block spans its own wall clock; a live one spans its longest branch.
    pub fn parallel_timing(&self, parallel: &ParallelRelationship) -> Option<TimingInfo> {
        let own = self.compute_timing(0, &parallel.chunk)?;
        let branches: Vec<TimingInfo> = parallel
            .branches
            .iter()
            .filter_map(|b| self.chunk_timing(&b.chunk))
            .collect();

        let pause = branches
            .iter()
            .map(|t| t.pause_duration_millis)
            .max()
            .unwrap_or(0);
        let complete = self.graph.end_of(&parallel.chunk.first).is_some();
        let total = if complete || branches.is_empty() {
            own.total_duration_millis
        } else {
            branches
                .iter()
                .map(|t| t.total_duration_millis)
                .max()
                .unwrap_or(0)
        };

        Some(TimingInfo::new(own.start_time_millis, total, pause))
    }
}
