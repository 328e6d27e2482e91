//! # Chunk Finding
//!
//! A chunk is a contiguous run of nodes delimited by `first` and `last`, together with the
//! neighbouring `before` and `after` nodes that bound it. Stage-like chunks are what status
//! and timing get computed over.
//!
//! The scanner walks a [`FlowGraph`] from the most recent node backwards, asking a
//! [`ChunkFinder`] where chunks begin and end and reporting every boundary to a
//! [`ChunkVisitor`].

use serde::Serialize;

use crate::models::{FlowGraph, GraphNode, NodeId, NodeRole};

/// A contiguous node range plus its bounding neighbours
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Chunk {
    /// Node immediately preceding `first`, absent at the flow start
    pub before: Option<NodeId>,
    pub first: NodeId,
    pub last: NodeId,
    /// Node immediately following `last`, absent while the chunk is still open
    pub after: Option<NodeId>,
}

impl Chunk {
    pub fn new(before: Option<NodeId>, first: NodeId, last: NodeId, after: Option<NodeId>) -> Self {
        Self {
            before,
            first,
            last,
            after,
        }
    }

    /// Chunk made of one node
    pub fn single(before: Option<NodeId>, node: NodeId, after: Option<NodeId>) -> Self {
        Self::new(before, node.clone(), node, after)
    }
}

/// Decides where chunks begin and end during a backward scan
///
/// `previous` is the node visited just before `current`, which is the chronologically
/// *later* neighbour.
pub trait ChunkFinder {
    /// Whether the scan starts inside an open chunk, so the tip acts as a chunk end
    fn is_start_inside_chunk(&self) -> bool;

    fn is_chunk_start(&self, current: &GraphNode, previous: Option<&GraphNode>) -> bool;

    fn is_chunk_end(&self, current: &GraphNode, previous: Option<&GraphNode>) -> bool;
}

/// Finds stage chunks, block-scoped and marker-scoped alike
///
/// A marker-scoped stage ends right before the next stage starts, which is why a node whose
/// later neighbour is a chunk start counts as a chunk end.
pub struct StageChunkFinder<'a> {
    graph: &'a FlowGraph,
}

impl<'a> StageChunkFinder<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self { graph }
    }
}

impl ChunkFinder for StageChunkFinder<'_> {
    fn is_start_inside_chunk(&self) -> bool {
        true
    }

    fn is_chunk_start(&self, current: &GraphNode, _previous: Option<&GraphNode>) -> bool {
        matches!(current.role, NodeRole::Stage | NodeRole::LegacyStage)
    }

    fn is_chunk_end(&self, current: &GraphNode, previous: Option<&GraphNode>) -> bool {
        let closes_stage = match current.role {
            NodeRole::BlockEnd => current
                .node
                .kind
                .start_of()
                .and_then(|start| self.graph.role(start))
                == Some(NodeRole::Stage),
            NodeRole::FlowStart
            | NodeRole::FlowEnd
            | NodeRole::Stage
            | NodeRole::LegacyStage
            | NodeRole::ParallelBlock
            | NodeRole::ParallelBranch
            | NodeRole::Block
            | NodeRole::Step => false,
        };
        closes_stage || previous.is_some_and(|later| self.is_chunk_start(later, None))
    }
}

/// Receives chunk boundaries from [`scan_chunks`], most recent first
pub trait ChunkVisitor {
    /// `before` is the chronologically earlier neighbour of `start`
    fn chunk_start(&mut self, start: &GraphNode, before: Option<&GraphNode>);

    /// `after` is the chronologically later neighbour of `end`
    fn chunk_end(&mut self, end: &GraphNode, after: Option<&GraphNode>);

    /// A node that is neither start nor end
    fn atom_node(
        &mut self,
        _before: Option<&GraphNode>,
        _atom: &GraphNode,
        _after: Option<&GraphNode>,
    ) {
    }
}

/// Collects complete chunks
#[derive(Debug, Default)]
pub struct StandardChunkVisitor {
    last: Option<NodeId>,
    after: Option<NodeId>,
    chunks: Vec<Chunk>,
}

impl StandardChunkVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks in ascending order of their first node
    pub fn into_chunks(self) -> Vec<Chunk> {
        let mut chunks = self.chunks;
        chunks.reverse();
        chunks
    }
}

impl ChunkVisitor for StandardChunkVisitor {
    fn chunk_start(&mut self, start: &GraphNode, before: Option<&GraphNode>) {
        let last = self.last.take().unwrap_or_else(|| start.id().clone());
        self.chunks.push(Chunk::new(
            before.map(|n| n.id().clone()),
            start.id().clone(),
            last,
            self.after.take(),
        ));
    }

    fn chunk_end(&mut self, end: &GraphNode, after: Option<&GraphNode>) {
        self.last = Some(end.id().clone());
        self.after = after.map(|n| n.id().clone());
    }
}

/// Walk `graph` from its most recent node back to the flow start
///
/// A node that is both an end and a start (a marker stage followed directly by another)
/// reports its end first, so the chunk it opens is already bounded.
pub fn scan_chunks(graph: &FlowGraph, finder: &dyn ChunkFinder, visitor: &mut dyn ChunkVisitor) {
    let mut iter = graph.nodes().iter().rev().peekable();
    if finder.is_start_inside_chunk() {
        if let Some(tip) = iter.peek() {
            visitor.chunk_end(tip, None);
        }
    }

    let mut previous: Option<&GraphNode> = None;
    while let Some(current) = iter.next() {
        let before = iter.peek().copied();
        let mut boundary = false;
        if finder.is_chunk_end(current, previous) {
            visitor.chunk_end(current, previous);
            boundary = true;
        }
        if finder.is_chunk_start(current, previous) {
            visitor.chunk_start(current, before);
            boundary = true;
        }
        if !boundary {
            visitor.atom_node(before, current, previous);
        }
        previous = Some(current);
    }
}
