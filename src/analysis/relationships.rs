//! # Relationship Resolution
//!
//! Every node that may surface in the stage tree gets a relationship naming the nodes that
//! bound it: where it starts, where it ends, and the node that followed it (the moment it
//! stopped running). Parallel blocks get an aggregate relationship shared by the block and
//! all of its branches.
//!
//! Resolution is one backward pass in descending id order. Sibling tracking is keyed by the
//! innermost enclosing block rather than kept on a single stack, so branches whose node ids
//! interleave never see each other's nodes.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::chunk_finder::{scan_chunks, Chunk, StageChunkFinder, StandardChunkVisitor};
use crate::models::{FlowGraph, GraphNode, NodeId, NodeRole};
use crate::status::{Status, StatusCalculator, TimingCalculator, TimingInfo};

/// Bounds of a single node or block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRelationship {
    pub chunk: Chunk,
}

impl NodeRelationship {
    pub fn new(chunk: Chunk) -> Self {
        Self { chunk }
    }

    pub fn start(&self) -> &NodeId {
        &self.chunk.first
    }

    pub fn end(&self) -> &NodeId {
        &self.chunk.last
    }

    pub fn after(&self) -> Option<&NodeId> {
        self.chunk.after.as_ref()
    }

    pub fn status(&self, calculator: &StatusCalculator<'_>) -> Option<Status> {
        calculator.compute_status(&self.chunk)
    }

    pub fn timing(&self, calculator: &TimingCalculator<'_>) -> Option<TimingInfo> {
        calculator.chunk_timing(&self.chunk)
    }
}

/// One branch of a parallel block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRelationship {
    pub chunk: Chunk,
}

impl BranchRelationship {
    pub fn start(&self) -> &NodeId {
        &self.chunk.first
    }

    pub fn end(&self) -> &NodeId {
        &self.chunk.last
    }
}

/// Aggregate bounds of a parallel block and its branches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelRelationship {
    /// Bounds of the block itself
    pub chunk: Chunk,
    /// Branches in ascending start id order
    pub branches: Vec<BranchRelationship>,
}

impl ParallelRelationship {
    /// The branch starting or ending at `id`
    pub fn branch(&self, id: &NodeId) -> Option<&BranchRelationship> {
        self.branches
            .iter()
            .find(|b| b.start() == id || b.end() == id)
    }

    /// Worst branch status, falling back to the block's own when it has no branches
    pub fn status(&self, calculator: &StatusCalculator<'_>) -> Option<Status> {
        calculator.compute_parallel_status(self)
    }

    pub fn timing(&self, calculator: &TimingCalculator<'_>) -> Option<TimingInfo> {
        calculator.parallel_timing(self)
    }

    pub fn branch_status(&self, calculator: &StatusCalculator<'_>, id: &NodeId) -> Option<Status> {
        self.branch(id)
            .and_then(|b| calculator.compute_status(&b.chunk))
    }

    pub fn branch_timing(
        &self,
        calculator: &TimingCalculator<'_>,
        id: &NodeId,
    ) -> Option<TimingInfo> {
        self.branch(id).and_then(|b| calculator.chunk_timing(&b.chunk))
    }
}

#[derive(Debug, Clone)]
pub enum Relationship {
    Node(NodeRelationship),
    Parallel(Arc<ParallelRelationship>),
}

impl Relationship {
    /// Chunk bounding the node this relationship was looked up for
    ///
    /// For a parallel relationship looked up through a branch id this is the branch chunk.
    pub fn chunk_for(&self, id: &NodeId) -> &Chunk {
        match self {
            Self::Node(node) => &node.chunk,
            Self::Parallel(parallel) => parallel
                .branch(id)
                .map(|b| &b.chunk)
                .unwrap_or(&parallel.chunk),
        }
    }

    pub fn status_for(&self, calculator: &StatusCalculator<'_>, id: &NodeId) -> Option<Status> {
        match self {
            Self::Node(node) => node.status(calculator),
            Self::Parallel(parallel) if parallel.branch(id).is_some() => {
                parallel.branch_status(calculator, id)
            }
            Self::Parallel(parallel) => parallel.status(calculator),
        }
    }

    pub fn timing_for(&self, calculator: &TimingCalculator<'_>, id: &NodeId) -> Option<TimingInfo> {
        match self {
            Self::Node(node) => node.timing(calculator),
            Self::Parallel(parallel) if parallel.branch(id).is_some() => {
                parallel.branch_timing(calculator, id)
            }
            Self::Parallel(parallel) => parallel.timing(calculator),
        }
    }
}

/// Relationships keyed by node id
#[derive(Debug, Clone, Default)]
pub struct RelationshipMap {
    relationships: HashMap<NodeId, Relationship>,
}

impl RelationshipMap {
    pub fn get(&self, id: &NodeId) -> Option<&Relationship> {
        self.relationships.get(id)
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Relationship)> {
        self.relationships.iter()
    }
}

/// Innermost enclosing block start, `None` for top-level nodes
type ScopeKey = Option<NodeId>;

/// Resolves [`Relationship`]s for one graph snapshot
pub struct RelationshipResolver<'a> {
    graph: &'a FlowGraph,
    /// Most recently processed (chronologically next) sibling per scope
    latest: HashMap<ScopeKey, NodeId>,
    /// Scopes of blocks whose end was seen and whose start is still ahead
    open_scopes: HashMap<NodeId, Option<NodeId>>,
    pending_branches: HashMap<NodeId, Vec<BranchRelationship>>,
    relationships: HashMap<NodeId, Relationship>,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self {
            graph,
            latest: HashMap::new(),
            open_scopes: HashMap::new(),
            pending_branches: HashMap::new(),
            relationships: HashMap::new(),
        }
    }

    /// Resolve relationships for every node of `graph`
    pub fn resolve(graph: &FlowGraph) -> RelationshipMap {
        let mut resolver = RelationshipResolver::new(graph);
        for node in graph.nodes().iter().rev() {
            match node.role {
                NodeRole::BlockEnd => resolver.visit_block_end(node),
                NodeRole::Stage
                | NodeRole::ParallelBlock
                | NodeRole::ParallelBranch
                | NodeRole::Block => resolver.visit_block_start(node),
                NodeRole::FlowStart => resolver.visit_flow_start(node),
                NodeRole::FlowEnd | NodeRole::LegacyStage | NodeRole::Step => {
                    resolver.visit_child(node)
                }
            }
        }
        resolver.apply_marker_stage_chunks();

        debug!(
            run_id = %graph.run_id(),
            relationship_count = resolver.relationships.len(),
            "Node relationships resolved"
        );
        RelationshipMap {
            relationships: resolver.relationships,
        }
    }

    fn scope_of(node: &GraphNode) -> ScopeKey {
        node.node.enclosing_block().cloned()
    }

    fn is_parallel_block(&self, id: &NodeId) -> bool {
        self.graph.role(id) == Some(NodeRole::ParallelBlock)
    }

    /// The node that followed `node` in its own scope, propagating to enclosing scopes
    /// while the enclosing block is still open
    fn after_of(&self, node: &GraphNode) -> Option<NodeId> {
        let mut scope = Self::scope_of(node);
        loop {
            let Some(block) = scope else {
                return self.latest.get(&None).cloned();
            };
            // branches of one parallel block are not each other's siblings
            if !self.is_parallel_block(&block) {
                if let Some(latest) = self.latest.get(&Some(block.clone())) {
                    return Some(latest.clone());
                }
            }
            if let Some(end) = self.graph.end_of(&block) {
                return Some(end.clone());
            }
            scope = self
                .graph
                .node(&block)
                .and_then(|n| n.enclosing_block().cloned());
        }
    }

    fn mark_processed(&mut self, node: &GraphNode) {
        let scope = Self::scope_of(node);
        if scope.as_ref().is_some_and(|s| self.is_parallel_block(s)) {
            return;
        }
        self.latest.insert(scope, node.id().clone());
    }

    fn before_of(node: &GraphNode) -> Option<NodeId> {
        node.node.parents.first().cloned()
    }

    fn visit_child(&mut self, node: &GraphNode) {
        let after = self.after_of(node);
        let chunk = Chunk::single(Self::before_of(node), node.id().clone(), after);
        self.relationships
            .insert(node.id().clone(), Relationship::Node(NodeRelationship::new(chunk)));
        self.mark_processed(node);
    }

    fn visit_block_end(&mut self, end: &GraphNode) {
        let Some(start) = end.node.kind.start_of() else {
            return;
        };
        let after = self.after_of(end);
        self.open_scopes.insert(start.clone(), after);
    }

    fn visit_block_start(&mut self, start: &GraphNode) {
        let id = start.id().clone();
        let end = self.graph.end_of(&id).cloned();
        let (last, after) = match &end {
            Some(end) => {
                let after = match self.open_scopes.remove(&id) {
                    Some(after) => after,
                    None => {
                        warn!(
                            run_id = %self.graph.run_id(),
                            node_id = %id,
                            "Block closed without a matching scope, relationship has no successor"
                        );
                        None
                    }
                };
                (end.clone(), after)
            }
            // still running: spans to its latest node, nothing has followed it yet
            None => (
                self.graph
                    .latest_inside(&id)
                    .cloned()
                    .unwrap_or_else(|| id.clone()),
                None,
            ),
        };
        self.latest.remove(&Some(id.clone()));
        let chunk = Chunk::new(Self::before_of(start), id.clone(), last, after);

        match start.role {
            NodeRole::ParallelBranch => {
                let parallel = Self::scope_of(start);
                match parallel {
                    Some(parallel) if self.is_parallel_block(&parallel) => {
                        self.pending_branches
                            .entry(parallel)
                            .or_default()
                            .push(BranchRelationship { chunk });
                    }
                    _ => self.insert_block(id, end, Relationship::Node(NodeRelationship::new(chunk))),
                }
            }
            NodeRole::ParallelBlock => {
                let mut branches = self.pending_branches.remove(&id).unwrap_or_default();
                branches.sort_by(|a, b| a.start().cmp(b.start()));
                let parallel = Arc::new(ParallelRelationship { chunk, branches });
                for branch in &parallel.branches {
                    let branch_end = self.graph.end_of(branch.start()).cloned();
                    self.insert_block(
                        branch.start().clone(),
                        branch_end,
                        Relationship::Parallel(Arc::clone(&parallel)),
                    );
                }
                self.insert_block(id, end, Relationship::Parallel(parallel));
            }
            _ => self.insert_block(id, end, Relationship::Node(NodeRelationship::new(chunk))),
        }
        self.mark_processed(start);
    }

    /// Register a block's relationship under its start and, once closed, its end node
    ///
    /// An open block's chunk ends at its latest inner node, which keeps its own relationship.
    fn insert_block(&mut self, start: NodeId, end: Option<NodeId>, relationship: Relationship) {
        if let Some(end) = end {
            self.relationships.insert(end, relationship.clone());
        }
        self.relationships.insert(start, relationship);
    }

    /// The flow start spans the whole run
    fn visit_flow_start(&mut self, start: &GraphNode) {
        let last = self
            .graph
            .flow_end()
            .map(|end| end.id().clone())
            .or_else(|| self.graph.nodes().last().map(|n| n.id().clone()))
            .unwrap_or_else(|| start.id().clone());
        let chunk = Chunk::new(None, start.id().clone(), last, None);
        self.relationships.insert(
            start.id().clone(),
            Relationship::Node(NodeRelationship::new(chunk)),
        );
    }

    /// Marker-scoped stages span up to the next stage, which only a chunk scan can tell
    fn apply_marker_stage_chunks(&mut self) {
        if !self
            .graph
            .nodes()
            .iter()
            .any(|n| n.role == NodeRole::LegacyStage)
        {
            return;
        }
        let finder = StageChunkFinder::new(self.graph);
        let mut visitor = StandardChunkVisitor::new();
        scan_chunks(self.graph, &finder, &mut visitor);
        for chunk in visitor.into_chunks() {
            if self.graph.role(&chunk.first) == Some(NodeRole::LegacyStage) {
                self.relationships.insert(
                    chunk.first.clone(),
                    Relationship::Node(NodeRelationship::new(chunk)),
                );
            }
        }
    }
}
