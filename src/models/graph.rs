//! # Flow Graph Snapshot
//!
//! An immutable, id-indexed arena holding every node reverse-reachable from the run's
//! heads at the moment of the snapshot. The engine keeps appending while a run is live;
//! the snapshot never observes those appends, so everything computed from it is
//! internally consistent.
//!
//! Each node's [`NodeRole`] is decided once here and consumed downstream through
//! exhaustive matches.
//!
//! Validation is fail-fast: a node from another run or a dangling reference aborts the
//! snapshot with a descriptive [`GraphError`] rather than producing a corrupt tree.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::node::{ExecutionNode, Label, NodeId, NodeKind};
use super::run::{PipelineRun, RunId, RunInfo};
use crate::analysis::Chunk;
use crate::constants::functions;
use crate::error::{GraphError, Result};

/// What a node means for the stage tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    FlowStart,
    FlowEnd,
    /// Block-scoped stage body start carrying the stage label
    Stage,
    /// Marker-scoped stage: a labelled atomic node without an end
    LegacyStage,
    /// Start of a `parallel` step, the parent of its branches
    ParallelBlock,
    ParallelBranch,
    /// Any other body-taking step (including the unlabelled outer level of a stage)
    Block,
    BlockEnd,
    Step,
}

impl NodeRole {
    pub fn classify(node: &ExecutionNode) -> Self {
        match &node.kind {
            NodeKind::FlowStart => Self::FlowStart,
            NodeKind::FlowEnd { .. } => Self::FlowEnd,
            NodeKind::BlockEnd { .. } => Self::BlockEnd,
            NodeKind::AtomicStep => match node.label {
                Some(Label::Stage(_)) => Self::LegacyStage,
                _ => Self::Step,
            },
            NodeKind::BlockStart => match &node.label {
                Some(Label::Branch(_)) => Self::ParallelBranch,
                Some(Label::Stage(_)) => Self::Stage,
                None if node.function_name.as_deref() == Some(functions::PARALLEL) => {
                    Self::ParallelBlock
                }
                None => Self::Block,
            },
        }
    }

    pub fn is_stage_like(self) -> bool {
        matches!(
            self,
            Self::Stage | Self::LegacyStage | Self::ParallelBlock | Self::ParallelBranch
        )
    }

    pub fn is_block_start(self) -> bool {
        matches!(
            self,
            Self::Stage | Self::ParallelBlock | Self::ParallelBranch | Self::Block
        )
    }

    pub fn is_end(self) -> bool {
        matches!(self, Self::FlowEnd | Self::BlockEnd)
    }
}

/// A node together with its role
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub node: ExecutionNode,
    pub role: NodeRole,
}

impl GraphNode {
    pub fn id(&self) -> &NodeId {
        &self.node.id
    }
}

/// Immutable snapshot of one run's execution DAG
#[derive(Debug, Clone)]
pub struct FlowGraph {
    run_id: RunId,
    info: RunInfo,
    /// Ascending id order, which is a topological order
    nodes: Vec<GraphNode>,
    index: HashMap<NodeId, usize>,
    heads: HashSet<NodeId>,
    end_of: HashMap<NodeId, NodeId>,
    latest_inside: HashMap<NodeId, NodeId>,
}

impl FlowGraph {
    /// Take a snapshot of `run`; a run without an execution yields an empty graph
    pub fn snapshot(run: &dyn PipelineRun) -> Result<Self> {
        let run_id = run.run_id();
        let info = run.info();
        let Some(execution) = run.execution() else {
            debug!(run_id = %run_id, "No execution started, snapshot is empty");
            return Ok(Self::empty(run_id, info));
        };

        let heads = execution.heads();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut pending: Vec<(NodeId, NodeId)> =
            heads.iter().map(|h| (h.clone(), h.clone())).collect();
        let mut collected = Vec::new();

        while let Some((id, referenced_by)) = pending.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let node = execution.node(&id).ok_or_else(|| GraphError::MissingNode {
                node_id: id.clone(),
                referenced_by: referenced_by.clone(),
            })?;
            if node.run_id != run_id {
                return Err(GraphError::ForeignNode {
                    node_id: id,
                    expected: run_id,
                    actual: node.run_id,
                });
            }
            for parent in &node.parents {
                if !visited.contains(parent) {
                    pending.push((parent.clone(), id.clone()));
                }
            }
            collected.push(node);
        }

        Self::from_nodes(run_id, info, collected, heads)
    }

    /// Build a snapshot from an already enumerated node set
    pub fn from_nodes(
        run_id: RunId,
        info: RunInfo,
        mut nodes: Vec<ExecutionNode>,
        heads: Vec<NodeId>,
    ) -> Result<Self> {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let index: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut end_of = HashMap::new();
        for node in &nodes {
            if node.run_id != run_id {
                return Err(GraphError::ForeignNode {
                    node_id: node.id.clone(),
                    expected: run_id,
                    actual: node.run_id.clone(),
                });
            }
            let referenced = node
                .parents
                .iter()
                .chain(node.enclosing.iter())
                .chain(node.kind.start_of());
            for id in referenced {
                if !index.contains_key(id) {
                    return Err(GraphError::MissingNode {
                        node_id: id.clone(),
                        referenced_by: node.id.clone(),
                    });
                }
            }
            if let NodeKind::BlockEnd { start } = &node.kind {
                end_of.insert(start.clone(), node.id.clone());
            }
        }

        let mut latest_inside: HashMap<NodeId, NodeId> = HashMap::new();
        for node in nodes.iter().rev() {
            for block in &node.enclosing {
                latest_inside
                    .entry(block.clone())
                    .or_insert_with(|| node.id.clone());
            }
        }

        let nodes: Vec<GraphNode> = nodes
            .into_iter()
            .map(|node| {
                let role = NodeRole::classify(&node);
                GraphNode { node, role }
            })
            .collect();

        if info.complete {
            if let Some(open) = nodes
                .iter()
                .find(|n| n.role.is_block_start() && !end_of.contains_key(n.id()))
            {
                return Err(GraphError::MissingBlockEnd {
                    start_id: open.id().clone(),
                });
            }
        }

        debug!(
            run_id = %run_id,
            node_count = nodes.len(),
            head_count = heads.len(),
            "Execution graph snapshot taken"
        );

        Ok(Self {
            run_id,
            info,
            nodes,
            index,
            heads: heads.into_iter().collect(),
            end_of,
            latest_inside,
        })
    }

    fn empty(run_id: RunId, info: RunInfo) -> Self {
        Self {
            run_id,
            info,
            nodes: Vec::new(),
            index: HashMap::new(),
            heads: HashSet::new(),
            end_of: HashMap::new(),
            latest_inside: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in ascending id order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node(&self, id: &NodeId) -> Option<&ExecutionNode> {
        self.get(id).map(|n| &n.node)
    }

    pub fn role(&self, id: &NodeId) -> Option<NodeRole> {
        self.get(id).map(|n| n.role)
    }

    pub fn is_head(&self, id: &NodeId) -> bool {
        self.heads.contains(id)
    }

    pub fn is_root(&self, id: &NodeId) -> bool {
        self.role(id) == Some(NodeRole::FlowStart)
    }

    /// End node closing the block opened by `start`
    pub fn end_of(&self, start: &NodeId) -> Option<&NodeId> {
        self.end_of.get(start)
    }

    /// Most recent node enclosed by the block opened by `start`
    pub fn latest_inside(&self, start: &NodeId) -> Option<&NodeId> {
        self.latest_inside.get(start)
    }

    /// The flow-end node, present once the execution finished
    pub fn flow_end(&self) -> Option<&GraphNode> {
        self.nodes.iter().rev().find(|n| n.role == NodeRole::FlowEnd)
    }

    /// Nodes covered by `chunk`, ascending
    ///
    /// A chunk opened by a block start covers the block's own nodes between `first` and
    /// `last`; any other chunk covers the whole id range.
    pub fn nodes_in_chunk<'a>(&'a self, chunk: &'a Chunk) -> impl Iterator<Item = &'a GraphNode> + 'a {
        let range = match (self.index.get(&chunk.first), self.index.get(&chunk.last)) {
            (Some(&first), Some(&last)) if first <= last => first..last + 1,
            _ => 0..0,
        };
        let scoped = self
            .role(&chunk.first)
            .is_some_and(NodeRole::is_block_start);
        self.nodes[range].iter().filter(move |n| {
            !scoped
                || n.id() == &chunk.first
                || n.id() == &chunk.last
                || n.node.is_enclosed_by(&chunk.first)
        })
    }
}
