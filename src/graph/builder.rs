//! # Tree Building
//!
//! Turns a [`FlowGraph`] snapshot into a [`PipelineGraph`]: the stage-like tree plus the
//! steps owned by each stage.
//!
//! ## Phases
//!
//! 1. **Wrap**: every non-end node gets a [`WrappedNode`] with its resolved status and
//!    timing. The flow end survives only when it carries an uncaught error, retyped as
//!    [`NodeType::UnhandledException`].
//! 2. **Parent**: each wrapped node's tree parent is its innermost enclosing block that was
//!    wrapped.
//! 3. **Drop**: descendants of stages that never ran are removed.
//! 4. **Normalize**: same-named wrapper/stage pairs are collapsed, the surviving node always
//!    being the parent. Collapses are recorded in a [`RemapTable`].
//! 5. **Assign steps** through the [`StepAssigner`].
//!
//! Every phase iterates in ascending id order, so identical snapshots give identical trees.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument};

use super::remap::RemapTable;
use super::steps::{ExceptionPlacement, StepAssigner, StepMap};
use super::wrapped_node::{NodeType, WrappedNode};
use crate::analysis::{RelationshipMap, RelationshipResolver};
use crate::config::TreeConfig;
use crate::constants::display_names;
use crate::error::Result;
use crate::models::{
    ExecutionNode, FlowGraph, GraphNode, Label, NodeId, NodeKind, NodeRole, PipelineRun, RunId,
};
use crate::status::{Status, StatusCalculator, TimingCalculator, TimingInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub collapse_same_name_wrappers: bool,
    pub drop_skipped_children: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            collapse_same_name_wrappers: true,
            drop_skipped_children: true,
        }
    }
}

impl From<&TreeConfig> for BuildOptions {
    fn from(config: &TreeConfig) -> Self {
        Self {
            collapse_same_name_wrappers: config.collapse_same_name_wrappers,
            drop_skipped_children: config.drop_skipped_children,
        }
    }
}

/// Stage tree and step map of one run, read-only once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineGraph {
    run_id: RunId,
    complete: bool,
    run_status: Option<Status>,
    run_timing: Option<TimingInfo>,
    stages: Vec<WrappedNode>,
    steps: StepMap,
    #[serde(skip)]
    index: HashMap<NodeId, usize>,
}

impl PipelineGraph {
    fn new(
        run_id: RunId,
        complete: bool,
        run_status: Option<Status>,
        run_timing: Option<TimingInfo>,
        stages: Vec<WrappedNode>,
        steps: StepMap,
    ) -> Self {
        let index = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            run_id,
            complete,
            run_status,
            run_timing,
            stages,
            steps,
            index,
        }
    }

    /// Graph of a run whose execution has not produced any node
    pub fn empty(run_id: RunId, complete: bool) -> Self {
        Self::new(run_id, complete, None, None, Vec::new(), StepMap::default())
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Status of the run as a whole
    pub fn run_status(&self) -> Option<Status> {
        self.run_status
    }

    pub fn run_timing(&self) -> Option<TimingInfo> {
        self.run_timing
    }

    /// Stages, parallel wrappers and branches in ascending id order
    pub fn stage_like_nodes(&self) -> &[WrappedNode] {
        &self.stages
    }

    pub fn steps_by_stage(&self) -> &StepMap {
        &self.steps
    }

    /// Steps owned by `stage`, in execution order
    pub fn steps_for(&self, stage: &NodeId) -> &[WrappedNode] {
        self.steps.steps_for(stage)
    }

    pub fn stage(&self, id: &NodeId) -> Option<&WrappedNode> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    pub fn root_stages(&self) -> impl Iterator<Item = &WrappedNode> {
        self.stages.iter().filter(|s| s.parent.is_none())
    }

    pub fn children_of<'a>(&'a self, stage: &'a WrappedNode) -> impl Iterator<Item = &'a WrappedNode> + 'a {
        stage.children.iter().filter_map(|id| self.stage(id))
    }

    /// The pseudo-step standing for an uncaught exception, if the run had one
    pub fn unhandled_exception(&self) -> Option<&WrappedNode> {
        self.steps
            .all_steps()
            .find(|s| s.node_type == NodeType::UnhandledException)
    }
}

/// Snapshot `run` and build its graph
#[instrument(skip(run), fields(run_id = %run.run_id()))]
pub fn build_graph(run: &dyn PipelineRun, now_millis: i64, options: BuildOptions) -> Result<PipelineGraph> {
    let graph = FlowGraph::snapshot(run)?;
    GraphBuilder::new(&graph, now_millis, options).build()
}

pub struct GraphBuilder<'a> {
    graph: &'a FlowGraph,
    options: BuildOptions,
    relationships: RelationshipMap,
    status: StatusCalculator<'a>,
    timing: TimingCalculator<'a>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(graph: &'a FlowGraph, now_millis: i64, options: BuildOptions) -> Self {
        Self {
            graph,
            options,
            relationships: RelationshipResolver::resolve(graph),
            status: StatusCalculator::new(graph),
            timing: TimingCalculator::new(graph, now_millis),
        }
    }

    pub fn build(self) -> Result<PipelineGraph> {
        let run_id = self.graph.run_id().clone();
        let complete = self.graph.info().complete;
        if self.graph.is_empty() {
            return Ok(PipelineGraph::empty(run_id, complete));
        }

        let wrapped = self.wrap_nodes();
        let dropped = self.skipped_descendants(&wrapped);
        let stage_parents = stage_parents(&wrapped, &dropped);

        let mut remap = RemapTable::new();
        let mut children = children_by_parent(&stage_parents);
        if self.options.collapse_same_name_wrappers {
            collapse_same_name_wrappers(&wrapped, &stage_parents, &mut children, &mut remap)?;
        }

        let mut stages = Vec::with_capacity(stage_parents.len());
        for (id, parent) in &stage_parents {
            if remap.is_remapped(id) {
                continue;
            }
            let Some(node) = wrapped.get(id) else { continue };
            let mut stage = node.clone();
            stage.parent = match parent {
                Some(parent) => Some(remap.find(parent)?),
                None => None,
            };
            stage.children = children.remove(id).unwrap_or_default();
            stages.push(stage);
        }

        let published: BTreeSet<NodeId> = stages.iter().map(|s| s.id.clone()).collect();
        let assigner = StepAssigner::new(self.graph, &wrapped, &self.relationships);
        let (steps, placement) = assigner.assign(&published, &dropped, &mut remap)?;
        if let Some(ExceptionPlacement::PseudoStage(stage)) = placement {
            stages.push(stage);
        }

        let root = self.graph.nodes().first().map(|n| n.id().clone());
        let run_node = root.as_ref().and_then(|id| wrapped.get(id));

        debug!(
            run_id = %run_id,
            wrapped_count = wrapped.len(),
            dropped_count = dropped.len(),
            collapsed_count = remap.len(),
            stage_count = stages.len(),
            step_count = steps.step_count(),
            "Pipeline graph built"
        );

        Ok(PipelineGraph::new(
            run_id,
            complete,
            run_node.map(|n| n.status),
            run_node.map(|n| n.timing),
            stages,
            steps,
        ))
    }

    fn node_type(node: &GraphNode) -> Option<NodeType> {
        match node.role {
            NodeRole::FlowStart => Some(NodeType::PipelineStart),
            NodeRole::Stage | NodeRole::LegacyStage => Some(NodeType::Stage),
            NodeRole::ParallelBlock => Some(NodeType::Parallel),
            NodeRole::ParallelBranch => Some(NodeType::ParallelBranch),
            NodeRole::Block => Some(NodeType::StepsBlock),
            NodeRole::Step => Some(NodeType::Step),
            NodeRole::FlowEnd => node
                .node
                .error
                .as_ref()
                .filter(|e| !e.is_intentional_interruption())
                .map(|_| NodeType::UnhandledException),
            NodeRole::BlockEnd => None,
        }
    }

    fn wrap_nodes(&self) -> BTreeMap<NodeId, WrappedNode> {
        let mut wrapped: BTreeMap<NodeId, WrappedNode> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|node| Self::node_type(node).map(|t| (node.id().clone(), self.wrap(node, t))))
            .collect();

        let parents: Vec<(NodeId, Option<NodeId>)> = self
            .graph
            .nodes()
            .iter()
            .filter(|node| wrapped.contains_key(node.id()))
            .map(|node| (node.id().clone(), self.tree_parent(node, &wrapped)))
            .collect();
        for (id, parent) in parents {
            if let Some(node) = wrapped.get_mut(&id) {
                node.parent = parent;
            }
        }
        wrapped
    }

    fn wrap(&self, node: &GraphNode, node_type: NodeType) -> WrappedNode {
        let id = node.id();
        let relationship = self.relationships.get(id);
        let placeholder = node_type == NodeType::Stage && node.node.stage_skip.is_some();

        let status = match node_type {
            NodeType::UnhandledException => Status::Failure,
            _ => relationship
                .and_then(|r| r.status_for(&self.status, id))
                .unwrap_or(Status::NotExecuted),
        };
        let timing = if placeholder {
            TimingInfo::zero(node.node.timestamp_millis)
        } else {
            relationship
                .and_then(|r| r.timing_for(&self.timing, id))
                .unwrap_or_else(|| TimingInfo::zero(node.node.timestamp_millis))
        };
        let name = match node_type {
            NodeType::Parallel => match &node.node.label {
                Some(Label::Stage(name)) | Some(Label::Branch(name)) => name.clone(),
                None => display_names::PARALLEL.to_string(),
            },
            NodeType::UnhandledException => display_names::UNHANDLED_EXCEPTION.to_string(),
            _ => node.node.name().to_string(),
        };

        WrappedNode {
            id: id.clone(),
            name,
            node_type,
            status,
            timing,
            parent: None,
            children: Vec::new(),
            synthetic: node_type == NodeType::UnhandledException,
            placeholder,
            error_message: node.node.error.as_ref().map(|e| e.message.clone()),
        }
    }

    fn tree_parent(&self, node: &GraphNode, wrapped: &BTreeMap<NodeId, WrappedNode>) -> Option<NodeId> {
        if node.role == NodeRole::FlowEnd {
            return self.thrower_stage(node, wrapped);
        }
        node.node
            .enclosing
            .iter()
            .find(|id| wrapped.contains_key(*id))
            .cloned()
    }

    /// First stage-like ancestor of the node that threw the uncaught error
    fn thrower_stage(&self, end: &GraphNode, wrapped: &BTreeMap<NodeId, WrappedNode>) -> Option<NodeId> {
        let error = end.node.error.as_ref()?;
        let mut thrower = match &error.origin {
            Some(origin) => self.graph.node(origin)?,
            None => self.error_carrier(end)?,
        };
        // an end node stands for the block it closes
        if let NodeKind::BlockEnd { start } = &thrower.kind {
            thrower = self.graph.node(start)?;
        }
        std::iter::once(&thrower.id)
            .chain(thrower.enclosing.iter())
            .find(|id| wrapped.get(*id).is_some_and(WrappedNode::is_stage_like))
            .cloned()
    }

    /// Innermost node still carrying the error the flow end reports
    ///
    /// Block ends rethrow what their body threw, so the walk descends through end nodes
    /// while the node before them carries the same error.
    fn error_carrier(&self, end: &GraphNode) -> Option<&'a ExecutionNode> {
        let message = &end.node.error.as_ref()?.message;
        let carries = |node: &ExecutionNode| node.error.as_ref().is_some_and(|e| &e.message == message);

        let mut current = self.graph.node(end.node.parents.first()?)?;
        while matches!(current.kind, NodeKind::BlockEnd { .. }) {
            match current.parents.first().and_then(|p| self.graph.node(p)) {
                Some(inner) if carries(inner) => current = inner,
                _ => break,
            }
        }
        Some(current)
    }

    /// Nodes below a stage that never ran, in ascending id order
    fn skipped_descendants(&self, wrapped: &BTreeMap<NodeId, WrappedNode>) -> HashSet<NodeId> {
        let mut dropped = HashSet::new();
        if !self.options.drop_skipped_children {
            return dropped;
        }
        for node in wrapped.values() {
            let Some(parent) = &node.parent else { continue };
            let parent_skipped = wrapped.get(parent).is_some_and(|p| p.placeholder);
            if parent_skipped || dropped.contains(parent) {
                dropped.insert(node.id.clone());
            }
        }
        if !dropped.is_empty() {
            debug!(
                run_id = %self.graph.run_id(),
                dropped_count = dropped.len(),
                "Dropped nodes below skipped stages"
            );
        }
        dropped
    }
}

/// Nearest kept stage-like ancestor of every kept stage-like node
fn stage_parents(
    wrapped: &BTreeMap<NodeId, WrappedNode>,
    dropped: &HashSet<NodeId>,
) -> BTreeMap<NodeId, Option<NodeId>> {
    wrapped
        .values()
        .filter(|n| n.is_stage_like() && !dropped.contains(&n.id))
        .map(|n| {
            let mut parent = n.parent.as_ref();
            while let Some(id) = parent {
                match wrapped.get(id) {
                    Some(p) if p.is_stage_like() && !dropped.contains(id) => break,
                    Some(p) => parent = p.parent.as_ref(),
                    None => parent = None,
                }
            }
            (n.id.clone(), parent.cloned())
        })
        .collect()
}

fn children_by_parent(stage_parents: &BTreeMap<NodeId, Option<NodeId>>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (id, parent) in stage_parents {
        if let Some(parent) = parent {
            children.entry(parent.clone()).or_default().push(id.clone());
        }
    }
    children
}

/// Whether `child`, as the only stage-like child of `parent`, is redundant with it
fn collapses_into(parent: &WrappedNode, child: &WrappedNode) -> bool {
    parent.name == child.name
        && matches!(
            (parent.node_type, child.node_type),
            (NodeType::Parallel | NodeType::ParallelBranch, NodeType::Stage)
                | (NodeType::Stage, NodeType::ParallelBranch)
        )
}

/// Nodes `parent` absorbs through its only stage-like child `only`, outermost first
///
/// A stage never sees a branch directly: a single-branch parallel wrapper sits in between,
/// and goes away together with the branch.
fn absorbed_by(
    parent: &WrappedNode,
    only: &NodeId,
    wrapped: &BTreeMap<NodeId, WrappedNode>,
    children: &HashMap<NodeId, Vec<NodeId>>,
) -> Option<Vec<NodeId>> {
    let child = wrapped.get(only)?;
    if collapses_into(parent, child) {
        return Some(vec![only.clone()]);
    }
    if parent.node_type != NodeType::Stage || child.node_type != NodeType::Parallel {
        return None;
    }
    let branch = match children.get(only).map(Vec::as_slice) {
        Some([branch]) => branch,
        _ => return None,
    };
    wrapped
        .get(branch)
        .filter(|b| collapses_into(parent, b))
        .map(|_| vec![only.clone(), branch.clone()])
}

fn collapse_same_name_wrappers(
    wrapped: &BTreeMap<NodeId, WrappedNode>,
    stage_parents: &BTreeMap<NodeId, Option<NodeId>>,
    children: &mut HashMap<NodeId, Vec<NodeId>>,
    remap: &mut RemapTable,
) -> Result<()> {
    for id in stage_parents.keys() {
        if remap.is_remapped(id) {
            continue;
        }
        let Some(parent) = wrapped.get(id) else { continue };
        loop {
            let only = match children.get(id).map(Vec::as_slice) {
                Some([only]) => only.clone(),
                _ => break,
            };
            let Some(absorbed) = absorbed_by(parent, &only, wrapped, children) else {
                break;
            };
            let mut grandchildren = Vec::new();
            for collapsed in absorbed {
                remap.remap(collapsed.clone(), id.clone())?;
                grandchildren = children.remove(&collapsed).unwrap_or_default();
                debug!(
                    survivor = %id,
                    collapsed = %collapsed,
                    name = %parent.name,
                    "Collapsed same-name wrapper"
                );
            }
            children.insert(id.clone(), grandchildren);
        }
    }
    Ok(())
}
