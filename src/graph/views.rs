//! # Consumer Views
//!
//! Serializable shapes handed to the rendering layer. The current shape mirrors the
//! [`PipelineGraph`] one to one. The legacy shape is derived from the same graph for older
//! consumers: statuses are coerced into the requested [`StatusApiVersion`] and parallel
//! wrappers are dissolved, their branches hoisted into the wrapper's parent. A top-level
//! wrapper that owns steps has nowhere to hand them and is kept. Leaf steps are the same in
//! both shapes.

use serde::Serialize;
use std::collections::BTreeMap;

use super::builder::PipelineGraph;
use super::wrapped_node::{NodeType, WrappedNode};
use crate::models::NodeId;
use crate::status::{Status, StatusApiVersion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: Status,
    pub start_time_millis: i64,
    pub total_duration_millis: i64,
    pub pause_duration_millis: i64,
    pub synthetic: bool,
    pub placeholder: bool,
    pub children: Vec<StageView>,
}

impl StageView {
    fn from_node(node: &WrappedNode, version: StatusApiVersion, children: Vec<StageView>) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            status: node.status.coerce_for(version),
            start_time_millis: node.timing.start_time_millis,
            total_duration_millis: node.timing.total_duration_millis,
            pause_duration_millis: node.timing.pause_duration_millis,
            synthetic: node.synthetic,
            placeholder: node.placeholder,
            children,
        }
    }

    /// This stage and every stage below it, depth first
    pub fn flatten(&self) -> Vec<&StageView> {
        let mut all = vec![self];
        for child in &self.children {
            all.extend(child.flatten());
        }
        all
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: Status,
    pub start_time_millis: i64,
    pub total_duration_millis: i64,
    pub pause_duration_millis: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepView {
    fn from_node(node: &WrappedNode, version: StatusApiVersion) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
            status: node.status.coerce_for(version),
            start_time_millis: node.timing.start_time_millis,
            total_duration_millis: node.timing.total_duration_millis,
            pause_duration_millis: node.timing.pause_duration_millis,
            error_message: node.error_message.clone(),
        }
    }
}

/// Stage tree of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub complete: bool,
    pub stages: Vec<StageView>,
}

impl GraphView {
    pub fn current(graph: &PipelineGraph) -> Self {
        Self {
            complete: graph.is_complete(),
            stages: stage_views(graph, graph.root_stages(), StatusApiVersion::CURRENT, false),
        }
    }

    pub fn legacy(graph: &PipelineGraph, version: StatusApiVersion) -> Self {
        Self {
            complete: graph.is_complete(),
            stages: stage_views(graph, graph.root_stages(), version, true),
        }
    }

    /// Every stage in the tree, depth first
    pub fn all_stages(&self) -> Vec<&StageView> {
        self.stages.iter().flat_map(StageView::flatten).collect()
    }
}

fn stage_views<'a>(
    graph: &'a PipelineGraph,
    nodes: impl Iterator<Item = &'a WrappedNode>,
    version: StatusApiVersion,
    dissolve_wrappers: bool,
) -> Vec<StageView> {
    let mut views = Vec::new();
    for node in nodes {
        let children = stage_views(graph, graph.children_of(node), version, dissolve_wrappers);
        if dissolve_wrappers && dissolves(graph, node) {
            views.extend(children);
        } else {
            views.push(StageView::from_node(node, version, children));
        }
    }
    views
}

/// Steps of a run keyed by owning stage id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepsView {
    pub steps: BTreeMap<NodeId, Vec<StepView>>,
}

impl StepsView {
    pub fn current(graph: &PipelineGraph) -> Self {
        let steps = graph
            .steps_by_stage()
            .iter()
            .map(|(stage, steps)| (stage.clone(), step_views(steps, StatusApiVersion::CURRENT)))
            .collect();
        Self { steps }
    }

    /// Steps owned by dissolved parallel wrappers move to the wrapper's parent stage
    pub fn legacy(graph: &PipelineGraph, version: StatusApiVersion) -> Self {
        let mut steps: BTreeMap<NodeId, Vec<StepView>> = BTreeMap::new();
        for (stage_id, owned) in graph.steps_by_stage().iter() {
            let Some(owner) = legacy_owner(graph, stage_id) else {
                continue;
            };
            steps
                .entry(owner)
                .or_default()
                .extend(step_views(owned, version));
        }
        for owned in steps.values_mut() {
            owned.sort_by(|a, b| a.id.cmp(&b.id));
        }
        Self { steps }
    }

    pub fn steps_for(&self, stage: &NodeId) -> &[StepView] {
        self.steps.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Stage tree and step map taken from the same graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunViews {
    pub graph: GraphView,
    pub steps: StepsView,
}

impl RunViews {
    pub fn current(graph: &PipelineGraph) -> Self {
        Self {
            graph: GraphView::current(graph),
            steps: StepsView::current(graph),
        }
    }

    pub fn legacy(graph: &PipelineGraph, version: StatusApiVersion) -> Self {
        Self {
            graph: GraphView::legacy(graph, version),
            steps: StepsView::legacy(graph, version),
        }
    }
}

fn step_views(steps: &[WrappedNode], version: StatusApiVersion) -> Vec<StepView> {
    steps.iter().map(|s| StepView::from_node(s, version)).collect()
}

/// Whether the legacy shape dissolves `node` into its parent
fn dissolves(graph: &PipelineGraph, node: &WrappedNode) -> bool {
    node.node_type == NodeType::Parallel
        && (node.parent.is_some() || graph.steps_for(&node.id).is_empty())
}

/// Stage that owns `stage_id`'s steps once wrappers are dissolved
fn legacy_owner(graph: &PipelineGraph, stage_id: &NodeId) -> Option<NodeId> {
    let mut current = graph.stage(stage_id)?;
    while dissolves(graph, current) {
        current = graph.stage(current.parent.as_ref()?)?;
    }
    Some(current.id.clone())
}
