//! # Step Assignment
//!
//! Maps every published atomic step to the stage, parallel branch or wrapper that owns it.
//!
//! A step belongs to its nearest stage-like ancestor. Steps recorded after a legacy marker
//! stage are not enclosed by it, so the marker's chunk decides ownership instead. Owners
//! collapsed away during normalization hand their steps to the surviving node through the
//! [`RemapTable`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use super::remap::RemapTable;
use super::wrapped_node::{NodeType, WrappedNode};
use crate::analysis::{Chunk, RelationshipMap};
use crate::constants::display_names;
use crate::error::Result;
use crate::models::{FlowGraph, NodeId, NodeRole};

/// Stage id to the steps it owns, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepMap {
    steps: BTreeMap<NodeId, Vec<WrappedNode>>,
}

impl StepMap {
    /// Steps owned by `stage`; empty for unknown ids
    pub fn steps_for(&self, stage: &NodeId) -> &[WrappedNode] {
        self.steps.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_stage(&self, stage: &NodeId) -> bool {
        self.steps.contains_key(stage)
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.steps.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Vec<WrappedNode>)> {
        self.steps.iter()
    }

    /// Every step across all stages
    pub fn all_steps(&self) -> impl Iterator<Item = &WrappedNode> {
        self.steps.values().flatten()
    }

    pub fn step_count(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }
}

/// Outcome of assigning an unhandled exception
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionPlacement {
    /// Attached as the last step of an existing stage
    Attached(NodeId),
    /// Needs a synthetic top-level pseudo-stage
    PseudoStage(WrappedNode),
}

pub struct StepAssigner<'a> {
    wrapped: &'a BTreeMap<NodeId, WrappedNode>,
    /// (marker, chunk) for every legacy marker stage
    markers: Vec<(NodeId, Chunk)>,
}

impl<'a> StepAssigner<'a> {
    pub fn new(
        graph: &'a FlowGraph,
        wrapped: &'a BTreeMap<NodeId, WrappedNode>,
        relationships: &RelationshipMap,
    ) -> Self {
        let markers = graph
            .nodes()
            .iter()
            .filter(|n| n.role == NodeRole::LegacyStage)
            .filter_map(|n| {
                relationships
                    .get(n.id())
                    .map(|r| (n.id().clone(), r.chunk_for(n.id()).clone()))
            })
            .collect();
        Self { wrapped, markers }
    }

    /// Assign steps to the published `stages`
    pub fn assign(
        &self,
        stages: &BTreeSet<NodeId>,
        dropped: &HashSet<NodeId>,
        remap: &mut RemapTable,
    ) -> Result<(StepMap, Option<ExceptionPlacement>)> {
        let mut steps: BTreeMap<NodeId, Vec<WrappedNode>> = stages
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();

        for step in self.wrapped.values() {
            if step.node_type != NodeType::Step || dropped.contains(&step.id) {
                continue;
            }
            let Some(owner) = self.owner_of(step) else {
                debug!(step_id = %step.id, "Step outside every stage, not published");
                continue;
            };
            let owner = remap.find(&owner)?;
            match steps.get_mut(&owner) {
                Some(owned) => {
                    let mut step = step.clone();
                    step.parent = Some(owner);
                    step.children.clear();
                    owned.push(step);
                }
                None => debug!(step_id = %step.id, owner = %owner, "Step owner not published"),
            }
        }

        let placement = match self.unhandled_exception() {
            Some(exception) => Some(self.place_exception(exception, &mut steps, remap)?),
            None => None,
        };

        Ok((StepMap { steps }, placement))
    }

    fn unhandled_exception(&self) -> Option<&WrappedNode> {
        self.wrapped
            .values()
            .find(|n| n.node_type == NodeType::UnhandledException)
    }

    fn place_exception(
        &self,
        exception: &WrappedNode,
        steps: &mut BTreeMap<NodeId, Vec<WrappedNode>>,
        remap: &mut RemapTable,
    ) -> Result<ExceptionPlacement> {
        let owner = match &exception.parent {
            Some(parent) => Some(remap.find(parent)?),
            None => None,
        };
        if let Some(owner) = owner {
            if let Some(owned) = steps.get_mut(&owner) {
                let mut step = exception.clone();
                step.parent = Some(owner.clone());
                owned.push(step);
                return Ok(ExceptionPlacement::Attached(owner));
            }
        }

        let mut stage = exception.clone();
        stage.parent = None;
        stage.name = display_names::UNHANDLED_EXCEPTION.to_string();
        let mut step = exception.clone();
        step.parent = Some(stage.id.clone());
        steps.insert(stage.id.clone(), vec![step]);
        Ok(ExceptionPlacement::PseudoStage(stage))
    }

    /// Nearest stage-like ancestor, or the marker stage whose chunk covers the step
    fn owner_of(&self, step: &WrappedNode) -> Option<NodeId> {
        let enclosing = self.enclosing_stage(step);
        let marker = self
            .markers
            .iter()
            .filter(|(_, chunk)| chunk.first < step.id && step.id <= chunk.last)
            .map(|(marker, _)| marker)
            .max()
            .cloned();
        match (enclosing, marker) {
            (Some(enclosing), Some(marker)) => Some(enclosing.max(marker)),
            (enclosing, marker) => enclosing.or(marker),
        }
    }

    fn enclosing_stage(&self, step: &WrappedNode) -> Option<NodeId> {
        let mut parent = step.parent.as_ref();
        while let Some(id) = parent {
            let node = self.wrapped.get(id)?;
            if node.is_stage_like() {
                return Some(id.clone());
            }
            parent = node.parent.as_ref();
        }
        None
    }
}
