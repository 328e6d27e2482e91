use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::NodeId;
use crate::status::{Status, TimingInfo};

/// What a tree node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Stage,
    Parallel,
    ParallelBranch,
    Step,
    /// Body-taking step that is not a stage, e.g. `node` or the outer level of a stage
    StepsBlock,
    UnhandledException,
    PipelineStart,
}

impl NodeType {
    /// Types published in the stage tree
    pub fn is_stage_like(self) -> bool {
        matches!(self, Self::Stage | Self::Parallel | Self::ParallelBranch)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "STAGE"),
            Self::Parallel => write!(f, "PARALLEL"),
            Self::ParallelBranch => write!(f, "PARALLEL_BRANCH"),
            Self::Step => write!(f, "STEP"),
            Self::StepsBlock => write!(f, "STEPS_BLOCK"),
            Self::UnhandledException => write!(f, "UNHANDLED_EXCEPTION"),
            Self::PipelineStart => write!(f, "PIPELINE_START"),
        }
    }
}

/// A node of the stage tree or a step, with its resolved status and timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrappedNode {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub status: Status,
    pub timing: TimingInfo,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Not backed by a node the engine recorded
    pub synthetic: bool,
    /// Stands in for a stage that never ran
    pub placeholder: bool,
    pub error_message: Option<String>,
}

impl WrappedNode {
    pub fn is_stage_like(&self) -> bool {
        self.node_type.is_stage_like()
    }
}
