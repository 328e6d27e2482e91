use thiserror::Error;

use crate::models::{NodeId, RunId};

/// Errors raised while snapshotting, analysing or serving a run's execution graph
///
/// `Clone` so a single failed computation can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node {node_id} belongs to run {actual}, expected run {expected}")]
    ForeignNode {
        node_id: NodeId,
        expected: RunId,
        actual: RunId,
    },

    #[error("Node {referenced_by} references node {node_id}, which is not part of the execution")]
    MissingNode {
        node_id: NodeId,
        referenced_by: NodeId,
    },

    #[error("Block started at node {start_id} has no matching end node in a completed run")]
    MissingBlockEnd { start_id: NodeId },

    #[error("Remap chain starting at node {node_id} does not terminate")]
    RemapCycle { node_id: NodeId },

    #[error("Graph computation for run {run_id} failed: {reason}")]
    ComputationFailed { run_id: RunId, reason: String },

    #[error("Timed out after {waited_ms}ms waiting for the graph of run {run_id}")]
    Timeout { run_id: RunId, waited_ms: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GraphError {
    /// Whether a caller may simply ask again and expect a fresh computation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ComputationFailed { .. })
    }
}

impl From<crate::config::ConfigurationError> for GraphError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
