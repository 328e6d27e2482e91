//! # Runs and the Execution Engine Seam
//!
//! The execution engine is an external collaborator. This module defines the narrow
//! surface the analysis core reads from it:
//!
//! - [`FlowExecution`]: current heads plus node lookup, enough for a reverse-reachable
//!   enumeration of the DAG
//! - [`PipelineRun`]: run identity, run-level timing/result facts, and the execution (absent
//!   when nothing has started yet, e.g. a syntax error before the first node)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::node::{ExecutionNode, NodeId};
use crate::status::Status;

/// Identity of one run, used as the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Result code reported by the engine, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl RunResult {
    /// Status vocabulary equivalent of an engine result
    pub fn to_status(self) -> Status {
        match self {
            Self::Success => Status::Success,
            Self::Unstable => Status::Unstable,
            Self::Failure => Status::Failure,
            Self::NotBuilt => Status::NotExecuted,
            Self::Aborted => Status::Aborted,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Unstable => write!(f, "UNSTABLE"),
            Self::Failure => write!(f, "FAILURE"),
            Self::NotBuilt => write!(f, "NOT_BUILT"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Run-level facts at the moment of the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub start_time_millis: i64,
    /// Total run duration, known once the run completed
    pub duration_millis: Option<i64>,
    pub building: bool,
    pub complete: bool,
    /// Final result code, known once the run completed
    pub result: Option<RunResult>,
}

impl RunInfo {
    pub fn running(start_time_millis: i64) -> Self {
        Self {
            start_time_millis,
            duration_millis: None,
            building: true,
            complete: false,
            result: None,
        }
    }

    pub fn finished(start_time_millis: i64, duration_millis: i64, result: RunResult) -> Self {
        Self {
            start_time_millis,
            duration_millis: Some(duration_millis),
            building: false,
            complete: true,
            result: Some(result),
        }
    }

    /// End of the run on the wall clock, when known
    pub fn end_time_millis(&self) -> Option<i64> {
        self.duration_millis.map(|d| self.start_time_millis + d)
    }
}

/// Read access to the execution DAG of one run
pub trait FlowExecution: Send + Sync {
    /// Nodes nothing else points at yet; several while parallel branches are live
    fn heads(&self) -> Vec<NodeId>;

    /// Look up a node by id
    fn node(&self, id: &NodeId) -> Option<ExecutionNode>;
}

/// A run as seen by the analysis core
pub trait PipelineRun: Send + Sync {
    fn run_id(&self) -> RunId;

    fn info(&self) -> RunInfo;

    /// Absent when no execution started
    fn execution(&self) -> Option<Arc<dyn FlowExecution>>;
}
