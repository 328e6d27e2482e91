//! # Execution Nodes
//!
//! Raw execution events recorded by the workflow engine. A run's nodes form a DAG whose
//! edges point from a node to the node(s) that ran immediately before it; join points
//! (the end of a parallel block) carry one parent per branch.
//!
//! Nodes are immutable and append-only: once the engine has written a node it never
//! changes, so every analysis in this crate can work from a momentary snapshot.
//!
//! ## Node shapes
//!
//! ```text
//! FlowStart ─ stage(outer) ─ stage(body, Label::Stage) ─ sh ─ end(body) ─ end(outer) ─ FlowEnd
//!
//! parallel ─┬─ branch A (Label::Branch) ─ ... ─ end(A) ─┬─ end(parallel)
//!           └─ branch B (Label::Branch) ─ ... ─ end(B) ─┘
//! ```
//!
//! A block-scoped stage nests two block levels: the outer `stage` step start and the body
//! start that carries the stage label. Legacy marker-scoped stages are a single atomic
//! node carrying the stage label and no matching end.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::run::{RunId, RunResult};

/// Identifier of an execution node, unique and increasing within a run
///
/// Ids are strings; two decimal ids compare numerically so that `"10"` sorts after `"9"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Structural kind of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Execution root
    FlowStart,
    /// Terminal node of a finished execution
    FlowEnd { start: NodeId },
    /// Opens a block (stage, parallel, branch, or any body-taking step)
    BlockStart,
    /// Closes the block opened by `start`
    BlockEnd { start: NodeId },
    /// A step without a body
    AtomicStep,
}

impl NodeKind {
    /// Whether this node closes a block or the whole flow
    pub fn is_end(&self) -> bool {
        matches!(self, Self::FlowEnd { .. } | Self::BlockEnd { .. })
    }

    /// The start node an end node closes
    pub fn start_of(&self) -> Option<&NodeId> {
        match self {
            Self::FlowEnd { start } | Self::BlockEnd { start } => Some(start),
            _ => None,
        }
    }
}

/// Error recorded on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// Result carried by a structured intentional interruption (abort, timeout)
    pub interruption: Option<RunResult>,
    /// Node that originally threw, when the error propagated outward
    pub origin: Option<NodeId>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            interruption: None,
            origin: None,
        }
    }

    pub fn interrupted(message: impl Into<String>, result: RunResult) -> Self {
        Self {
            message: message.into(),
            interruption: Some(result),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<NodeId>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_intentional_interruption(&self) -> bool {
        self.interruption.is_some()
    }
}

/// Why a node is paused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseCause {
    /// Waiting for a human to answer an input prompt
    Input,
    Other(String),
}

/// A pause interval recorded on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub cause: PauseCause,
    pub started_millis: i64,
    /// Absent while the node is still paused
    pub ended_millis: Option<i64>,
}

impl PauseInfo {
    pub fn is_active(&self) -> bool {
        self.ended_millis.is_none()
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.is_active() && self.cause == PauseCause::Input
    }

    /// Length of the pause, measuring an open pause up to `now_millis`
    pub fn duration_millis(&self, now_millis: i64) -> i64 {
        let end = self.ended_millis.unwrap_or(now_millis);
        (end - self.started_millis).max(0)
    }
}

/// Executor queue state of a node waiting for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Queued,
    Cancelled,
    Launched,
}

/// Human-meaningful label attached to a stage or branch start
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Stage(String),
    Branch(String),
}

impl Label {
    pub fn name(&self) -> &str {
        match self {
            Self::Stage(name) | Self::Branch(name) => name,
        }
    }
}

/// Reason a stage body never ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSkip {
    Conditional,
    Failure,
    Unstable,
    Restart,
}

/// Non-fatal warning recorded by a step (e.g. `unstable`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningInfo {
    pub result: RunResult,
    pub message: Option<String>,
}

/// One recorded event of a run's execution DAG
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub id: NodeId,
    pub run_id: RunId,
    pub kind: NodeKind,
    pub parents: Vec<NodeId>,
    pub timestamp_millis: i64,
    /// Step function that produced the node, e.g. `stage`, `parallel`, `sh`
    pub function_name: Option<String>,
    pub display_name: Option<String>,
    pub error: Option<ErrorInfo>,
    pub pause: Vec<PauseInfo>,
    pub queue_state: Option<QueueState>,
    pub label: Option<Label>,
    pub warning: Option<WarningInfo>,
    pub not_executed: bool,
    pub stage_skip: Option<StageSkip>,
    /// Enclosing block starts, innermost first
    pub enclosing: Vec<NodeId>,
}

impl ExecutionNode {
    pub fn new(
        id: impl Into<NodeId>,
        run_id: RunId,
        kind: NodeKind,
        timestamp_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            run_id,
            kind,
            parents: Vec::new(),
            timestamp_millis,
            function_name: None,
            display_name: None,
            error: None,
            pause: Vec::new(),
            queue_state: None,
            label: None,
            warning: None,
            not_executed: false,
            stage_skip: None,
            enclosing: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<NodeId>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_function(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_enclosing(mut self, enclosing: Vec<NodeId>) -> Self {
        self.enclosing = enclosing;
        self
    }

    /// Innermost enclosing block start
    pub fn enclosing_block(&self) -> Option<&NodeId> {
        self.enclosing.first()
    }

    /// Whether `block` is one of this node's enclosing blocks
    pub fn is_enclosed_by(&self, block: &NodeId) -> bool {
        self.enclosing.iter().any(|id| id == block)
    }

    /// Name shown to humans: the label, else the display name, else the step function
    pub fn name(&self) -> &str {
        self.label
            .as_ref()
            .map(Label::name)
            .or(self.display_name.as_deref())
            .or(self.function_name.as_deref())
            .unwrap_or("")
    }

    pub fn is_paused_for_input(&self) -> bool {
        self.pause.iter().any(PauseInfo::is_waiting_for_input)
    }

    /// Total pause recorded on this node up to `now_millis`
    pub fn pause_millis(&self, now_millis: i64) -> i64 {
        self.pause.iter().map(|p| p.duration_millis(now_millis)).sum()
    }
}
