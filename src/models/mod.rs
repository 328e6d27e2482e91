pub mod graph;
pub mod in_memory;
pub mod node;
pub mod run;

// Re-export core models for easy access
pub use graph::{FlowGraph, GraphNode, NodeRole};
pub use in_memory::{InMemoryExecution, InMemoryRun, RunBuilder};
pub use node::{
    ErrorInfo, ExecutionNode, Label, NodeId, NodeKind, PauseCause, PauseInfo, QueueState,
    StageSkip, WarningInfo,
};
pub use run::{FlowExecution, PipelineRun, RunId, RunInfo, RunResult};
