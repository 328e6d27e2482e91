//! # Stage Tree
//!
//! Builds the consumer-facing tree from a flow graph snapshot: wrapped nodes with resolved
//! status and timing, normalization of redundant wrappers, step assignment, and the
//! serializable views derived from the result.

pub mod builder;
pub mod remap;
pub mod steps;
pub mod views;
pub mod wrapped_node;

pub use builder::{build_graph, BuildOptions, GraphBuilder, PipelineGraph};
pub use remap::RemapTable;
pub use steps::{ExceptionPlacement, StepAssigner, StepMap};
pub use views::{GraphView, RunViews, StageView, StepView, StepsView};
pub use wrapped_node::{NodeType, WrappedNode};
