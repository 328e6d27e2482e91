#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Graph
//!
//! Analysis core that turns the raw execution history of a multi-stage workflow run into a
//! human-meaningful tree of stages, parallel branches and steps, each with a computed
//! status and timing.
//!
//! ## Overview
//!
//! The execution engine records a run as a DAG of nodes, appending while the run is live.
//! This crate reads a momentary snapshot of that DAG and derives a deterministic,
//! cache-friendly tree from it. It handles in-progress, queued and paused runs, skipped
//! stages, nested and parallel blocks, and uncaught exceptions.
//!
//! ## Pipeline
//!
//! ```text
//! FlowGraph snapshot
//!   -> chunk finding        (analysis::chunk_finder)
//!   -> relationships        (analysis::relationships)
//!   -> status + timing      (status)
//!   -> tree building        (graph::builder)
//!   -> step assignment      (graph::steps)
//!   -> consumer views       (graph::views)
//! ```
//!
//! all behind a per-run single-flight cache ([`cache`]).
//!
//! ## Module Organization
//!
//! - [`models`] - Execution nodes, runs, the engine seam and the immutable snapshot
//! - [`analysis`] - Chunk boundaries and node relationships
//! - [`status`] - Status vocabulary, version coercion, status and timing calculators
//! - [`graph`] - Stage tree construction, step assignment and consumer views
//! - [`cache`] - Single-flight computation cache and the graph service
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use pipeline_graph::graph::{build_graph, BuildOptions, GraphView};
//! use pipeline_graph::models::{RunBuilder, RunResult};
//! use pipeline_graph::status::Status;
//!
//! let mut builder = RunBuilder::new("demo#1", 0);
//! builder.stage("Build", |b| {
//!     b.step("sh", 2_000);
//! });
//! let run = builder.finish(RunResult::Success);
//!
//! let graph = build_graph(&run, 0, BuildOptions::default()).unwrap();
//! let view = GraphView::current(&graph);
//! assert_eq!(view.stages[0].name, "Build");
//! assert_eq!(view.stages[0].status, Status::Success);
//! ```

pub mod analysis;
pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod logging;
pub mod models;
pub mod status;

pub use cache::{ComputationCache, PipelineGraphService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigManager, GraphConfig};
pub use error::{GraphError, Result};
pub use graph::{
    build_graph, BuildOptions, GraphView, NodeType, PipelineGraph, RunViews, StepsView, WrappedNode,
};
pub use models::{ExecutionNode, FlowGraph, NodeId, PipelineRun, RunId, RunResult};
pub use status::{Status, StatusApiVersion, TimingInfo};
