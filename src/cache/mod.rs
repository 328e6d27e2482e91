//! # Computation Caching
//!
//! Per-run single-flight memoization and the service built on top of it.

pub mod computation_cache;
pub mod service;

pub use computation_cache::ComputationCache;
pub use service::PipelineGraphService;
