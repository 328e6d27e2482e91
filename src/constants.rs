//! # System Constants
//!
//! Step function names the engine records, display names for synthesized nodes, and the
//! environment variables the ambient stack reads.

/// Step function names with structural meaning
pub mod functions {
    pub const STAGE: &str = "stage";
    pub const PARALLEL: &str = "parallel";
    pub const INPUT: &str = "input";
}

/// Names given to nodes the analysis synthesizes or that carry no label
pub mod display_names {
    /// Pseudo-stage / pseudo-step standing for an uncaught exception
    pub const UNHANDLED_EXCEPTION: &str = "Unhandled exception";

    /// Parallel wrapper without a label of its own
    pub const PARALLEL: &str = "Parallel";

    pub const PIPELINE_START: &str = "Start of Pipeline";
}

/// Environment variables read by config loading and logging
pub mod env {
    pub const ENVIRONMENT: &str = "PIPELINE_GRAPH_ENV";
    pub const CONFIG_PATH: &str = "PIPELINE_GRAPH_CONFIG_PATH";
    pub const LOG_FORMAT: &str = "PIPELINE_GRAPH_LOG_FORMAT";
    /// Prefix for `PIPELINE_GRAPH__SECTION__KEY` overrides
    pub const CONFIG_PREFIX: &str = "PIPELINE_GRAPH";
}

/// System-wide limits
pub mod system {
    /// Upper bound on links followed while resolving a remap chain
    pub const MAX_REMAP_CHAIN: usize = 10_000;

    pub const DEFAULT_CACHE_WAIT_TIMEOUT_MS: u64 = 30_000;
}
