//! # Pipeline Graph Service
//!
//! Entry point for consumers: computes the [`PipelineGraph`] of a run through the
//! single-flight [`ComputationCache`] and derives the serializable views from it. The
//! service is an explicit value holding its configuration, clock and cache; there is no
//! process-wide state.

use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::computation_cache::ComputationCache;
use crate::clock::{Clock, SystemClock};
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::graph::{build_graph, BuildOptions, GraphView, PipelineGraph, RunViews, StepsView};
use crate::logging::log_graph_operation;
use crate::models::PipelineRun;

pub struct PipelineGraphService {
    config: GraphConfig,
    clock: Arc<dyn Clock>,
    cache: ComputationCache<PipelineGraph>,
}

impl PipelineGraphService {
    pub fn new(config: GraphConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GraphConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = ComputationCache::new(config.cache.wait_timeout());
        Self {
            config,
            clock,
            cache,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn cache(&self) -> &ComputationCache<PipelineGraph> {
        &self.cache
    }

    /// Graph of `run` as of now
    #[instrument(skip(self, run), fields(run_id = %run.run_id()))]
    pub async fn graph(&self, run: Arc<dyn PipelineRun>) -> Result<Arc<PipelineGraph>> {
        let run_id = run.run_id();
        let options = BuildOptions::from(&self.config.tree);
        let clock = Arc::clone(&self.clock);
        let started = Instant::now();

        let compute = move || {
            let run_id = run.run_id();
            let now = clock.now_millis();
            let result = build_graph(run.as_ref(), now, options);
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &result {
                Ok(graph) => log_graph_operation(
                    "build",
                    run_id.as_str(),
                    "ok",
                    Some(graph.stage_like_nodes().len()),
                    Some(elapsed),
                    None,
                ),
                Err(error) => {
                    let details = error.to_string();
                    log_graph_operation(
                        "build",
                        run_id.as_str(),
                        "error",
                        None,
                        Some(elapsed),
                        Some(&details),
                    )
                }
            }
            result
        };

        if self.config.cache.enabled {
            return self.cache.get_or_compute(run_id, compute).await;
        }

        let wait_timeout = self.config.cache.wait_timeout();
        match tokio::time::timeout(wait_timeout, tokio::task::spawn_blocking(compute)).await {
            Ok(Ok(result)) => result.map(Arc::new),
            Ok(Err(join_error)) => Err(GraphError::ComputationFailed {
                run_id,
                reason: join_error.to_string(),
            }),
            Err(_) => Err(GraphError::Timeout {
                run_id,
                waited_ms: self.config.cache.wait_timeout_ms,
            }),
        }
    }

    /// Current stage tree of `run`
    pub async fn graph_view(&self, run: Arc<dyn PipelineRun>) -> Result<GraphView> {
        let graph = self.graph(run).await?;
        Ok(GraphView::current(&graph))
    }

    /// Stage tree in the configured legacy status vocabulary, wrappers dissolved
    pub async fn legacy_graph_view(&self, run: Arc<dyn PipelineRun>) -> Result<GraphView> {
        let graph = self.graph(run).await?;
        Ok(GraphView::legacy(&graph, self.config.status.api_version))
    }

    pub async fn steps_view(&self, run: Arc<dyn PipelineRun>) -> Result<StepsView> {
        let graph = self.graph(run).await?;
        Ok(StepsView::current(&graph))
    }

    pub async fn legacy_steps_view(&self, run: Arc<dyn PipelineRun>) -> Result<StepsView> {
        let graph = self.graph(run).await?;
        Ok(StepsView::legacy(&graph, self.config.status.api_version))
    }

    /// Stage tree and step map of `run` from one computation
    ///
    /// Fetching the two views separately may observe two snapshots of a live run.
    pub async fn views(&self, run: Arc<dyn PipelineRun>) -> Result<RunViews> {
        let graph = self.graph(run).await?;
        Ok(RunViews::current(&graph))
    }

    pub async fn legacy_views(&self, run: Arc<dyn PipelineRun>) -> Result<RunViews> {
        let graph = self.graph(run).await?;
        Ok(RunViews::legacy(&graph, self.config.status.api_version))
    }
}
