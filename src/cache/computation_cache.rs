//! # Single-Flight Computation Cache
//!
//! Coalesces concurrent requests for the same run into one computation. The first caller
//! starts the computation on the blocking pool; callers arriving while it runs await the
//! same shared future. The entry is removed before any waiter observes the result, so the
//! next request always recomputes from fresh run state.
//!
//! A caller that stops waiting (timeout) evicts the entry it joined so a retry starts a new
//! computation instead of queueing behind a stuck one. The abandoned computation still runs
//! to completion but its late removal cannot touch a newer entry: every entry carries a
//! generation number and removal only happens when the generation matches.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{GraphError, Result};
use crate::logging::log_cache_operation;
use crate::models::RunId;

type SharedComputation<V> = Shared<BoxFuture<'static, Result<Arc<V>>>>;

struct InFlight<V> {
    generation: u64,
    computation: SharedComputation<V>,
}

pub struct ComputationCache<V> {
    in_flight: Arc<DashMap<RunId, InFlight<V>>>,
    next_generation: AtomicU64,
    wait_timeout: Duration,
}

impl<V> ComputationCache<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            wait_timeout,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Number of computations currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, run_id: &RunId) -> bool {
        self.in_flight.contains_key(run_id)
    }

    /// Result for `run_id`, joining a running computation or starting `compute`
    ///
    /// `compute` is only called when no computation for `run_id` is in flight.
    #[instrument(skip(self, compute), fields(run_id = %run_id))]
    pub async fn get_or_compute<F>(&self, run_id: RunId, compute: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V> + Send + 'static,
    {
        let (generation, computation, started) = match self.in_flight.entry(run_id.clone()) {
            Entry::Occupied(entry) => {
                let entry = entry.get();
                (entry.generation, entry.computation.clone(), false)
            }
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                let computation =
                    Self::start(Arc::clone(&self.in_flight), run_id.clone(), generation, compute);
                entry.insert(InFlight {
                    generation,
                    computation: computation.clone(),
                });
                (generation, computation, true)
            }
        };

        if started {
            log_cache_operation("start", run_id.as_str(), self.in_flight.len(), None);
            Self::drive(run_id.clone(), generation, computation.clone());
        } else {
            log_cache_operation("join", run_id.as_str(), self.in_flight.len(), None);
        }

        match tokio::time::timeout(self.wait_timeout, computation).await {
            Ok(result) => result,
            Err(_) => {
                self.evict(&run_id, generation);
                let waited_ms = u64::try_from(self.wait_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    run_id = %run_id,
                    waited_ms = waited_ms,
                    "Gave up waiting on in-flight computation, entry evicted"
                );
                Err(GraphError::Timeout { run_id, waited_ms })
            }
        }
    }

    fn start<F>(
        in_flight: Arc<DashMap<RunId, InFlight<V>>>,
        run_id: RunId,
        generation: u64,
        compute: F,
    ) -> SharedComputation<V>
    where
        F: FnOnce() -> Result<V> + Send + 'static,
    {
        async move {
            let result = match tokio::task::spawn_blocking(compute).await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(error)) => Err(error),
                Err(join_error) => Err(GraphError::ComputationFailed {
                    run_id: run_id.clone(),
                    reason: join_error.to_string(),
                }),
            };
            let removed = in_flight
                .remove_if(&run_id, |_, entry| entry.generation == generation)
                .is_some();
            debug!(
                run_id = %run_id,
                generation = generation,
                succeeded = result.is_ok(),
                removed = removed,
                "In-flight computation settled"
            );
            result
        }
        .boxed()
        .shared()
    }

    /// Poll the computation to completion even if every caller stops waiting
    fn drive(run_id: RunId, generation: u64, computation: SharedComputation<V>) {
        tokio::spawn(async move {
            if computation.await.is_err() {
                debug!(run_id = %run_id, generation = generation, "Abandoned computation failed");
            }
        });
    }

    fn evict(&self, run_id: &RunId, generation: u64) {
        self.in_flight
            .remove_if(run_id, |_, entry| entry.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_settled_entry_is_removed() {
        let cache: ComputationCache<u32> = ComputationCache::new(Duration::from_secs(5));
        let run_id = RunId::from("job#1");

        let value = cache.get_or_compute(run_id.clone(), || Ok(7)).await.unwrap();
        assert_eq!(*value, 7);
        assert!(!cache.is_in_flight(&run_id));
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_reaches_caller_and_clears_entry() {
        let cache: ComputationCache<u32> = ComputationCache::new(Duration::from_secs(5));
        let run_id = RunId::from("job#1");
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let error = cache
            .get_or_compute(run_id.clone(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::MissingBlockEnd {
                    start_id: "3".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(error, GraphError::MissingBlockEnd { .. }));
        assert!(!cache.is_in_flight(&run_id));

        let counter = Arc::clone(&calls);
        let value = cache
            .get_or_compute(run_id, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(*value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_computation_becomes_error() {
        let cache: ComputationCache<u32> = ComputationCache::new(Duration::from_secs(5));
        let error = cache
            .get_or_compute(RunId::from("job#1"), || panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(error, GraphError::ComputationFailed { .. }));
    }
}
