//! Pool de workers pour la classification des batches
//!
//! `submit` ne bloque jamais: les batches au-delà de la capacité attendent dans
//! la file du pool rayon. `await_all` est la seule barrière.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{trace, warn};

use crate::aggregate::ResultAggregator;
use crate::classify::classify;
use crate::error::{ClassificationTaskError, ResolutionError};
use crate::regions::ContainmentIndex;
use crate::types::Batch;

/// Suivi des tâches en vol et des échecs
#[derive(Debug, Default)]
struct TaskTracker {
    pending: Mutex<usize>,
    idle: Condvar,
    failures: Mutex<Vec<ClassificationTaskError>>,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl TaskTracker {
    fn start(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending -= 1;
        self.completed.fetch_add(1, Ordering::Relaxed);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn fail(&self, error: ClassificationTaskError) {
        warn!(batch = error.batch(), "Classification task failed: {}", error);
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Décrémente le compteur même si la tâche se termine anormalement
struct CompletionGuard(Arc<TaskTracker>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Nombre fixe de threads classifiant des batches en parallèle
pub struct WorkerPool {
    pool: ThreadPool,
    index: Arc<dyn ContainmentIndex>,
    aggregator: Arc<ResultAggregator>,
    tracker: Arc<TaskTracker>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        index: Arc<dyn ContainmentIndex>,
        aggregator: Arc<ResultAggregator>,
    ) -> Result<Self, ResolutionError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("county-worker-{}", i))
            // Les paniques de classification sont capturées dans la tâche;
            // sans handler, une panique résiduelle ferait avorter le process
            .panic_handler(|payload| {
                warn!("Worker panicked outside classification: {}", panic_message(payload.as_ref()))
            })
            .build()
            .map_err(|e| ResolutionError::WorkerPool(format!("Failed to create thread pool: {}", e)))?;

        Ok(Self {
            pool,
            index,
            aggregator,
            tracker: Arc::new(TaskTracker::default()),
            worker_count,
        })
    }

    /// Soumet un batch; le résultat est fusionné dans l'agrégateur par le worker
    pub fn submit(&self, batch: Batch) {
        self.tracker.start();

        let index = Arc::clone(&self.index);
        let aggregator = Arc::clone(&self.aggregator);
        let tracker = Arc::clone(&self.tracker);

        self.pool.spawn(move || {
            let _guard = CompletionGuard(Arc::clone(&tracker));
            let sequence = batch.sequence;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| classify(&batch, index.as_ref())));
            match outcome {
                Ok(Ok(partial)) => {
                    trace!(batch = sequence, regions = partial.len(), "Batch classified");
                    aggregator.merge(partial);
                }
                Ok(Err(error)) => tracker.fail(error),
                Err(payload) => tracker.fail(ClassificationTaskError::Panicked {
                    batch: sequence,
                    message: panic_message(payload.as_ref()),
                }),
            }
        });
    }

    /// Attend la fin de toutes les tâches soumises et retourne les échecs
    pub fn await_all(&self) -> Vec<ClassificationTaskError> {
        self.tracker.wait_idle();
        let mut failures = std::mem::take(
            &mut *self
                .tracker
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        failures.sort_by_key(|f| f.batch());
        failures
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn submitted(&self) -> u64 {
        self.tracker.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.tracker.completed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("submitted", &self.submitted())
            .field("completed", &self.completed())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::{square, BruteForceIndex, Region, RegionSet};
    use crate::types::Point;
    use geo::coord;

    fn index() -> Arc<dyn ContainmentIndex> {
        let set = RegionSet::from_regions(vec![Region::new("A", square(0.0, 0.0, 1.0))]).unwrap();
        Arc::new(BruteForceIndex::new(Arc::new(set)))
    }

    fn batch(sequence: u64, points: Vec<Point>) -> Batch {
        Batch { sequence, points }
    }

    /// Index qui panique sur un point précis
    struct PanickingIndex;

    impl ContainmentIndex for PanickingIndex {
        fn region_count(&self) -> usize {
            1
        }

        fn region_id(&self, _position: usize) -> &str {
            "A"
        }

        fn containing(&self, point: Point, hits: &mut Vec<usize>) {
            if point.x < 0.0 {
                panic!("corrupted geometry");
            }
            hits.push(0);
        }
    }

    #[test]
    fn test_submit_and_await() {
        let aggregator = Arc::new(ResultAggregator::new());
        let pool = WorkerPool::new(4, index(), Arc::clone(&aggregator)).unwrap();

        for seq in 0..50 {
            pool.submit(batch(seq, vec![coord! { x: 0.5, y: 0.5 }, coord! { x: 5.0, y: 5.0 }]));
        }
        let failures = pool.await_all();

        assert!(failures.is_empty());
        assert_eq!(pool.submitted(), 50);
        assert_eq!(pool.completed(), 50);
        assert_eq!(aggregator.finalize()["A"], 50);
    }

    #[test]
    fn test_await_without_tasks() {
        let pool = WorkerPool::new(2, index(), Arc::new(ResultAggregator::new())).unwrap();
        assert!(pool.await_all().is_empty());
    }

    #[test]
    fn test_failed_task_isolated() {
        let aggregator = Arc::new(ResultAggregator::new());
        let pool = WorkerPool::new(2, index(), Arc::clone(&aggregator)).unwrap();

        pool.submit(batch(0, vec![coord! { x: 0.5, y: 0.5 }]));
        pool.submit(batch(1, vec![coord! { x: 0.5, y: 0.5 }, coord! { x: f64::INFINITY, y: 0.0 }]));
        pool.submit(batch(2, vec![coord! { x: 0.5, y: 0.5 }]));
        let failures = pool.await_all();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].batch(), 1);
        assert_eq!(aggregator.get("A"), 2);
    }

    #[test]
    fn test_panic_reported_not_hung() {
        let aggregator = Arc::new(ResultAggregator::new());
        let pool = WorkerPool::new(2, Arc::new(PanickingIndex), Arc::clone(&aggregator)).unwrap();

        pool.submit(batch(0, vec![coord! { x: 1.0, y: 1.0 }]));
        pool.submit(batch(1, vec![coord! { x: -1.0, y: 1.0 }]));
        let failures = pool.await_all();

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            ClassificationTaskError::Panicked { batch: 1, message } if message.contains("corrupted")
        ));
        assert_eq!(aggregator.get("A"), 1);
    }
}
