//! Bounded work pool for fetch units.
//!
//! At most `capacity` units run at once. Admission (`submit`) waits for a free
//! slot; `wait` is the join barrier and returns once every admitted unit has
//! finished or been skipped. A failing unit never affects its siblings.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::error::SyncError;

pub type UnitFuture<T> = BoxFuture<'static, Result<T, SyncError>>;

/// Called once per failed unit, after the pool has logged it.
pub type FailureHook = Arc<dyn Fn(&UnitFailure) + Send + Sync>;

#[derive(Debug)]
pub struct UnitFailure {
    pub label: String,
    pub error: SyncError,
}

#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Results in completion order
    pub completed: Vec<T>,
    pub failures: Vec<UnitFailure>,
    /// Units that never did remote work because the pass was canceled
    pub skipped: usize,
}

impl<T> Default for PoolOutcome<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
            skipped: 0,
        }
    }
}

enum UnitResult<T> {
    Done(T),
    Failed(SyncError),
    Skipped,
}

pub struct WorkPool<T> {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<(String, UnitResult<T>)>,
    cancel: CancellationToken,
    on_failure: Option<FailureHook>,
    skipped_at_admission: usize,
}

impl<T: Send + 'static> WorkPool<T> {
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            cancel,
            on_failure: None,
            skipped_at_admission: 0,
        }
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of admitted units that have not been collected yet.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Admit a unit once a slot is free. Returns immediately without running
    /// the unit if the pass is canceled before a slot opens.
    pub async fn submit<F>(&mut self, label: impl Into<String>, unit: F)
    where
        F: FnOnce(CancellationToken) -> UnitFuture<T> + Send + 'static,
    {
        let label = label.into();
        if self.cancel.is_cancelled() {
            debug!(unit = %label, "Pass canceled, not admitting unit");
            self.skipped_at_admission += 1;
            return;
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            debug!(unit = %label, "Pass canceled while waiting for a slot");
            self.skipped_at_admission += 1;
            return;
        };

        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return (label, UnitResult::Skipped);
            }
            let result = match AssertUnwindSafe(unit(cancel)).catch_unwind().await {
                Ok(Ok(value)) => UnitResult::Done(value),
                Ok(Err(SyncError::Canceled)) => UnitResult::Skipped,
                Ok(Err(error)) => UnitResult::Failed(error),
                Err(_) => UnitResult::Failed(SyncError::Worker {
                    label: label.clone(),
                    reason: "unit panicked".to_string(),
                }),
            };
            (label, result)
        });
    }

    /// Join barrier: collect every admitted unit.
    pub async fn wait(mut self) -> PoolOutcome<T> {
        let mut outcome = PoolOutcome {
            skipped: self.skipped_at_admission,
            ..PoolOutcome::default()
        };

        while let Some(joined) = self.tasks.join_next().await {
            let (label, result) = match joined {
                Ok(pair) => pair,
                Err(join_error) => {
                    // Panics are caught inside the task, so this is an abort
                    let failure = UnitFailure {
                        label: "<unknown>".to_string(),
                        error: SyncError::Worker {
                            label: "<unknown>".to_string(),
                            reason: join_error.to_string(),
                        },
                    };
                    self.report(&failure);
                    outcome.failures.push(failure);
                    continue;
                }
            };
            match result {
                UnitResult::Done(value) => outcome.completed.push(value),
                UnitResult::Skipped => outcome.skipped += 1,
                UnitResult::Failed(error) => {
                    let failure = UnitFailure { label, error };
                    self.report(&failure);
                    outcome.failures.push(failure);
                }
            }
        }

        outcome
    }

    fn report(&self, failure: &UnitFailure) {
        warn!(
            operation = "fetch_unit",
            unit = %failure.label,
            status = "error",
            error = %failure.error,
            "Work unit failed"
        );
        if let Some(hook) = &self.on_failure {
            hook(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_sync_sources::SourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_capacity() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkPool::new(2, CancellationToken::new());

        for i in 0..5 {
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            pool.submit(format!("unit-{}", i), move |_cancel| {
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }
                .boxed()
            })
            .await;
        }

        let outcome = pool.wait().await;
        let mut completed = outcome.completed;
        completed.sort();
        assert_eq!(completed, vec![0, 1, 2, 3, 4]);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert!(max_seen.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let hook: FailureHook = Arc::new(move |failure: &UnitFailure| {
            hook_seen.lock().unwrap().push(failure.label.clone());
        });
        let mut pool = WorkPool::new(3, CancellationToken::new()).with_failure_hook(hook);

        for i in 1..=5 {
            pool.submit(format!("show-{}", i), move |_cancel| {
                async move {
                    if i == 3 {
                        Err(SyncError::from_source(
                            "3",
                            SourceError::Status { url: "http://plex/library/metadata/3/children".into(), status: 500 },
                        ))
                    } else {
                        Ok(i)
                    }
                }
                .boxed()
            })
            .await;
        }

        let outcome = pool.wait().await;
        assert_eq!(outcome.completed.len(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].label, "show-3");
        assert_eq!(*seen.lock().unwrap(), vec!["show-3".to_string()]);
    }

    #[tokio::test]
    async fn test_canceled_pool_skips_without_error() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pool: WorkPool<()> = WorkPool::new(1, cancel.clone());

        // Occupies the only slot until the token fires
        pool.submit("blocker", |cancel| {
            async move {
                cancel.cancelled().await;
                Err(SyncError::Canceled)
            }
            .boxed()
        })
        .await;
        cancel.cancel();

        for i in 0..3 {
            let calls = Arc::clone(&calls);
            pool.submit(format!("late-{}", i), move |_cancel| {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed()
            })
            .await;
        }

        let outcome = pool.wait().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.skipped, 4);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_failure() {
        let mut pool: WorkPool<u32> = WorkPool::new(2, CancellationToken::new());
        pool.submit("boom", |_cancel| {
            async move {
                let explode = true;
                if explode {
                    panic!("bad record");
                }
                Ok(0)
            }
            .boxed()
        })
        .await;
        pool.submit("fine", |_cancel| async move { Ok(7) }.boxed()).await;

        let outcome = pool.wait().await;
        assert_eq!(outcome.completed, vec![7]);
        assert!(matches!(outcome.failures[0].error, SyncError::Worker { .. }));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let pool: WorkPool<()> = WorkPool::new(0, CancellationToken::new());
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.pending(), 0);
    }
}
