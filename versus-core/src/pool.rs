//! Runner Pool
//!
//! A fixed set of runner contexts guarded by a semaphore. Each cell checks out
//! exactly one context for its whole duration; the guard returns it on drop,
//! which covers completion, failure and timeout alike.

use crate::runner::Runner;
use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::warn;

/// Pool checkout failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    /// No context became free within the wait budget
    #[error("no runner context available after {waited:?}")]
    Exhausted {
        /// How long the checkout waited
        waited: Duration,
    },
    /// The pool can no longer hand out contexts
    #[error("runner pool closed")]
    Closed,
}

/// Cleanup step that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAction {
    /// Interrupting in-flight work after a fatal abort
    Abort,
    /// Releasing the context at the end of a run
    Release,
}

/// A problem encountered during best-effort cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupDiagnostic {
    /// Index of the context in the pool
    pub context: usize,
    /// Runner name
    pub runner: String,
    /// Step that failed
    pub action: CleanupAction,
    /// What went wrong
    pub message: String,
}

/// Bounded set of runner contexts
pub struct RunnerPool {
    contexts: Vec<Arc<dyn Runner>>,
    free: Mutex<Vec<usize>>,
    permits: Semaphore,
}

impl std::fmt::Debug for RunnerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerPool")
            .field("size", &self.contexts.len())
            .field("available", &self.available())
            .finish()
    }
}

impl RunnerPool {
    /// Pool over the given contexts
    pub fn new(contexts: Vec<Arc<dyn Runner>>) -> Self {
        let size = contexts.len();
        Self {
            contexts,
            free: Mutex::new((0..size).rev().collect()),
            permits: Semaphore::new(size),
        }
    }

    /// Pool of `size` contexts produced by `factory`
    pub fn from_factory<F>(size: usize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> Arc<dyn Runner>,
    {
        Self::new((0..size).map(&mut factory).collect())
    }

    /// Number of contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the pool has no contexts at all
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Contexts currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    fn lock_free(&self) -> MutexGuard<'_, Vec<usize>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check out one context, waiting at most `wait` for one to become free
    pub async fn checkout(&self, wait: Duration) -> Result<PooledRunner<'_>, PoolError> {
        let permit = match tokio::time::timeout(wait, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => return Err(PoolError::Exhausted { waited: wait }),
        };
        let index = self.lock_free().pop().ok_or(PoolError::Closed)?;
        Ok(PooledRunner {
            pool: self,
            index,
            _permit: permit,
        })
    }

    /// Best-effort `abort()` on every context
    pub async fn abort_all(&self, wait: Duration) -> Vec<CleanupDiagnostic> {
        self.sweep(CleanupAction::Abort, wait).await
    }

    /// Best-effort `release()` on every context
    pub async fn release_all(&self, wait: Duration) -> Vec<CleanupDiagnostic> {
        self.sweep(CleanupAction::Release, wait).await
    }

    async fn sweep(&self, action: CleanupAction, wait: Duration) -> Vec<CleanupDiagnostic> {
        let steps = self.contexts.iter().enumerate().map(|(index, ctx)| async move {
            let call = match action {
                CleanupAction::Abort => ctx.abort(),
                CleanupAction::Release => ctx.release(),
            };
            let message = match tokio::time::timeout(wait, AssertUnwindSafe(call).catch_unwind())
                .await
            {
                Ok(Ok(Ok(()))) => return None,
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => "runner panicked during cleanup".to_string(),
                Err(_) => format!("timed out after {:?}", wait),
            };
            Some(CleanupDiagnostic {
                context: index,
                runner: ctx.name().to_string(),
                action,
                message,
            })
        });

        let diagnostics: Vec<CleanupDiagnostic> =
            join_all(steps).await.into_iter().flatten().collect();
        for d in &diagnostics {
            warn!(context = d.context, runner = %d.runner, action = ?d.action, "cleanup: {}", d.message);
        }
        diagnostics
    }
}

/// A checked-out context, returned to the pool on drop
pub struct PooledRunner<'a> {
    pool: &'a RunnerPool,
    index: usize,
    _permit: SemaphorePermit<'a>,
}

impl PooledRunner<'_> {
    /// Index of the context within the pool
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for PooledRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledRunner")
            .field("index", &self.index)
            .field("runner", &self.name())
            .finish()
    }
}

impl Deref for PooledRunner<'_> {
    type Target = dyn Runner;

    fn deref(&self) -> &Self::Target {
        self.pool.contexts[self.index].as_ref()
    }
}

impl Drop for PooledRunner<'_> {
    fn drop(&mut self) {
        // Slot goes back before the permit field is dropped
        self.pool.lock_free().push(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunnerError, TrialOutcome, TrialRequest};
    use futures::future::BoxFuture;

    struct Named(&'static str);

    impl Runner for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn execute<'a>(
            &'a self,
            _request: &'a TrialRequest,
        ) -> BoxFuture<'a, Result<TrialOutcome, RunnerError>> {
            Box::pin(async { Ok(TrialOutcome::measured(1.0, 1, None)) })
        }

        fn release(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
            Box::pin(async move {
                match self.0 {
                    "broken" => Err(RunnerError::Connection("socket closed".into())),
                    "stuck" => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(())
                    }
                    "panicky" => panic!("release exploded"),
                    _ => Ok(()),
                }
            })
        }
    }

    fn pool(names: &[&'static str]) -> RunnerPool {
        RunnerPool::new(
            names
                .iter()
                .map(|n| Arc::new(Named(n)) as Arc<dyn Runner>)
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_and_return() {
        let pool = pool(&["a", "b"]);
        let first = pool.checkout(Duration::from_secs(1)).await.unwrap();
        let second = pool.checkout(Duration::from_secs(1)).await.unwrap();
        assert_ne!(first.index(), second.index());
        assert_eq!(pool.available(), 0);

        let err = pool.checkout(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { .. }));

        drop(first);
        assert_eq!(pool.available(), 1);
        let again = pool.checkout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(again.name(), if second.index() == 0 { "b" } else { "a" });
    }

    #[tokio::test(start_paused = true)]
    async fn test_pooled_runner_debug_names_context() {
        let pool = pool(&["only"]);
        let held = pool.checkout(Duration::from_secs(1)).await.unwrap();
        let shown = format!("{:?}", held);
        assert!(shown.contains("index: 0"));
        assert!(shown.contains("\"only\""));
        assert!(format!("{:?}", pool.checkout(Duration::from_millis(10)).await).contains("Exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_all_collects_diagnostics() {
        let pool = pool(&["ok", "broken", "stuck", "panicky"]);
        let diagnostics = pool.release_all(Duration::from_secs(5)).await;

        assert_eq!(diagnostics.len(), 3);
        let by_runner = |name: &str| {
            diagnostics
                .iter()
                .find(|d| d.runner == name)
                .map(|d| d.message.clone())
        };
        assert!(by_runner("broken").unwrap().contains("socket closed"));
        assert!(by_runner("stuck").unwrap().contains("timed out"));
        assert!(by_runner("panicky").unwrap().contains("panicked"));
        assert!(by_runner("ok").is_none());
        assert!(diagnostics.iter().all(|d| d.action == CleanupAction::Release));
    }
}
