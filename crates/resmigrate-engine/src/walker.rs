//! Bounded fan-out over sibling resources
//!
//! One task per sibling, all joined before returning. A failing task never
//! cancels its siblings: every task runs to completion, each failure is
//! logged once by the level it started in, and the first error in input
//! order is returned wrapped in [`MigrateError::Fanout`].
//!
//! Each call gets its own semaphore. Nested levels therefore multiply their
//! limits instead of competing for one pool, which would deadlock a parent
//! holding a permit while it waits on children.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::error::MigrateError;

/// Concurrent walker for one level of the resource tree
#[derive(Debug, Clone, Copy)]
pub struct TreeWalker {
    max_concurrency: usize,
}

impl TreeWalker {
    /// Create a walker running at most `max_concurrency` tasks per level
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Concurrency limit per level
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `task` for every item, returning the number of items processed
    ///
    /// # Errors
    /// `Fanout` holding the first failure in input order, after all tasks
    /// have finished.
    pub async fn fan_out<T, F, Fut>(
        &self,
        level: &str,
        items: Vec<T>,
        task: F,
    ) -> Result<usize, MigrateError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), MigrateError>> + Send + 'static,
    {
        let count = items.len();
        if count == 0 {
            return Ok(0);
        }

        debug!(level, count, limit = self.max_concurrency, "fanning out");

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let task = Arc::new(task);

        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let permits = permits.clone();
                let task = task.clone();
                let context = level.to_string();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|e| MigrateError::Task {
                        context,
                        message: e.to_string(),
                    })?;
                    task(item).await
                })
            })
            .collect();

        let results = join_all(handles).await;

        let mut errors: Vec<(usize, MigrateError)> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, joined)| match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some((index, e)),
                Err(e) => Some((
                    index,
                    MigrateError::Task {
                        context: level.to_string(),
                        message: e.to_string(),
                    },
                )),
            })
            .collect();

        if errors.is_empty() {
            return Ok(count);
        }

        for (index, err) in &errors {
            // nested levels already logged their own failures
            if !matches!(err, MigrateError::Fanout { .. }) {
                error!(error = %err, index, level, "migration task failed");
            }
        }

        let failed = errors.len();
        let (index, first) = errors.swap_remove(0);
        Err(MigrateError::Fanout {
            level: level.to_string(),
            failed,
            total: count,
            index,
            first: Box::new(first),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use resmigrate_common::Error;

    #[tokio::test]
    async fn test_empty_level() {
        let walker = TreeWalker::new(4);
        let processed = walker
            .fan_out("revisions", Vec::<u32>::new(), |_| async { Ok::<(), MigrateError>(()) })
            .await
            .unwrap();
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_all_tasks_run_when_one_fails() {
        let walker = TreeWalker::new(3);
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let result = walker
            .fan_out("instances", (0..10).collect(), move |i: u32| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if i == 4 {
                        Err(MigrateError::from(Error::store("update", format!("inst.{i}"), "conflict")))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 10);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("inst.4"));
        assert!(matches!(
            err,
            MigrateError::Fanout { failed: 1, total: 10, index: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_first_error_in_input_order() {
        let walker = TreeWalker::new(10);
        let result = walker
            .fan_out("instances", vec![1u64, 2, 3], |i| async move {
                // later items fail sooner
                tokio::time::sleep(Duration::from_millis(30 / i)).await;
                Err(MigrateError::from(Error::store("update", format!("inst.{i}"), "boom")))
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.root_cause().to_string().contains("inst.1"));
        assert!(matches!(err, MigrateError::Fanout { failed: 3, index: 0, .. }));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let walker = TreeWalker::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (r, p) = (running.clone(), peak.clone());
        walker
            .fan_out("revisions", (0..8).collect::<Vec<u32>>(), move |_| {
                let (running, peak) = (r.clone(), p.clone());
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), MigrateError>(())
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let walker = TreeWalker::new(2);
        let result = walker
            .fan_out("consumer-instances", vec![0u32, 1], |i| async move {
                if i == 1 {
                    panic!("bad resource");
                }
                Ok::<(), MigrateError>(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.root_cause(),
            MigrateError::Task { context, .. } if context == "consumer-instances"
        ));
    }

    #[tokio::test]
    async fn test_nested_levels_with_single_permit() {
        let walker = TreeWalker::new(1);
        let leaves = Arc::new(AtomicUsize::new(0));

        let counter = leaves.clone();
        walker
            .fan_out("revisions", vec![3usize, 2], move |children| {
                let counter = counter.clone();
                async move {
                    walker
                        .fan_out("instances", (0..children).collect(), move |_: usize| {
                            let counter = counter.clone();
                            async move {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok::<(), MigrateError>(())
                            }
                        })
                        .await
                        .map(|_| ())
                }
            })
            .await
            .unwrap();

        assert_eq!(leaves.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_nested_failure_keeps_both_positions() {
        let walker = TreeWalker::new(2);
        let result = walker
            .fan_out("revisions", vec![0usize, 1], move |revision| async move {
                walker
                    .fan_out("instances", vec![0usize, 1, 2], move |instance| async move {
                        if revision == 1 && instance == 2 {
                            Err(MigrateError::from(Error::store("update", "inst", "conflict")))
                        } else {
                            Ok(())
                        }
                    })
                    .await
                    .map(|_| ())
            })
            .await;

        let err = result.unwrap_err();
        let MigrateError::Fanout { level, index, first, .. } = &err else {
            panic!("expected a fan-out error, got {err}");
        };
        assert_eq!((level.as_str(), *index), ("revisions", 1));
        assert!(matches!(
            first.as_ref(),
            MigrateError::Fanout { level, index: 2, .. } if level == "instances"
        ));
        assert!(err.is_store());
    }
}
