//! Bounded-parallel execution with per-task isolation: each task gets its own
//! timeout and its failure is captured in place instead of failing siblings.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Run `tasks` with at most `max_parallel` in flight, each bounded by
/// `per_task_timeout`. Results come back in input order; a slot is `Err` when
/// that task failed, timed out, or panicked, and the rest are unaffected.
pub async fn run_bounded<T, Fut>(
    tasks: Vec<Fut>,
    max_parallel: usize,
    per_task_timeout: Duration,
) -> Vec<Result<T, TaskError>>
where
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let total = tasks.len();

    let mut in_flight = FuturesUnordered::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        in_flight.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => return (index, Err(TaskError::Failed(closed.into()))),
            };
            match timeout(per_task_timeout, task).await {
                Ok(Ok(value)) => (index, Ok(value)),
                Ok(Err(err)) => (index, Err(TaskError::Failed(err))),
                Err(_) => (index, Err(TaskError::TimedOut(per_task_timeout))),
            }
        }));
    }

    let mut slots: Vec<Option<Result<T, TaskError>>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    while let Some(joined) = in_flight.next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(join_err) => {
                // The task id is lost with the panic; the slot stays None and
                // is reported below.
                warn!("parallel task aborted: {join_err}");
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(TaskError::Panicked("task aborted".to_string()))))
        .collect()
}
