use std::future::Future;

use anyhow::Result;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

/// How a background task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    Cancelled,
}

/// Handle to a background task whose failures are captured instead of lost.
pub struct TaskHandle<T> {
    abort: AbortHandle,
    outcome: JoinHandle<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    /// Handle that stops the task body at its next suspension point.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub async fn outcome(self) -> TaskOutcome<T> {
        self.outcome
            .await
            .unwrap_or_else(|err| TaskOutcome::Failed(format!("task supervisor failed: {err}")))
    }
}

/// Run `body` on its own task, converting errors, panics and cancellation into a [`TaskOutcome`].
pub fn spawn_task<T, F>(label: &'static str, body: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let inner = tokio::spawn(body);
    let abort = inner.abort_handle();

    let outcome = tokio::spawn(async move {
        match inner.await {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(err)) => {
                error!(?err, task = label, "background task failed");
                TaskOutcome::Failed(format!("{err:#}"))
            }
            Err(join_err) if join_err.is_cancelled() => {
                info!(task = label, "background task cancelled");
                TaskOutcome::Cancelled
            }
            Err(join_err) => {
                error!(%join_err, task = label, "background task panicked");
                TaskOutcome::Failed(format!("{label} task panicked"))
            }
        }
    });

    TaskHandle { abort, outcome }
}
