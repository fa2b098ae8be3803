//! Fixed-delay interval scheduler.
//!
//! Runs a task, waits `delay` after it *finishes*, runs it again. Two runs
//! never overlap and a slow run simply pushes the next one back. A failed
//! run is handed to the error callback and the loop keeps going.
//!
//! The task is owned by the loop for its whole life, so it can hold mutable
//! state without locks. Cancelling stops future runs and cuts short a
//! pending delay, but never interrupts a run already in flight; joining the
//! handle gives the task back.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A unit of repeated work.
#[async_trait]
pub trait IntervalTask: Send + 'static {
    type Error: Send + 'static;

    async fn run(&mut self) -> Result<(), Self::Error>;
}

/// Handle to a running interval loop.
pub struct IntervalHandle<T> {
    token: CancellationToken,
    handle: JoinHandle<T>,
}

impl<T> IntervalHandle<T> {
    /// Stop scheduling further runs.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to exit and take the task back.
    ///
    /// Only returns once the loop has been cancelled.
    pub async fn join(self) -> Result<T, JoinError> {
        self.handle.await
    }

    /// Cancel, then wait for any in-flight run to finish.
    pub async fn shutdown(self) -> Result<T, JoinError> {
        self.cancel();
        self.join().await
    }
}

/// Start running `task` immediately, then every `delay` after each run completes.
pub fn spawn_interval<T, F>(delay: Duration, mut task: T, mut on_error: F) -> IntervalHandle<T>
where
    T: IntervalTask,
    F: FnMut(T::Error) + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let handle = tokio::spawn(async move {
        debug!(delay_ms = delay.as_millis() as u64, "Interval loop started");

        while !cancelled.is_cancelled() {
            if let Err(e) = task.run().await {
                on_error(e);
            }

            tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Interval loop stopped");
        task
    });

    IntervalHandle { token, handle }
}
