//! Cancellable scheduled tasks
//!
//! The engine keeps every pending timer and the fade ramp as an explicit
//! handle so `stop()`/`load_track()` cancellation is total. Dropping a
//! handle aborts the task; `detach` releases one without aborting, for the
//! case where a task retires its own handle on completion.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to a spawned one-shot task, aborted when dropped
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn a task and take its handle
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(future)),
        }
    }

    /// Run `future` after `delay`
    pub fn once<F>(delay: Duration, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            future.await;
        })
    }

    /// Abort the task. Safe to call when it already finished.
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting the task
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
