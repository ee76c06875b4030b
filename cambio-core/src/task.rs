use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A spawned background loop with a cooperative stop signal.
///
/// The loop receives a `oneshot::Receiver<()>` and is expected to exit once it
/// resolves. Dropping the handle signals stop and aborts the task if it is still
/// running.
#[derive(Debug)]
pub struct BackgroundTask {
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl BackgroundTask {
    /// Spawn `f` onto the current Tokio runtime.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(f(stop_rx));
        Self {
            handle: Some(handle),
            stop_tx: Some(stop_tx),
        }
    }

    /// Return `true` if the task has already exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal stop and wait up to `grace` for the loop to exit, aborting it otherwise.
    ///
    /// Returns `true` when the loop exited on its own within the grace period.
    pub async fn stop(mut self, grace: Duration) -> bool {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let Some(mut handle) = self.handle.take() else {
            return true;
        };
        // A panic inside the loop still counts as exited.
        if tokio::time::timeout(grace, &mut handle).await.is_ok() {
            return true;
        }
        handle.abort();
        // Swallow the cancellation we just caused.
        let _ = handle.await;
        false
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.handle.take()
            && !h.is_finished()
        {
            h.abort();
        }
    }
}
