//! Worker startup and shutdown coordination.

use std::sync::PoisonError;
use std::time::Duration;

use super::FeedViewProcessor;

/// How long shutdown waits for running jobs to reach a cancellation point
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl FeedViewProcessor {
    /// Spawn the configured number of workers
    ///
    /// Calling it again while workers run adds another pool; call once.
    pub fn start_workers(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker_id in 0..self.config.workers {
            workers.push(tokio::spawn(self.clone().worker_loop(worker_id)));
        }
        tracing::info!(workers = self.config.workers, "Workers started");
    }

    /// Stop accepting jobs, cancel running jobs and wait for the workers
    ///
    /// Running jobs stop at their next cancellation point (between pages,
    /// records or stages). Workers that do not finish within 30 seconds are
    /// left behind with a warning.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.stop.cancel();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        // Wake workers still parked on an empty queue
        for _ in 0..handles.len() {
            let _ = self.queue.tx.try_send(None);
        }

        let wait = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Worker task failed");
                }
            }
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await {
            Ok(()) => tracing::info!("All workers stopped"),
            Err(_) => tracing::warn!("Timeout waiting for workers, proceeding with shutdown"),
        }
    }
}
