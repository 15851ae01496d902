//! Worker loop and the per-trigger pipeline.

use tokio_util::sync::CancellationToken;

use super::FeedViewProcessor;
use crate::error::{Error, Result};
use crate::types::ProcessJob;

impl FeedViewProcessor {
    /// Pull jobs until the stop signal or a sentinel arrives
    pub(crate) async fn worker_loop(self, worker_id: usize) {
        tracing::info!(worker_id, "Worker started");
        loop {
            let next = tokio::select! {
                _ = self.stop.cancelled() => None,
                slot = async { self.queue.rx.lock().await.recv().await } => slot.flatten(),
            };
            let Some(job) = next else {
                break;
            };

            let feed_id = job.trigger.feed_id.clone();
            tracing::info!(worker_id, feed_id = %feed_id, reset = job.reset, "Job started");
            let cancel = self.stop.child_token();
            match self.run_job(&job, &cancel).await {
                Ok(views) => {
                    tracing::info!(worker_id, feed_id = %feed_id, views, "Job finished");
                }
                Err(Error::ShuttingDown) => {
                    tracing::info!(worker_id, feed_id = %feed_id, "Job interrupted by shutdown");
                }
                Err(e) => {
                    tracing::error!(
                        worker_id,
                        feed_id = %feed_id,
                        job_failure = e.is_job_failure(),
                        error = %e,
                        "Job abandoned"
                    );
                }
            }
        }
        tracing::info!(worker_id, "Worker stopped");
    }

    /// Resolve a trigger, then download and process each view in order
    ///
    /// The first failing view abandons the remaining views of the trigger.
    /// Returns the number of views processed.
    pub(crate) async fn run_job(&self, job: &ProcessJob, cancel: &CancellationToken) -> Result<usize> {
        let views = self.resolver.resolve(job).await?;
        tracing::info!(
            feed_id = %job.trigger.feed_id,
            views = views.len(),
            "Feed views resolved"
        );

        let mut processed = 0;
        for view_job in &views {
            if cancel.is_cancelled() {
                return Err(Error::ShuttingDown);
            }
            // The lease keeps other downloads of this view out until processing ends
            let staged = self.downloader.download(view_job, cancel).await?;
            if cancel.is_cancelled() {
                return Err(Error::ShuttingDown);
            }
            self.processor.process(view_job, &staged, cancel).await?;
            processed += 1;
        }
        Ok(processed)
    }
}
