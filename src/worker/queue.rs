//! Job submission.

use tokio::sync::mpsc::error::TrySendError;

use super::FeedViewProcessor;
use crate::error::{Error, Result};
use crate::types::{FeedTrigger, ProcessJob};

impl FeedViewProcessor {
    /// Queue a trigger, waiting for a free slot
    ///
    /// Used for explicit processing commands, which must not be lost.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once shutdown has started.
    pub async fn add_to_queue(&self, trigger: FeedTrigger, reset: bool) -> Result<()> {
        if self.stop.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        let feed_id = trigger.feed_id.clone();
        let job = ProcessJob::new(trigger, reset);
        tokio::select! {
            _ = self.stop.cancelled() => Err(Error::ShuttingDown),
            sent = self.queue.tx.send(Some(job)) => {
                sent.map_err(|_| Error::ShuttingDown)?;
                tracing::debug!(feed_id = %feed_id, reset, "Job queued");
                Ok(())
            }
        }
    }

    /// Queue a trigger only if a slot is free right now
    ///
    /// Used for data-updated events, which are advisory: a later event or
    /// command will pick up the data. Returns whether the job was queued.
    pub fn add_updates_to_queue(&self, trigger: FeedTrigger, reset: bool) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        let feed_id = trigger.feed_id.clone();
        match self.queue.tx.try_send(Some(ProcessJob::new(trigger, reset))) {
            Ok(()) => {
                tracing::debug!(feed_id = %feed_id, reset, "Update job queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(feed_id = %feed_id, "Queue full, dropping update trigger");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
