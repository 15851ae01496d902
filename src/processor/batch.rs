//! Batching and upload of prepared items.

use std::time::Duration;

use crate::collector::{CollectorClient, InsertViewDataCommand, ViewDataItem};
use crate::error::{ProcessError, RemoteError};

/// Accumulates items and uploads them in fixed-size batches
///
/// Only the first batch sent for a reset job truncates the remote view.
pub(crate) struct BatchUploader<'a> {
    collector: &'a dyn CollectorClient,
    feed_id: String,
    feed_view_id: String,
    reset: bool,
    batch_size: usize,
    request_timeout: Duration,
    pending: Vec<ViewDataItem>,
    batches_sent: usize,
    items_sent: usize,
}

impl<'a> BatchUploader<'a> {
    pub(crate) fn new(
        collector: &'a dyn CollectorClient,
        feed_id: &str,
        feed_view_id: &str,
        reset: bool,
        batch_size: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            collector,
            feed_id: feed_id.to_string(),
            feed_view_id: feed_view_id.to_string(),
            reset,
            batch_size,
            request_timeout,
            pending: Vec::with_capacity(batch_size),
            batches_sent: 0,
            items_sent: 0,
        }
    }

    /// Queue an item, uploading the batch once it is full
    pub(crate) async fn push(&mut self, item: ViewDataItem) -> Result<(), ProcessError> {
        self.pending.push(item);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Upload the final partial batch, if any; returns `(batches, items)` sent
    pub(crate) async fn finish(mut self) -> Result<(usize, usize), ProcessError> {
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        Ok((self.batches_sent, self.items_sent))
    }

    async fn flush(&mut self) -> Result<(), ProcessError> {
        let data = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let count = data.len();
        let command = InsertViewDataCommand {
            feed_view_id: self.feed_view_id.clone(),
            feed_id: self.feed_id.clone(),
            data,
            truncate: self.reset && self.batches_sent == 0,
            deduplicate: false,
        };

        let upload_error = |source| ProcessError::Upload {
            feed_view_id: self.feed_view_id.clone(),
            source,
        };
        let status = tokio::time::timeout(
            self.request_timeout,
            self.collector.insert_view_data(&command),
        )
        .await
        .map_err(|_| upload_error(RemoteError::Timeout))?
        .map_err(upload_error)?;
        status.check().map_err(upload_error)?;

        self.batches_sent += 1;
        self.items_sent += count;
        tracing::debug!(
            feed_view_id = %self.feed_view_id,
            items = count,
            truncate = command.truncate,
            "Uploaded batch"
        );
        Ok(())
    }
}
