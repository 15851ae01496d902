//! Item processing: staged records to encrypted, batched uploads.
//!
//! - [`prepare`] - Encryption, identifiers and file attachments per item
//! - [`batch`] - Fixed-size batches with the truncate-once policy

mod batch;
mod prepare;


use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::collector::CollectorClient;
use crate::config::Config;
use crate::crypto::ContentCipher;
use crate::downloader::{StagedRecord, StagingFiles, spawn_line_reader};
use crate::error::{Error, ProcessError, Result};
use crate::parsers::ParserRegistry;
use crate::types::ResolvedJob;

use batch::BatchUploader;

/// Counters of one processing run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Staged records read
    pub records: usize,
    /// Items produced by the parser and uploaded
    pub items: usize,
    /// Batches uploaded
    pub batches: usize,
}

/// Parses staging files and uploads the resulting items
#[derive(Clone)]
pub struct ItemProcessor {
    collector: Arc<dyn CollectorClient>,
    cipher: Arc<dyn ContentCipher>,
    parsers: Arc<ParserRegistry>,
    batch_size: usize,
    max_line_bytes: usize,
    request_timeout: Duration,
}

impl ItemProcessor {
    /// Create a processor from configuration and its collaborators
    pub fn new(
        config: &Config,
        collector: Arc<dyn CollectorClient>,
        cipher: Arc<dyn ContentCipher>,
        parsers: Arc<ParserRegistry>,
    ) -> Self {
        Self {
            collector,
            cipher,
            parsers,
            batch_size: config.batch_size,
            max_line_bytes: config.max_line_bytes,
            request_timeout: config.request_timeout,
        }
    }

    /// Parse every staged record of the job's view and upload the items
    ///
    /// Items are uploaded in batches of `batch_size`; for a reset job the
    /// first batch replaces the view's remote data. The data file is deleted
    /// once every batch has been accepted; the watermark is kept.
    ///
    /// # Errors
    ///
    /// [`Error::Process`] when no parser matches the job, a staged record is
    /// invalid or a batch is refused; the data file is then left in place.
    /// [`Error::ShuttingDown`] if `cancel` fires between records.
    pub async fn process(
        &self,
        job: &ResolvedJob,
        files: &StagingFiles,
        cancel: &CancellationToken,
    ) -> Result<ProcessSummary> {
        let feed_view_id = job.feed_view_id();
        let parser = self
            .parsers
            .select(&job.feed.feed_type, job.view.mapping_code.as_deref())?;

        let mut lines = spawn_line_reader(files.data_path.clone(), self.max_line_bytes);
        let mut uploader = BatchUploader::new(
            self.collector.as_ref(),
            job.feed_id(),
            feed_view_id,
            job.reset,
            self.batch_size,
            self.request_timeout,
        );
        let mut summary = ProcessSummary::default();

        while let Some(line) = lines.recv().await {
            if cancel.is_cancelled() {
                tracing::info!(feed_view_id, records = summary.records, "Processing cancelled");
                return Err(Error::ShuttingDown);
            }
            let record: StagedRecord = serde_json::from_str(&line?)
                .map_err(|e| ProcessError::InvalidStagedRecord(e.to_string()))?;
            summary.records += 1;

            for item in parser.parse(&record.data).map_err(ProcessError::from)? {
                let prepared = prepare::prepare_item(job, &record, &item, self.cipher.as_ref())?;
                uploader.push(prepared).await?;
            }
        }

        let (batches, items) = uploader.finish().await?;
        summary.batches = batches;
        summary.items = items;

        files.remove_data().await?;
        tracing::info!(
            feed_id = job.feed_id(),
            feed_view_id,
            records = summary.records,
            items = summary.items,
            batches = summary.batches,
            "Feed view processed"
        );
        Ok(summary)
    }
}
