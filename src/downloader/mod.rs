//! Staging download of feed view data.
//!
//! The download is split into focused submodules:
//! - [`gate`] - One download per feed view at a time
//! - [`staging`] - Staging data and watermark files
//! - [`record`] - Record blob decoding and decryption

mod gate;
mod record;
mod staging;


pub use record::StagedRecord;
#[cfg(test)]
pub(crate) use record::RecordEnvelope;
pub use staging::StagingFiles;
pub(crate) use staging::{StagingWriter, spawn_line_reader};

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectorClient, FeedDataRecord, FileHost, GetFeedDataRequest};
use crate::config::Config;
use crate::crypto::{ContentCipher, KeyRing};
use crate::error::{DownloadError, Error, RemoteError, Result};
use crate::types::{ResolvedJob, StagingWatermark};

use gate::{InFlightDownloads, InFlightSlot};

/// Staging files of a view, held exclusively until dropped
///
/// No other download of the view starts while the lease is alive, so the
/// data file can be processed and removed without losing appended pages.
pub struct StagingLease {
    files: StagingFiles,
    _slot: InFlightSlot,
}

impl StagingLease {
    /// Release the view and keep only the paths
    pub fn into_files(self) -> StagingFiles {
        self.files
    }
}

impl std::fmt::Debug for StagingLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingLease")
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl Deref for StagingLease {
    type Target = StagingFiles;

    fn deref(&self) -> &StagingFiles {
        &self.files
    }
}

/// Downloads feed view data pages into local staging files
///
/// Cloneable; clones share the per-view gate and the concurrency limit.
#[derive(Clone)]
pub struct FeedDataDownloader {
    /// Directory holding the staging files
    staging_dir: PathBuf,
    /// Collector RPC client
    collector: Arc<dyn CollectorClient>,
    /// Record blob storage
    file_host: Arc<dyn FileHost>,
    /// Content cipher for records and key envelopes
    cipher: Arc<dyn ContentCipher>,
    /// Views with a download in progress
    in_flight: InFlightDownloads,
    /// Limits concurrent downloads across all views (max_concurrent_downloads)
    concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Records requested per page
    page_size: usize,
    /// Deadline for each getFeedData request and record fetch
    request_timeout: Duration,
}

impl FeedDataDownloader {
    /// Create a downloader from configuration and its collaborators
    pub fn new(
        config: &Config,
        collector: Arc<dyn CollectorClient>,
        file_host: Arc<dyn FileHost>,
        cipher: Arc<dyn ContentCipher>,
    ) -> Self {
        Self {
            staging_dir: config.staging_dir(),
            collector,
            file_host,
            cipher,
            in_flight: InFlightDownloads::default(),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.max_concurrent_downloads,
            )),
            page_size: config.page_size,
            request_timeout: config.request_timeout,
        }
    }

    /// Staging files of a feed view
    pub fn staging_files(&self, feed_view_id: &str) -> StagingFiles {
        StagingFiles::for_view(&self.staging_dir, feed_view_id)
    }

    /// Bring the view's staging file up to date with the collector
    ///
    /// Waits while another download runs for the same view, then for a
    /// global download permit. A reset job deletes the staging files and
    /// starts from the beginning; otherwise paging resumes after the
    /// persisted watermark. The watermark is saved after every page, so an
    /// interrupted download never re-stages records it already wrote.
    ///
    /// Cancellation is checked before each page; a cancelled download keeps
    /// the pages written so far.
    ///
    /// The returned lease keeps the view locked; hold it until the staged
    /// data has been processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] when a page or record cannot be fetched or
    /// decoded, [`Error::Io`] on staging file failures, and
    /// [`Error::ShuttingDown`] if the download permit pool was closed.
    pub async fn download(
        &self,
        job: &ResolvedJob,
        cancel: &CancellationToken,
    ) -> Result<StagingLease> {
        let feed_view_id = job.feed_view_id();
        let files = self.staging_files(feed_view_id);

        let slot = self.in_flight.acquire(feed_view_id).await;
        let _permit = self
            .concurrent_limit
            .acquire()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        let mut watermark = if job.reset {
            tracing::info!(feed_view_id, "Resetting staging files");
            files.reset().await?;
            StagingWatermark::default()
        } else {
            files.load_watermark().await?
        };
        let since = watermark.since_ms();
        let mut writer = StagingWriter::new(files.data_path.clone(), since > 0);

        tracing::info!(
            feed_id = job.feed_id(),
            feed_view_id,
            since,
            "Downloading feed view data"
        );

        let mut skip = 0;
        let mut pages = 0usize;
        let mut records = 0usize;
        loop {
            if cancel.is_cancelled() {
                tracing::info!(feed_view_id, pages, "Download cancelled");
                break;
            }

            let request = GetFeedDataRequest {
                feed_id: job.feed_id().to_string(),
                feed_view_id: feed_view_id.to_string(),
                batch_start: since,
                limit: self.page_size,
                skip,
            };
            let page = self.fetch_page(&request).await?;
            if page.items.is_empty() {
                break;
            }
            skip += page.items.len();

            let keys = KeyRing::open(
                self.cipher.as_ref(),
                page.keys.as_ref().unwrap_or(&serde_json::Value::Null),
            )
            .map_err(DownloadError::Keys)?;

            let mut lines = Vec::with_capacity(page.items.len());
            let mut most_recent = watermark.most_recent_date;
            for item in &page.items {
                let staged = self.fetch_record(item, &keys).await?;
                lines.push(serde_json::to_string(&staged)?);
                let saved = save_date(item)?;
                most_recent = Some(most_recent.map_or(saved, |current| current.max(saved)));
            }

            writer.write_page(lines).await?;
            watermark.most_recent_date = most_recent;
            files.save_watermark(&watermark).await?;

            pages += 1;
            records += page.items.len();
            tracing::debug!(feed_view_id, skip, records, "Staged page");
        }

        tracing::info!(
            feed_view_id,
            pages,
            records,
            most_recent_date = ?watermark.most_recent_date,
            "Feed view download finished"
        );
        Ok(StagingLease { files, _slot: slot })
    }

    async fn fetch_page(
        &self,
        request: &GetFeedDataRequest,
    ) -> Result<crate::collector::GetFeedDataResponse> {
        let feed_view_id = request.feed_view_id.clone();
        let response = tokio::time::timeout(
            self.request_timeout,
            self.collector.get_feed_data(request),
        )
        .await
        .map_err(|_| DownloadError::Timeout {
            feed_view_id: feed_view_id.clone(),
        })?;

        let page = match response {
            Ok(page) => page,
            Err(RemoteError::Timeout) => return Err(DownloadError::Timeout { feed_view_id }.into()),
            Err(source) => {
                return Err(DownloadError::Rejected {
                    feed_view_id,
                    source,
                }
                .into());
            }
        };
        page.status
            .check()
            .map_err(|source| DownloadError::Rejected {
                feed_view_id,
                source,
            })?;
        Ok(page)
    }

    async fn fetch_record(&self, item: &FeedDataRecord, keys: &KeyRing) -> Result<StagedRecord> {
        let fuuid = item.data_fuuid.as_str();
        let blob = tokio::time::timeout(self.request_timeout, self.file_host.download_file(fuuid))
            .await
            .unwrap_or(Err(RemoteError::Timeout))
            .map_err(|source| DownloadError::RecordFetch {
                fuuid: fuuid.to_string(),
                source,
            })?;
        Ok(record::decode_record(fuuid, &blob, keys, self.cipher.as_ref())?)
    }
}

/// Record save date, validated as a representable timestamp
fn save_date(item: &FeedDataRecord) -> std::result::Result<i64, DownloadError> {
    DateTime::<Utc>::from_timestamp_millis(item.save_date)
        .map(|date| date.timestamp_millis())
        .ok_or_else(|| DownloadError::InvalidRecord {
            fuuid: item.data_fuuid.clone(),
            reason: format!("save_date {} out of range", item.save_date),
        })
}
