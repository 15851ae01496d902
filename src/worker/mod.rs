//! Worker pool and job queue.
//!
//! The `FeedViewProcessor` struct and its methods are organized by domain:
//! - [`queue`] - Job submission (blocking and best-effort)
//! - [`pipeline`] - Worker loop and the resolve, download, process pipeline
//! - [`lifecycle`] - Worker startup and shutdown coordination

mod lifecycle;
mod pipeline;
mod queue;


use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectorClient, FileHost};
use crate::config::Config;
use crate::crypto::ContentCipher;
use crate::downloader::FeedDataDownloader;
use crate::error::Result;
use crate::parsers::ParserRegistry;
use crate::processor::ItemProcessor;
use crate::resolver::JobResolver;
use crate::types::ProcessJob;

/// Jobs waiting for a worker; `None` tells one worker to exit
type QueueSlot = Option<ProcessJob>;

/// Single-slot handoff queue shared by the workers
#[derive(Clone)]
pub(crate) struct JobQueue {
    /// Producer side (capacity 1)
    pub(crate) tx: mpsc::Sender<QueueSlot>,
    /// Consumer side, taken by one idle worker at a time
    pub(crate) rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueueSlot>>>,
}

impl JobQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

/// Feed view ingestion service (cloneable - all fields are Arc-wrapped)
///
/// Triggers are queued with [`add_to_queue`](Self::add_to_queue) or
/// [`add_updates_to_queue`](Self::add_updates_to_queue); a fixed pool of
/// workers started by [`start_workers`](Self::start_workers) resolves,
/// downloads and processes them.
#[derive(Clone)]
pub struct FeedViewProcessor {
    /// Configuration (wrapped in Arc for sharing across workers)
    pub(crate) config: Arc<Config>,
    /// Trigger to per-view job resolution
    pub(crate) resolver: JobResolver,
    /// Staging downloads (shares the per-view gate across workers)
    pub(crate) downloader: FeedDataDownloader,
    /// Parse, encrypt and upload
    pub(crate) processor: ItemProcessor,
    /// Handoff queue
    pub(crate) queue: JobQueue,
    /// Process-wide stop signal; each running job gets a child token
    pub(crate) stop: CancellationToken,
    /// Running worker tasks
    pub(crate) workers: Arc<std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl FeedViewProcessor {
    /// Create the service with the built-in parsers
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings
    /// and [`Error::Io`](crate::Error::Io) if the staging directory cannot be created.
    pub async fn new(
        config: Config,
        collector: Arc<dyn CollectorClient>,
        file_host: Arc<dyn FileHost>,
        cipher: Arc<dyn ContentCipher>,
    ) -> Result<Self> {
        Self::with_parsers(config, collector, file_host, cipher, ParserRegistry::builtin()).await
    }

    /// Create the service with a custom parser registry
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn with_parsers(
        config: Config,
        collector: Arc<dyn CollectorClient>,
        file_host: Arc<dyn FileHost>,
        cipher: Arc<dyn ContentCipher>,
        parsers: ParserRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let staging_dir = config.staging_dir();
        tokio::fs::create_dir_all(&staging_dir).await?;
        tracing::info!(
            staging_dir = %staging_dir.display(),
            workers = config.workers,
            max_concurrent_downloads = config.max_concurrent_downloads,
            "Feed view processor ready"
        );

        let resolver = JobResolver::new(
            Arc::clone(&collector),
            Arc::clone(&cipher),
            config.request_timeout,
        );
        let downloader = FeedDataDownloader::new(
            &config,
            Arc::clone(&collector),
            file_host,
            Arc::clone(&cipher),
        );
        let processor = ItemProcessor::new(&config, collector, cipher, Arc::new(parsers));

        Ok(Self {
            config: Arc::new(config),
            resolver,
            downloader,
            processor,
            queue: JobQueue::new(),
            stop: CancellationToken::new(),
            workers: Arc::new(std::sync::Mutex::new(Vec::new())),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether shutdown has been requested
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }
}
