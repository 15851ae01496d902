//! # datasource-mapper
//!
//! Feed-view ingestion worker: downloads the raw records a data collector
//! saved for a feed, reparses them per view into normalized items and
//! uploads those items back, re-encrypted under the view's content key.
//!
//! ## Design Philosophy
//!
//! datasource-mapper is designed to be:
//! - **Resumable** - Each view keeps a local staging file and a watermark
//! - **Deterministic** - Item identifiers are digests of item content
//! - **Library-first** - The embedding process supplies the bus and the cipher
//! - **Bounded** - A fixed worker pool behind a single-slot queue
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use datasource_mapper::{
//!     CollectorClient, Config, ContentCipher, FeedViewProcessor, HttpFileHost, MessageKind,
//! };
//!
//! async fn serve(
//!     collector: Arc<dyn CollectorClient>,
//!     cipher: Arc<dyn ContentCipher>,
//! ) -> datasource_mapper::Result<()> {
//!     let config = Config::default();
//!     let file_host = Arc::new(HttpFileHost::new(&config.filehost)?);
//!     let processor = FeedViewProcessor::new(config, collector, file_host, cipher).await?;
//!     processor.start_workers();
//!
//!     // For each message delivered by the bus
//!     let payload = serde_json::json!({"feed_id": "feed-1"});
//!     let reply = processor
//!         .handle_message(MessageKind::Command, "processFeedView", &payload)
//!         .await;
//!     assert!(reply.ok);
//!
//!     processor.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bus entry points
pub mod bus;
/// Collector RPC types and collaborator traits
pub mod collector;
/// Configuration types
pub mod config;
/// Content encryption seam
pub mod crypto;
/// Resumable staging downloads
pub mod downloader;
/// Error types
pub mod error;
/// Normalized items and deterministic identifiers
pub mod item;
/// Feed parsers and parser registry
pub mod parsers;
/// Staged data parsing and upload
pub mod processor;
/// Trigger to per-view job resolution
pub mod resolver;
/// Core job and key types
pub mod types;
/// Worker pool and job queue
pub mod worker;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use bus::{BusMessage, MessageKind};
pub use collector::{
    CollectorClient, FileHost, GetFeedDataRequest, GetFeedDataResponse, GetFeedViewsRequest,
    GetFeedViewsResponse, HttpFileHost, InsertViewDataCommand, ResponseStatus, ViewDataItem,
};
pub use config::{Config, FileHostConfig};
pub use crypto::{ContentCipher, KeyRing};
pub use error::{
    CryptoError, DownloadError, Error, ParseError, PreparationError, ProcessError, RemoteError,
    Result,
};
pub use item::{DataIdBasis, ItemGroup, NormalizedItem, hash_to_id};
pub use parsers::{FeedParser, ParserRegistry};
pub use types::{
    ContentKey, EncryptedBlob, Feed, FeedTrigger, FeedView, FileDetail, ProcessJob, ResolvedJob,
};
pub use worker::FeedViewProcessor;

/// Helper function to run the processor with graceful signal handling.
///
/// Starts the worker pool, waits for a termination signal and then calls
/// the processor's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(processor: FeedViewProcessor) -> Result<()> {
    processor.start_workers();
    wait_for_signal().await;
    processor.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = received, "Stopping feed view processor");
        }
        // Sandboxed runtimes may refuse one of the handlers
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Feed view processor listens for a single termination signal");
            only.recv().await;
            tracing::info!("Stopping feed view processor");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "No signal handler for the feed view processor, waiting for Ctrl+C");
            stop_on_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    stop_on_ctrl_c().await;
}

async fn stop_on_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Stopping feed view processor"),
        Err(e) => tracing::error!(error = %e, "Cannot listen for Ctrl+C, stopping feed view processor"),
    }
}
