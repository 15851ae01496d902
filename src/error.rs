//! Error types for datasource-mapper
//!
//! This module provides the error taxonomy of the ingestion pipeline:
//! - Domain-specific error types (Preparation, Download, Process)
//! - Collaborator failures (collector RPCs, file host, cipher, parsers)
//! - Context information (feed view id, key id, response codes)

use thiserror::Error;

/// Result type alias for datasource-mapper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for datasource-mapper
///
/// Job-level variants ([`Error::Preparation`], [`Error::Download`], [`Error::Process`])
/// are caught at the worker-loop boundary; they abandon the job but never stop a worker.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Feed/view metadata could not be resolved into jobs
    #[error("feed preparation error: {0}")]
    Preparation(#[from] PreparationError),

    /// Staging download failed
    #[error("feed download error: {0}")]
    Download(#[from] DownloadError),

    /// Parsing or uploading staged data failed
    #[error("processing error: {0}")]
    Process(#[from] ProcessError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,
}

/// Failures of a remote collaborator (collector RPC or file host)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// No response within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The collaborator answered with `ok: false`
    #[error("request rejected (code: {code:?}): {message}")]
    Rejected {
        /// Error code returned by the collaborator, if any
        code: Option<i64>,
        /// Error message returned by the collaborator
        message: String,
    },

    /// Response could not be decoded or lacks required fields
    #[error("malformed response: {0}")]
    Malformed(String),

    /// HTTP status outside the 2xx range
    #[error("HTTP status {status}")]
    Http {
        /// Status code received
        status: u16,
    },

    /// Connection or transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failures of the content cipher
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Key envelope set could not be opened
    #[error("cannot open key envelopes: {0}")]
    KeyEnvelope(String),

    /// Ciphertext could not be decrypted with the given key
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Cleartext could not be encrypted
    #[error("encryption failed: {0}")]
    Encrypt(String),
}

/// Failures of a feed parser
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Source document is not well-formed for the parser's format
    #[error("invalid {format} document: {reason}")]
    InvalidDocument {
        /// Format the parser expected (e.g. "rss")
        format: &'static str,
        /// Underlying parser message
        reason: String,
    },
}

/// Errors raised while resolving a trigger into per-view jobs
#[derive(Debug, Error)]
pub enum PreparationError {
    /// Metadata endpoint answered with a failure
    #[error("error loading feed view information: {0}")]
    Rejected(RemoteError),

    /// Metadata endpoint did not answer in time
    #[error("timeout when loading feed view information")]
    Timeout,

    /// Response lacks a required field or has an unexpected shape
    #[error("invalid response on loading feed view information: {0}")]
    Malformed(String),

    /// The key envelope set has no key for the view
    #[error("no content key {key_id} for feed view {feed_view_id}")]
    MissingKey {
        /// Feed view whose key is missing
        feed_view_id: String,
        /// Key id referenced by the view configuration
        key_id: String,
    },

    /// The key envelopes or the view configuration could not be decrypted
    #[error("invalid content key for feed view {feed_view_id}: {source}")]
    InvalidKey {
        /// Feed view whose configuration failed to decrypt
        feed_view_id: String,
        /// Underlying cipher failure
        #[source]
        source: CryptoError,
    },
}

/// Errors raised while staging feed view data
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Data endpoint answered with a failure
    #[error("error received when fetching next batch for feed view {feed_view_id}: {source}")]
    Rejected {
        /// Feed view being downloaded
        feed_view_id: String,
        /// Underlying collaborator failure
        #[source]
        source: RemoteError,
    },

    /// A page fetch did not complete in time
    #[error("timeout on getFeedData for feed view {feed_view_id}")]
    Timeout {
        /// Feed view being downloaded
        feed_view_id: String,
    },

    /// A record references a key the page did not provide
    #[error("record {fuuid} references unknown key {key_id}")]
    MissingKey {
        /// Record blob reference
        fuuid: String,
        /// Key id referenced by the record
        key_id: String,
    },

    /// A record blob could not be fetched from the file host
    #[error("cannot fetch record {fuuid}: {source}")]
    RecordFetch {
        /// Record blob reference
        fuuid: String,
        /// Underlying collaborator failure
        #[source]
        source: RemoteError,
    },

    /// A record blob could not be decompressed, decoded or decrypted
    #[error("invalid record {fuuid}: {reason}")]
    InvalidRecord {
        /// Record blob reference
        fuuid: String,
        /// What was wrong with the record
        reason: String,
    },

    /// Page key envelopes could not be opened
    #[error("cannot open page keys: {0}")]
    Keys(#[source] CryptoError),
}

/// Errors raised while parsing staged data and uploading batches
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No parser is registered for the feed type
    #[error("feed type not supported: {feed_type}")]
    UnsupportedFeedType {
        /// Feed type of the job
        feed_type: String,
    },

    /// The feed type has no parser for the view's mapping
    #[error("no {mapping} mapping for feed type {feed_type}")]
    UnknownMapping {
        /// Feed type of the job
        feed_type: String,
        /// Mapping requested by the view
        mapping: String,
    },

    /// A staged line exceeds the configured limit
    #[error("staged record exceeds {limit} bytes")]
    LineTooLong {
        /// Configured maximum line length
        limit: usize,
    },

    /// A staged record could not be decoded
    #[error("invalid staged record: {0}")]
    InvalidStagedRecord(String),

    /// A staged record could not be parsed into items
    #[error("parser failed: {0}")]
    Parse(#[from] ParseError),

    /// An item could not be encrypted
    #[error("cannot encrypt item: {0}")]
    Encrypt(#[source] CryptoError),

    /// The collector refused a batch
    #[error("error saving batch for feed view {feed_view_id}: {source}")]
    Upload {
        /// Feed view being uploaded
        feed_view_id: String,
        /// Underlying collaborator failure
        #[source]
        source: RemoteError,
    },
}

impl Error {
    /// Whether this error only concerns the job it was raised for
    ///
    /// Job-level errors are logged and the job abandoned; everything else
    /// (I/O on the staging directory, shutdown) is reported as such.
    pub fn is_job_failure(&self) -> bool {
        matches!(
            self,
            Error::Preparation(_) | Error::Download(_) | Error::Process(_)
        )
    }
}
