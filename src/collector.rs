//! Collector service interface: request/response types of the three RPCs,
//! the client and file host traits, and an HTTP file host.
//!
//! The bus transport carrying the RPCs belongs to the embedding process; it
//! implements [`CollectorClient`] and maps its own failures onto [`RemoteError`].

use crate::config::FileHostConfig;
use crate::error::{Error, RemoteError};
use crate::types::{EncryptedBlob, Feed, FeedView, FileDetail};
use serde::{Deserialize, Serialize};

/// `ok`/`code`/`err` triple present on every collector response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    /// Whether the request succeeded
    #[serde(default)]
    pub ok: bool,
    /// Error code when `ok` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Error message when `ok` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ResponseStatus {
    /// Successful status
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// Failed status with code and message
    pub fn failure(code: i64, err: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: Some(code),
            err: Some(err.into()),
        }
    }

    /// `Ok(())` when `ok` is true, else [`RemoteError::Rejected`]
    pub fn check(&self) -> std::result::Result<(), RemoteError> {
        if self.ok {
            Ok(())
        } else {
            Err(RemoteError::Rejected {
                code: self.code,
                message: self.err.clone().unwrap_or_default(),
            })
        }
    }
}

/// `getFeedViews` request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetFeedViewsRequest {
    /// Feed to describe
    pub feed_id: String,
    /// Explicit views, `None` for all
    pub feed_view_ids: Option<Vec<String>>,
    /// Only return active views
    pub active_only: bool,
}

/// `getFeedViews` response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetFeedViewsResponse {
    /// Response status
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Feed metadata
    #[serde(default)]
    pub feed: Option<Feed>,
    /// View metadata
    #[serde(default)]
    pub views: Option<Vec<FeedView>>,
    /// Key envelopes for the views' content keys
    #[serde(default)]
    pub keys: Option<serde_json::Value>,
}

/// `getFeedData` request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFeedDataRequest {
    /// Feed of the view
    pub feed_id: String,
    /// View being downloaded
    pub feed_view_id: String,
    /// Only records saved after this date, epoch milliseconds (0 = all)
    pub batch_start: i64,
    /// Page size
    pub limit: usize,
    /// Records already received in this run
    pub skip: usize,
}

/// One data record reference in a `getFeedData` page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDataRecord {
    /// Blob reference on the file host
    pub data_fuuid: String,
    /// Save date, epoch milliseconds
    pub save_date: i64,
    /// Collector-side record id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_id: Option<String>,
}

/// `getFeedData` response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetFeedDataResponse {
    /// Response status
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Page records; empty ends pagination
    #[serde(default)]
    pub items: Vec<FeedDataRecord>,
    /// Key envelopes for the page's records
    #[serde(default)]
    pub keys: Option<serde_json::Value>,
}

/// Decryption parameters of an attached file, as uploaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFileDecryption {
    /// Content key id
    pub cle_id: Option<String>,
    /// Cipher format identifier
    pub format: String,
    /// Cipher nonce
    pub nonce: String,
    /// Compression applied before encryption
    pub compression: Option<String>,
}

/// Reference to a still-encrypted file attached to an uploaded item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    /// File unique identifier on the file host
    pub fuuid: String,
    /// How to decrypt the file
    pub decryption: AttachedFileDecryption,
}

impl From<&FileDetail> for AttachedFile {
    fn from(detail: &FileDetail) -> Self {
        Self {
            fuuid: detail.fuuid.clone(),
            decryption: AttachedFileDecryption {
                cle_id: detail.key_id.clone(),
                format: detail.format.clone(),
                nonce: detail.nonce.clone(),
                compression: detail.compression.clone(),
            },
        }
    }
}

/// One encrypted item of an `insertViewData` batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDataItem {
    /// Deterministic item id (upsert key on the collector)
    pub data_id: String,
    /// Feed of the view
    pub feed_id: String,
    /// View the item belongs to
    pub feed_view_id: String,
    /// Encrypted cleartext, with the content key id attached
    pub encrypted_data: EncryptedBlob,
    /// Publication date, epoch milliseconds
    pub pub_date: i64,
    /// Group id for grouped items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Attached files (pictures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<AttachedFile>>,
}

/// `insertViewData` command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertViewDataCommand {
    /// View receiving the batch
    pub feed_view_id: String,
    /// Feed of the view
    pub feed_id: String,
    /// Batch items
    pub data: Vec<ViewDataItem>,
    /// Discard the view's existing data before applying the batch
    pub truncate: bool,
    /// Ask the collector to deduplicate (always false, ids are deterministic)
    pub deduplicate: bool,
}

/// Request/response client for the collector service
#[async_trait::async_trait]
pub trait CollectorClient: Send + Sync {
    /// Feed, view metadata and key envelopes in one round trip
    async fn get_feed_views(
        &self,
        request: &GetFeedViewsRequest,
    ) -> std::result::Result<GetFeedViewsResponse, RemoteError>;

    /// One page of data records
    async fn get_feed_data(
        &self,
        request: &GetFeedDataRequest,
    ) -> std::result::Result<GetFeedDataResponse, RemoteError>;

    /// Upload one batch of encrypted items
    async fn insert_view_data(
        &self,
        command: &InsertViewDataCommand,
    ) -> std::result::Result<ResponseStatus, RemoteError>;
}

/// Raw blob access on the file host (blobs stay encrypted)
#[async_trait::async_trait]
pub trait FileHost: Send + Sync {
    /// Download a blob by file unique identifier
    async fn download_file(&self, fuuid: &str) -> std::result::Result<Vec<u8>, RemoteError>;
}

/// [`FileHost`] over HTTP: `GET {url}/filehost/files/{fuuid}`
pub struct HttpFileHost {
    http_client: reqwest::Client,
    base_url: url::Url,
}

impl HttpFileHost {
    /// Create a file host client from configuration
    ///
    /// # Errors
    /// Returns [`Error::Config`] if no URL is configured or it does not parse,
    /// or if the HTTP client cannot be built.
    pub fn new(config: &FileHostConfig) -> crate::error::Result<Self> {
        let raw = config.url.as_deref().ok_or_else(|| Error::Config {
            message: "file host URL is not configured".to_string(),
            key: Some("filehost.url".to_string()),
        })?;
        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let base_url = url::Url::parse(&normalized).map_err(|e| Error::Config {
            message: format!("invalid file host URL '{raw}': {e}"),
            key: Some("filehost.url".to_string()),
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("datasource-mapper")
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {e}"),
                key: None,
            })?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn file_url(&self, fuuid: &str) -> std::result::Result<url::Url, RemoteError> {
        self.base_url
            .join(&format!("filehost/files/{fuuid}"))
            .map_err(|e| RemoteError::Transport(format!("invalid file url for {fuuid}: {e}")))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl FileHost for HttpFileHost {
    async fn download_file(&self, fuuid: &str) -> std::result::Result<Vec<u8>, RemoteError> {
        let url = self.file_url(fuuid)?;
        tracing::debug!(fuuid, %url, "Downloading file");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }
}
