//! Core types: feeds, views, keys and the jobs that flow through the pipeline

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A configured external data source, owned by the collector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    /// Feed identifier
    pub feed_id: String,
    /// Source type, selects the parser family (e.g. "web.scraper.python_custom")
    pub feed_type: String,
}

/// Encrypted payload as exchanged with the collector
///
/// The cipher fills `format`, `nonce` and `ciphertext_base64`; the pipeline
/// attaches `key_id` so the receiver knows which content key opens it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Id of the content key that opens this blob
    #[serde(rename = "cle_id", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Cipher format identifier
    pub format: String,
    /// Cipher nonce
    pub nonce: String,
    /// Ciphertext, base64 encoded by the cipher
    pub ciphertext_base64: String,
    /// Compression applied before encryption, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

/// A named extraction configuration over a feed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedView {
    /// View identifier
    pub feed_view_id: String,
    /// Inactive views are skipped during resolution (absent means active)
    #[serde(default)]
    pub active: Option<bool>,
    /// Parser variant for the feed type; the registry default applies when absent
    #[serde(default)]
    pub mapping_code: Option<String>,
    /// View configuration, encrypted under the view's content key
    pub encrypted_data: EncryptedBlob,
}

impl FeedView {
    /// Whether the view takes part in resolution
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }
}

/// Symmetric content key recovered from a key envelope
///
/// Never persisted; the `Debug` output redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey {
    /// Key identifier
    pub key_id: String,
    /// Secret key material
    pub secret: Vec<u8>,
}

impl ContentKey {
    /// Create a content key
    pub fn new(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Decryption parameters of a previously uploaded, still-encrypted file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    /// File unique identifier on the file host
    pub fuuid: String,
    /// Cipher format identifier
    pub format: String,
    /// Cipher nonce
    pub nonce: String,
    /// Content key id
    #[serde(rename = "cle_id", default)]
    pub key_id: Option<String>,
    /// Compression applied before encryption, if any
    #[serde(default)]
    pub compression: Option<String>,
}

/// Trigger payload submitted over the bus
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedTrigger {
    /// Feed to process
    pub feed_id: String,
    /// Single view to process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_view_id: Option<String>,
    /// Views to process (takes precedence over `feed_view_id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_view_ids: Option<Vec<String>>,
    /// Explicit reset request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
}

impl FeedTrigger {
    /// Trigger for every active view of a feed
    pub fn for_feed(feed_id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            ..Self::default()
        }
    }

    /// Trigger for a single view
    pub fn for_view(feed_id: impl Into<String>, feed_view_id: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            feed_view_id: Some(feed_view_id.into()),
            ..Self::default()
        }
    }

    /// Explicit view scope, or `None` for all active views
    pub fn view_ids(&self) -> Option<Vec<String>> {
        match (&self.feed_view_ids, &self.feed_view_id) {
            (Some(ids), _) => Some(ids.clone()),
            (None, Some(id)) => Some(vec![id.clone()]),
            (None, None) => None,
        }
    }
}

/// A queued unit of work: one trigger, before resolution
#[derive(Clone, Debug)]
pub struct ProcessJob {
    /// Originating trigger
    pub trigger: Arc<FeedTrigger>,
    /// Forces full re-download and remote truncation
    pub reset: bool,
}

impl ProcessJob {
    /// Create a job from a trigger
    pub fn new(trigger: FeedTrigger, reset: bool) -> Self {
        Self {
            trigger: Arc::new(trigger),
            reset,
        }
    }
}

/// A per-view job produced by the resolver
///
/// Owns the decrypted view configuration and content key for its lifetime;
/// both are dropped with the job.
#[derive(Clone, Debug)]
pub struct ResolvedJob {
    /// Originating trigger, shared with sibling view jobs
    pub trigger: Arc<FeedTrigger>,
    /// Forces full re-download and remote truncation
    pub reset: bool,
    /// Feed metadata, shared with sibling view jobs
    pub feed: Arc<Feed>,
    /// View metadata
    pub view: FeedView,
    /// Decrypted view configuration
    pub view_configuration: serde_json::Value,
    /// Content key of the view
    pub content_key: ContentKey,
}

impl ResolvedJob {
    /// Feed id of the job
    pub fn feed_id(&self) -> &str {
        &self.feed.feed_id
    }

    /// View id of the job
    pub fn feed_view_id(&self) -> &str {
        &self.view.feed_view_id
    }
}

/// Persisted download progress of a feed view
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingWatermark {
    /// Most recent record save date staged so far, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_date: Option<i64>,
}

impl StagingWatermark {
    /// `batch_start` value for the next getFeedData request (0 = from the beginning)
    pub fn since_ms(&self) -> i64 {
        self.most_recent_date.unwrap_or(0)
    }
}
