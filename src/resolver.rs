//! Resolution of a trigger into per-view jobs.
//!
//! One `getFeedViews` round trip yields the feed, its active views and the
//! key envelopes; each view's configuration is decrypted with its content
//! key, which proves the key before any data is downloaded.

use std::sync::Arc;
use std::time::Duration;

use crate::collector::{CollectorClient, GetFeedViewsRequest};
use crate::crypto::{ContentCipher, KeyRing};
use crate::error::{PreparationError, RemoteError};
use crate::types::{FeedView, ProcessJob, ResolvedJob};

/// Turns queued triggers into [`ResolvedJob`]s
#[derive(Clone)]
pub struct JobResolver {
    collector: Arc<dyn CollectorClient>,
    cipher: Arc<dyn ContentCipher>,
    request_timeout: Duration,
}

impl JobResolver {
    /// Create a resolver over the collector and cipher
    pub fn new(
        collector: Arc<dyn CollectorClient>,
        cipher: Arc<dyn ContentCipher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            collector,
            cipher,
            request_timeout,
        }
    }

    /// Resolve `job` into one job per active view in scope, in collector order
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole trigger: no job is returned when the
    /// metadata request fails, or when any view's key is missing or invalid.
    pub async fn resolve(&self, job: &ProcessJob) -> Result<Vec<ResolvedJob>, PreparationError> {
        let trigger = &job.trigger;
        let request = GetFeedViewsRequest {
            feed_id: trigger.feed_id.clone(),
            feed_view_ids: trigger.view_ids(),
            active_only: true,
        };

        let response = tokio::time::timeout(
            self.request_timeout,
            self.collector.get_feed_views(&request),
        )
        .await
        .map_err(|_| PreparationError::Timeout)?
        .map_err(|e| match e {
            RemoteError::Timeout => PreparationError::Timeout,
            other => PreparationError::Rejected(other),
        })?;
        response
            .status
            .check()
            .map_err(PreparationError::Rejected)?;

        let feed = response
            .feed
            .ok_or_else(|| PreparationError::Malformed("feed missing".into()))?;
        let views: Vec<FeedView> = response
            .views
            .ok_or_else(|| PreparationError::Malformed("views missing".into()))?
            .into_iter()
            .filter(FeedView::is_active)
            .collect();
        if views.is_empty() {
            tracing::debug!(feed_id = %feed.feed_id, "No active feed views");
            return Ok(Vec::new());
        }
        // Keys are only needed once there is a view to open
        let envelopes = response
            .keys
            .ok_or_else(|| PreparationError::Malformed("keys missing".into()))?;

        let keys = KeyRing::open(self.cipher.as_ref(), &envelopes).map_err(|source| {
            PreparationError::InvalidKey {
                feed_view_id: views
                    .first()
                    .map(|v| v.feed_view_id.clone())
                    .unwrap_or_default(),
                source,
            }
        })?;

        let feed = Arc::new(feed);
        let mut jobs = Vec::with_capacity(views.len());
        for view in views {
            let (view_configuration, content_key) = self.open_view(&view, &keys)?;
            jobs.push(ResolvedJob {
                trigger: Arc::clone(trigger),
                reset: job.reset,
                feed: Arc::clone(&feed),
                view,
                view_configuration,
                content_key,
            });
        }

        tracing::debug!(
            feed_id = %feed.feed_id,
            views = jobs.len(),
            reset = job.reset,
            "Resolved feed views"
        );
        Ok(jobs)
    }

    fn open_view(
        &self,
        view: &FeedView,
        keys: &KeyRing,
    ) -> Result<(serde_json::Value, crate::types::ContentKey), PreparationError> {
        let feed_view_id = &view.feed_view_id;
        let key_id = view.encrypted_data.key_id.as_deref().ok_or_else(|| {
            PreparationError::Malformed(format!("feed view {feed_view_id} has no cle_id"))
        })?;
        let key = keys
            .get(key_id)
            .ok_or_else(|| PreparationError::MissingKey {
                feed_view_id: feed_view_id.clone(),
                key_id: key_id.to_string(),
            })?;

        let cleartext = self
            .cipher
            .decrypt(key, &view.encrypted_data)
            .map_err(|source| PreparationError::InvalidKey {
                feed_view_id: feed_view_id.clone(),
                source,
            })?;
        let configuration = serde_json::from_slice(&cleartext).map_err(|e| {
            PreparationError::Malformed(format!(
                "configuration of feed view {feed_view_id}: {e}"
            ))
        })?;
        Ok((configuration, key.clone()))
    }
}
