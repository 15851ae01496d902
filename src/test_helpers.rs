//! Shared test fakes: collector, file host and a transparent cipher.

use crate::collector::{
    CollectorClient, FeedDataRecord, FileHost, GetFeedDataRequest, GetFeedDataResponse,
    GetFeedViewsRequest, GetFeedViewsResponse, InsertViewDataCommand, ResponseStatus,
};
use crate::config::Config;
use crate::crypto::ContentCipher;
use crate::downloader::RecordEnvelope;
use crate::error::{CryptoError, RemoteError};
use crate::types::{ContentKey, EncryptedBlob, Feed, FeedTrigger, FeedView, FileDetail, ResolvedJob};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const FEED_TYPE: &str = "web.scraper.python_custom";

/// Cipher that keeps cleartext as-is and tags blobs with the key secret,
/// so decrypting with the wrong key fails.
pub(crate) struct FakeCipher;

fn key_tag(key: &ContentKey) -> String {
    format!("nonce-{}", String::from_utf8_lossy(&key.secret))
}

impl ContentCipher for FakeCipher {
    fn open_key_envelopes(
        &self,
        envelopes: &serde_json::Value,
    ) -> Result<Vec<ContentKey>, CryptoError> {
        let entries = envelopes
            .get("cles")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CryptoError::KeyEnvelope("missing cles".into()))?;
        entries
            .iter()
            .map(|entry| {
                let id = entry.get("cle_id").and_then(|v| v.as_str());
                let secret = entry.get("secret").and_then(|v| v.as_str());
                match (id, secret) {
                    (Some(id), Some(secret)) => Ok(ContentKey::new(id, secret.as_bytes().to_vec())),
                    _ => Err(CryptoError::KeyEnvelope("bad entry".into())),
                }
            })
            .collect()
    }

    fn decrypt(&self, key: &ContentKey, blob: &EncryptedBlob) -> Result<Vec<u8>, CryptoError> {
        if blob.nonce != key_tag(key) {
            return Err(CryptoError::Decrypt(format!("wrong key {}", key.key_id)));
        }
        Ok(blob.ciphertext_base64.as_bytes().to_vec())
    }

    fn encrypt(&self, key: &ContentKey, cleartext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
        Ok(EncryptedBlob {
            key_id: None,
            format: "fake".into(),
            nonce: key_tag(key),
            ciphertext_base64: String::from_utf8_lossy(cleartext).into_owned(),
            compression: None,
        })
    }
}

pub(crate) fn test_key(key_id: &str) -> ContentKey {
    ContentKey::new(key_id, format!("secret-{key_id}").into_bytes())
}

/// Key envelope set understood by [`FakeCipher`]
pub(crate) fn key_envelopes(key_ids: &[&str]) -> serde_json::Value {
    let cles: Vec<_> = key_ids
        .iter()
        .map(|id| json!({"cle_id": id, "secret": format!("secret-{id}")}))
        .collect();
    json!({ "cles": cles })
}

/// Encrypt `text` under the test key `key_id`, with the key id attached
pub(crate) fn seal(key_id: &str, text: &str) -> EncryptedBlob {
    let mut blob = FakeCipher
        .encrypt(&test_key(key_id), text.as_bytes())
        .unwrap();
    blob.key_id = Some(key_id.to_string());
    blob
}

pub(crate) fn file_detail(fuuid: &str) -> FileDetail {
    FileDetail {
        fuuid: fuuid.to_string(),
        format: "mgs4".into(),
        nonce: format!("nonce-{fuuid}"),
        key_id: Some("kfile".into()),
        compression: None,
    }
}

/// zlib-compressed record envelope, optionally with an encrypted file map
pub(crate) fn record_blob(key_id: &str, data: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let (encrypted_files_map, details) = if files.is_empty() {
        (None, None)
    } else {
        let map: BTreeMap<&str, &str> = files.iter().copied().collect();
        let map_json = serde_json::to_string(&map).unwrap();
        let details = files.iter().map(|(_, fuuid)| file_detail(fuuid)).collect();
        (Some(seal(key_id, &map_json)), Some(details))
    };
    let envelope = RecordEnvelope {
        encrypted_data: seal(key_id, data),
        encrypted_files_map,
        files: details,
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(serde_json::to_string(&envelope).unwrap().as_bytes())
        .unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn data_page(records: &[(&str, i64)], key_ids: &[&str]) -> GetFeedDataResponse {
    GetFeedDataResponse {
        status: ResponseStatus::success(),
        items: records
            .iter()
            .map(|(fuuid, save_date)| FeedDataRecord {
                data_fuuid: fuuid.to_string(),
                save_date: *save_date,
                data_id: None,
            })
            .collect(),
        keys: Some(key_envelopes(key_ids)),
    }
}

pub(crate) fn view(feed_view_id: &str, key_id: &str, mapping: Option<&str>) -> FeedView {
    FeedView {
        feed_view_id: feed_view_id.to_string(),
        active: Some(true),
        mapping_code: mapping.map(str::to_string),
        encrypted_data: seal(key_id, r#"{"name": "test view"}"#),
    }
}

pub(crate) fn resolved_job(feed_view_id: &str, reset: bool, mapping: Option<&str>) -> ResolvedJob {
    ResolvedJob {
        trigger: Arc::new(FeedTrigger::for_view("feed-1", feed_view_id)),
        reset,
        feed: Arc::new(Feed {
            feed_id: "feed-1".into(),
            feed_type: FEED_TYPE.into(),
        }),
        view: view(feed_view_id, "kview", mapping),
        view_configuration: json!({"name": "test view"}),
        content_key: test_key("kview"),
    }
}

pub(crate) fn test_config(data_dir: &std::path::Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

/// Scripted collector recording every request it receives
#[derive(Default)]
pub(crate) struct FakeCollector {
    pub(crate) views_response: Mutex<Option<Result<GetFeedViewsResponse, RemoteError>>>,
    pub(crate) view_requests: Mutex<Vec<GetFeedViewsRequest>>,
    /// Pages per feed view; an exhausted script answers with an empty page
    pub(crate) pages: Mutex<HashMap<String, VecDeque<Result<GetFeedDataResponse, RemoteError>>>>,
    pub(crate) data_requests: Mutex<Vec<GetFeedDataRequest>>,
    pub(crate) page_delay: Mutex<Option<Duration>>,
    pub(crate) uploads: Mutex<Vec<InsertViewDataCommand>>,
    /// Upload index (0-based) that gets rejected
    pub(crate) reject_upload_at: Mutex<Option<usize>>,
    active_pages: AtomicUsize,
    pub(crate) max_active_pages: AtomicUsize,
    /// While set, uploads park until [`release_uploads`](Self::release_uploads)
    pub(crate) hold_uploads: AtomicBool,
    pub(crate) parked_uploads: AtomicUsize,
    upload_release: tokio::sync::Notify,
}

impl FakeCollector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_views(&self, response: Result<GetFeedViewsResponse, RemoteError>) {
        *self.views_response.lock().unwrap() = Some(response);
    }

    pub(crate) fn push_page(
        &self,
        feed_view_id: &str,
        page: Result<GetFeedDataResponse, RemoteError>,
    ) {
        self.pages
            .lock()
            .unwrap()
            .entry(feed_view_id.to_string())
            .or_default()
            .push_back(page);
    }

    pub(crate) fn data_requests(&self) -> Vec<GetFeedDataRequest> {
        self.data_requests.lock().unwrap().clone()
    }

    pub(crate) fn uploads(&self) -> Vec<InsertViewDataCommand> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn release_uploads(&self) {
        self.hold_uploads.store(false, Ordering::SeqCst);
        self.upload_release.notify_waiters();
    }
}

#[async_trait::async_trait]
impl CollectorClient for FakeCollector {
    async fn get_feed_views(
        &self,
        request: &GetFeedViewsRequest,
    ) -> Result<GetFeedViewsResponse, RemoteError> {
        self.view_requests.lock().unwrap().push(request.clone());
        self.views_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(RemoteError::Transport("no views scripted".into())))
    }

    async fn get_feed_data(
        &self,
        request: &GetFeedDataRequest,
    ) -> Result<GetFeedDataResponse, RemoteError> {
        self.data_requests.lock().unwrap().push(request.clone());
        let active = self.active_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_pages.fetch_max(active, Ordering::SeqCst);

        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&request.feed_view_id)
            .and_then(VecDeque::pop_front);
        self.active_pages.fetch_sub(1, Ordering::SeqCst);
        next.unwrap_or_else(|| Ok(data_page(&[], &[])))
    }

    async fn insert_view_data(
        &self,
        command: &InsertViewDataCommand,
    ) -> Result<ResponseStatus, RemoteError> {
        if self.hold_uploads.load(Ordering::SeqCst) {
            let released = self.upload_release.notified();
            self.parked_uploads.fetch_add(1, Ordering::SeqCst);
            released.await;
        }
        let mut uploads = self.uploads.lock().unwrap();
        let index = uploads.len();
        uploads.push(command.clone());
        if *self.reject_upload_at.lock().unwrap() == Some(index) {
            return Ok(ResponseStatus::failure(2, "batch refused"));
        }
        Ok(ResponseStatus::success())
    }
}

/// In-memory file host
#[derive(Default)]
pub(crate) struct FakeFileHost {
    pub(crate) files: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFileHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn insert(&self, fuuid: &str, body: Vec<u8>) {
        self.files.lock().unwrap().insert(fuuid.to_string(), body);
    }
}

#[async_trait::async_trait]
impl FileHost for FakeFileHost {
    async fn download_file(&self, fuuid: &str) -> Result<Vec<u8>, RemoteError> {
        self.files
            .lock()
            .unwrap()
            .get(fuuid)
            .cloned()
            .ok_or(RemoteError::Http { status: 404 })
    }
}
