//! Common test utilities for datasource-mapper integration tests

use async_trait::async_trait;
use datasource_mapper::{
    CollectorClient, ContentCipher, ContentKey, CryptoError, EncryptedBlob, Feed, FeedView,
    GetFeedDataRequest, GetFeedDataResponse, GetFeedViewsRequest, GetFeedViewsResponse,
    InsertViewDataCommand, RemoteError, ResponseStatus,
};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde_json::json;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

pub const FEED_TYPE: &str = "web.scraper.python_custom";

/// Cipher storing cleartext verbatim; the nonce names the key that sealed it
pub struct PlainCipher;

impl ContentCipher for PlainCipher {
    fn open_key_envelopes(&self, envelopes: &serde_json::Value) -> Result<Vec<ContentKey>, CryptoError> {
        let map = envelopes
            .as_object()
            .ok_or_else(|| CryptoError::KeyEnvelope("expected an object".into()))?;
        Ok(map
            .iter()
            .map(|(id, secret)| ContentKey::new(id.as_str(), secret.to_string().into_bytes()))
            .collect())
    }

    fn decrypt(&self, key: &ContentKey, blob: &EncryptedBlob) -> Result<Vec<u8>, CryptoError> {
        if blob.nonce != format!("sealed-{}", key.key_id) {
            return Err(CryptoError::Decrypt("wrong key".into()));
        }
        Ok(blob.ciphertext_base64.clone().into_bytes())
    }

    fn encrypt(&self, key: &ContentKey, cleartext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
        Ok(EncryptedBlob {
            key_id: None,
            format: "plain".into(),
            nonce: format!("sealed-{}", key.key_id),
            ciphertext_base64: String::from_utf8_lossy(cleartext).into_owned(),
            compression: None,
        })
    }
}

pub fn seal(key_id: &str, text: &str) -> serde_json::Value {
    json!({
        "cle_id": key_id,
        "format": "plain",
        "nonce": format!("sealed-{key_id}"),
        "ciphertext_base64": text,
    })
}

pub fn keys(ids: &[&str]) -> serde_json::Value {
    ids.iter()
        .map(|id| (id.to_string(), json!(format!("secret-{id}"))))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// zlib record envelope as stored on the file host
pub fn record_blob(key_id: &str, document: &str) -> Vec<u8> {
    let envelope = json!({ "encrypted_data": seal(key_id, document) });
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(envelope.to_string().as_bytes())
        .expect("compress record");
    encoder.finish().expect("finish record")
}

pub fn views_response(view_ids: &[&str], mapping: &str) -> GetFeedViewsResponse {
    let views = view_ids
        .iter()
        .map(|id| FeedView {
            feed_view_id: id.to_string(),
            active: Some(true),
            mapping_code: Some(mapping.to_string()),
            encrypted_data: serde_json::from_value(seal("kview", r#"{"name":"news"}"#))
                .expect("view blob"),
        })
        .collect();
    GetFeedViewsResponse {
        status: ResponseStatus::success(),
        feed: Some(Feed {
            feed_id: "feed-1".into(),
            feed_type: FEED_TYPE.into(),
        }),
        views: Some(views),
        keys: Some(keys(&["kview"])),
    }
}

/// In-memory collector with scripted pages
#[derive(Default)]
pub struct ScriptedCollector {
    pub views: Mutex<Option<GetFeedViewsResponse>>,
    pub pages: Mutex<VecDeque<GetFeedDataResponse>>,
    pub data_requests: Mutex<Vec<GetFeedDataRequest>>,
    pub uploads: Mutex<Vec<InsertViewDataCommand>>,
}

impl ScriptedCollector {
    pub fn push_page(&self, records: &[(&str, i64)], key_ids: &[&str]) {
        let items = records
            .iter()
            .map(|(fuuid, save_date)| {
                serde_json::from_value(json!({"data_fuuid": fuuid, "save_date": save_date}))
                    .expect("record")
            })
            .collect();
        self.pages.lock().expect("pages").push_back(GetFeedDataResponse {
            status: ResponseStatus::success(),
            items,
            keys: Some(keys(key_ids)),
        });
    }

    pub fn uploads(&self) -> Vec<InsertViewDataCommand> {
        self.uploads.lock().expect("uploads").clone()
    }

    pub fn data_requests(&self) -> Vec<GetFeedDataRequest> {
        self.data_requests.lock().expect("requests").clone()
    }
}

#[async_trait]
impl CollectorClient for ScriptedCollector {
    async fn get_feed_views(
        &self,
        _request: &GetFeedViewsRequest,
    ) -> Result<GetFeedViewsResponse, RemoteError> {
        self.views
            .lock()
            .expect("views")
            .clone()
            .ok_or_else(|| RemoteError::Transport("no views".into()))
    }

    async fn get_feed_data(
        &self,
        request: &GetFeedDataRequest,
    ) -> Result<GetFeedDataResponse, RemoteError> {
        self.data_requests.lock().expect("requests").push(request.clone());
        Ok(self
            .pages
            .lock()
            .expect("pages")
            .pop_front()
            .unwrap_or(GetFeedDataResponse {
                status: ResponseStatus::success(),
                items: Vec::new(),
                keys: None,
            }))
    }

    async fn insert_view_data(
        &self,
        command: &InsertViewDataCommand,
    ) -> Result<ResponseStatus, RemoteError> {
        self.uploads.lock().expect("uploads").push(command.clone());
        Ok(ResponseStatus::success())
    }
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

