//! Record blob decoding: zlib envelope, content decryption and file map.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};

use crate::crypto::{ContentCipher, KeyRing};
use crate::error::DownloadError;
use crate::types::{EncryptedBlob, FileDetail};

/// Record blob as stored on the file host, after zlib decompression
#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
pub(crate) struct RecordEnvelope {
    pub(crate) encrypted_data: EncryptedBlob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) encrypted_files_map: Option<EncryptedBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) files: Option<Vec<FileDetail>>,
}

/// One line of a staging file: the decrypted source document and the
/// attached files keyed by their source path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// Decrypted source document (feed XML, scraped payload, ...)
    pub data: String,
    /// Attached files keyed by the path/URL they were fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileDetail>>,
}

/// Decompress, decode and decrypt one record blob
pub(crate) fn decode_record(
    fuuid: &str,
    compressed: &[u8],
    keys: &KeyRing,
    cipher: &dyn ContentCipher,
) -> Result<StagedRecord, DownloadError> {
    let invalid = |reason: String| DownloadError::InvalidRecord {
        fuuid: fuuid.to_string(),
        reason,
    };

    let mut raw = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|e| invalid(format!("zlib: {e}")))?;
    let envelope: RecordEnvelope =
        serde_json::from_slice(&raw).map_err(|e| invalid(format!("json: {e}")))?;

    let data = open_blob(fuuid, &envelope.encrypted_data, keys, cipher)?;
    let data = String::from_utf8(data).map_err(|e| invalid(format!("data: {e}")))?;

    let files = match &envelope.encrypted_files_map {
        Some(blob) => {
            let map = open_blob(fuuid, blob, keys, cipher)?;
            let map: BTreeMap<String, String> =
                serde_json::from_slice(&map).map_err(|e| invalid(format!("files map: {e}")))?;
            Some(attach_file_details(
                fuuid,
                map,
                envelope.files.as_deref().unwrap_or_default(),
            ))
        }
        None => None,
    };

    Ok(StagedRecord { data, files })
}

fn open_blob(
    fuuid: &str,
    blob: &EncryptedBlob,
    keys: &KeyRing,
    cipher: &dyn ContentCipher,
) -> Result<Vec<u8>, DownloadError> {
    let key_id = blob
        .key_id
        .as_deref()
        .ok_or_else(|| DownloadError::InvalidRecord {
            fuuid: fuuid.to_string(),
            reason: "encrypted content has no cle_id".into(),
        })?;
    let key = keys.get(key_id).ok_or_else(|| DownloadError::MissingKey {
        fuuid: fuuid.to_string(),
        key_id: key_id.to_string(),
    })?;
    cipher
        .decrypt(key, blob)
        .map_err(|e| DownloadError::InvalidRecord {
            fuuid: fuuid.to_string(),
            reason: e.to_string(),
        })
}

/// Join `{path: fuuid}` with the record's file details; unknown fuuids are skipped
fn attach_file_details(
    fuuid: &str,
    map: BTreeMap<String, String>,
    details: &[FileDetail],
) -> BTreeMap<String, FileDetail> {
    map.into_iter()
        .filter_map(|(path, file_fuuid)| {
            match details.iter().find(|d| d.fuuid == file_fuuid) {
                Some(detail) => Some((path, detail.clone())),
                None => {
                    tracing::warn!(
                        record = fuuid,
                        file = %file_fuuid,
                        path = %path,
                        "File detail missing from record, skipping"
                    );
                    None
                }
            }
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeCipher, key_envelopes, record_blob};
    use std::io::Write;

    fn ring(ids: &[&str]) -> KeyRing {
        KeyRing::open(&FakeCipher, &key_envelopes(ids)).unwrap()
    }

    #[test]
    fn decodes_data_and_file_map() {
        let blob = record_blob("k1", "<rss/>", &[("https://img/a.jpg", "f-a")]);

        let record = decode_record("r1", &blob, &ring(&["k1"]), &FakeCipher).unwrap();

        assert_eq!(record.data, "<rss/>");
        let files = record.files.unwrap();
        assert_eq!(files["https://img/a.jpg"].fuuid, "f-a");
    }

    #[test]
    fn record_without_files_has_no_map() {
        let blob = record_blob("k1", "<rss/>", &[]);

        let record = decode_record("r1", &blob, &ring(&["k1"]), &FakeCipher).unwrap();

        assert!(record.files.is_none());
        let line = serde_json::to_string(&record).unwrap();
        assert_eq!(line, r#"{"data":"<rss/>"}"#);
    }

    #[test]
    fn unknown_key_is_reported() {
        let blob = record_blob("k2", "<rss/>", &[]);

        let err = decode_record("r1", &blob, &ring(&["k1"]), &FakeCipher).unwrap_err();

        assert!(
            matches!(err, DownloadError::MissingKey { ref key_id, .. } if key_id == "k2"),
            "got {err:?}"
        );
    }

    #[test]
    fn garbage_blob_is_invalid() {
        let err = decode_record("r1", b"not zlib", &ring(&["k1"]), &FakeCipher).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidRecord { .. }));
    }

    #[test]
    fn missing_file_detail_is_skipped() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "f-a".to_string());
        map.insert("b".to_string(), "f-missing".to_string());
        let details = vec![crate::test_helpers::file_detail("f-a")];

        let joined = attach_file_details("r1", map, &details);

        assert_eq!(joined.len(), 1);
        assert!(joined.contains_key("a"));
    }

    #[test]
    fn envelope_accepts_absent_optional_fields() {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        let blob = crate::test_helpers::seal("k1", "x");
        encoder
            .write_all(
                serde_json::json!({ "encrypted_data": blob })
                    .to_string()
                    .as_bytes(),
            )
            .unwrap();
        let compressed = encoder.finish().unwrap();

        let record = decode_record("r1", &compressed, &ring(&["k1"]), &FakeCipher).unwrap();
        assert_eq!(record.data, "x");
    }
}
