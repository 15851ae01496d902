//! Content cipher seam.
//!
//! The symmetric cipher and the key-envelope scheme are supplied by the
//! embedding process; the pipeline only decides which key opens which blob.

use crate::error::CryptoError;
use crate::types::{ContentKey, EncryptedBlob};
use std::collections::HashMap;

/// Symmetric encryption and key-envelope opening
pub trait ContentCipher: Send + Sync {
    /// Open a key-envelope set returned by the collector.
    fn open_key_envelopes(
        &self,
        envelopes: &serde_json::Value,
    ) -> std::result::Result<Vec<ContentKey>, CryptoError>;

    /// Decrypt a blob with its content key.
    fn decrypt(
        &self,
        key: &ContentKey,
        blob: &EncryptedBlob,
    ) -> std::result::Result<Vec<u8>, CryptoError>;

    /// Encrypt cleartext under a content key. `key_id` of the result is left for the caller.
    fn encrypt(
        &self,
        key: &ContentKey,
        cleartext: &[u8],
    ) -> std::result::Result<EncryptedBlob, CryptoError>;
}

/// Content keys indexed by key id, opened once per response
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: HashMap<String, ContentKey>,
}

impl KeyRing {
    /// Open `envelopes` with `cipher` and index the keys
    pub fn open(
        cipher: &dyn ContentCipher,
        envelopes: &serde_json::Value,
    ) -> std::result::Result<Self, CryptoError> {
        let keys = cipher
            .open_key_envelopes(envelopes)?
            .into_iter()
            .map(|key| (key.key_id.clone(), key))
            .collect();
        Ok(Self { keys })
    }

    /// Key with the given id
    pub fn get(&self, key_id: &str) -> Option<&ContentKey> {
        self.keys.get(key_id)
    }

    /// Number of keys in the ring
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring holds no key
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
