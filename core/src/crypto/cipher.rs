use std::fmt;
use std::sync::{Arc, Mutex};

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::PrismError;
use crate::storage::LocalStorage;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Storage key holding the raw device key as a JSON array of bytes.
pub const ENCRYPTION_KEY_STORAGE_KEY: &str = "encryption-key";

/// A 256-bit AES-GCM key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Import raw key bytes; `None` unless exactly 32 bytes are supplied.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Derive a key by hashing arbitrary material with SHA-256.
    pub fn derive(material: &[u8]) -> Self {
        let digest = Sha256::digest(material);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypt `plaintext` under a fresh random nonce.
///
/// Returns base64(nonce ‖ ciphertext ‖ tag).
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<String, PrismError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let sealed = key
        .cipher()
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(sealing_failed)?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&sealed);
    Ok(B64_ENGINE.encode(blob))
}

fn sealing_failed(_: aes_gcm::Error) -> PrismError {
    PrismError::Encryption
}

/// Reverse [`encrypt`]. Every failure mode collapses into
/// [`PrismError::Decryption`].
pub fn decrypt(blob: &str, key: &EncryptionKey) -> Result<String, PrismError> {
    let bytes = B64_ENGINE
        .decode(blob.trim().as_bytes())
        .map_err(|_| PrismError::Decryption)?;
    if bytes.len() < NONCE_LEN + TAG_LEN {
        return Err(PrismError::Decryption);
    }
    let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
    let opened = key
        .cipher()
        .decrypt(GenericArray::from_slice(nonce_bytes), sealed)
        .map_err(|_| PrismError::Decryption)?;
    String::from_utf8(opened).map_err(|_| PrismError::Decryption)
}

/// Loads the device key from storage, generating and persisting one when
/// it is missing or unreadable.
pub struct KeyManager {
    storage: Arc<dyn LocalStorage>,
    creation: Mutex<()>,
}

impl KeyManager {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            creation: Mutex::new(()),
        }
    }

    pub fn get_or_create_key(&self) -> Result<EncryptionKey, PrismError> {
        // Serialises check-then-create so concurrent callers agree on one key.
        let _guard = self
            .creation
            .lock()
            .map_err(|_| PrismError::Storage("key lock poisoned".into()))?;

        if let Some(existing) = self.storage.get_item(ENCRYPTION_KEY_STORAGE_KEY)? {
            match import_key(&existing) {
                Some(key) => return Ok(key),
                None => log::warn!(
                    target: "prism::crypto",
                    "stored encryption key is unreadable, generating a new one"
                ),
            }
        }

        let key = EncryptionKey::generate();
        let exported = serde_json::to_string(&key.as_bytes().to_vec())
            .map_err(|err| PrismError::Storage(err.to_string()))?;
        self.storage.set_item(ENCRYPTION_KEY_STORAGE_KEY, &exported)?;
        Ok(key)
    }
}

fn import_key(raw: &str) -> Option<EncryptionKey> {
    let bytes: Vec<u8> = serde_json::from_str(raw).ok()?;
    EncryptionKey::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn sealing_failure_is_not_a_storage_error() {
        let err = sealing_failed(aes_gcm::Error);
        assert!(matches!(err, PrismError::Encryption));
        assert_eq!(err.code(), "SEC-1002");
    }

    #[test]
    fn round_trips_assorted_strings() {
        let key = EncryptionKey::generate();
        let long = "x".repeat(4096);
        for text in ["sk-test-123", "ünïcödé ключ 🔑", long.as_str()] {
            let blob = encrypt(text, &key).unwrap();
            assert_eq!(decrypt(&blob, &key).unwrap(), text);
        }
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = EncryptionKey::generate();
        assert_ne!(encrypt("same", &key).unwrap(), encrypt("same", &key).unwrap());
    }

    #[test]
    fn blob_layout_is_nonce_ciphertext_tag() {
        let key = EncryptionKey::generate();
        let blob = encrypt("abcd", &key).unwrap();
        let raw = STANDARD.decode(blob).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn flipping_any_byte_fails_decryption() {
        let key = EncryptionKey::generate();
        let blob = encrypt("sk-live-abcdef", &key).unwrap();
        let raw = STANDARD.decode(&blob).unwrap();
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let result = decrypt(&STANDARD.encode(&tampered), &key);
            assert_eq!(result, Err(PrismError::Decryption), "byte {i}");
        }
    }

    #[test]
    fn wrong_key_and_garbage_are_indistinguishable() {
        let blob = encrypt("secret", &EncryptionKey::generate()).unwrap();
        let other = EncryptionKey::generate();
        assert_eq!(decrypt(&blob, &other), Err(PrismError::Decryption));
        assert_eq!(decrypt("not base64!!", &other), Err(PrismError::Decryption));
        assert_eq!(decrypt("AAAA", &other), Err(PrismError::Decryption));
    }

    #[test]
    fn key_manager_reuses_persisted_key() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        let manager = KeyManager::new(storage.clone());
        let first = manager.get_or_create_key().unwrap();
        let second = manager.get_or_create_key().unwrap();
        let blob = encrypt("hello", &first).unwrap();
        assert_eq!(decrypt(&blob, &second).unwrap(), "hello");

        // A later session over the same storage sees the same key.
        let later = KeyManager::new(storage.clone()).get_or_create_key().unwrap();
        assert_eq!(later, first);

        let stored: Vec<u8> =
            serde_json::from_str(&storage.get_item(ENCRYPTION_KEY_STORAGE_KEY).unwrap().unwrap())
                .unwrap();
        assert_eq!(stored.len(), KEY_LEN);
    }

    #[test]
    fn key_manager_replaces_unimportable_key() {
        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        storage.set_item(ENCRYPTION_KEY_STORAGE_KEY, "[1,2,3]").unwrap();
        let key = KeyManager::new(storage.clone()).get_or_create_key().unwrap();
        let stored = storage.get_item(ENCRYPTION_KEY_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(import_key(&stored), Some(key));
    }

    #[test]
    fn derived_keys_are_deterministic() {
        assert_eq!(EncryptionKey::derive(b"salt"), EncryptionKey::derive(b"salt"));
        assert_ne!(EncryptionKey::derive(b"salt"), EncryptionKey::derive(b"pepper"));
    }
}
