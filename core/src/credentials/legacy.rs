//! Fingerprint-keyed credential storage used by earlier releases.
//!
//! The AES key is derived from the device salt, so entries written on one
//! device/locale only open there. Kept so existing installs can migrate
//! through [`CredentialStore::migrate_legacy`](super::CredentialStore::migrate_legacy).

use std::sync::Arc;

use crate::crypto::{compute_salt, decrypt, encrypt, DeviceSignals, EncryptionKey};
use crate::errors::PrismError;
use crate::storage::LocalStorage;

const LEGACY_PREFIX: &str = "encrypted_";
const KEY_DOMAIN: &[u8] = b"prism/legacy-credential/v1";

pub struct LegacyCredentialStore {
    storage: Arc<dyn LocalStorage>,
    key: EncryptionKey,
}

impl LegacyCredentialStore {
    /// Build a store keyed to this device's detected signals.
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_signals(storage, &DeviceSignals::detect())
    }

    pub fn with_signals(storage: Arc<dyn LocalStorage>, signals: &DeviceSignals) -> Self {
        let salt = compute_salt(signals);
        let mut material = KEY_DOMAIN.to_vec();
        material.extend_from_slice(salt.as_bytes());
        Self {
            storage,
            key: EncryptionKey::derive(&material),
        }
    }

    /// Empty keys are ignored, as before.
    pub fn store_encrypted_key(&self, key_name: &str, api_key: &str) -> Result<(), PrismError> {
        if api_key.is_empty() {
            log::warn!(target: "prism::credentials", "ignoring empty legacy key for {key_name}");
            return Ok(());
        }
        let blob = encrypt(api_key, &self.key)?;
        self.storage
            .set_item(&format!("{LEGACY_PREFIX}{key_name}"), &blob)
    }

    pub fn get_decrypted_key(&self, key_name: &str) -> Result<Option<String>, PrismError> {
        let Some(blob) = self.storage.get_item(&format!("{LEGACY_PREFIX}{key_name}"))? else {
            return Ok(None);
        };
        match decrypt(&blob, &self.key) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) => Ok(None),
            Err(err) => {
                log::warn!(target: "prism::credentials", "legacy key for {key_name} unreadable: {err}");
                Ok(None)
            }
        }
    }

    pub fn remove_encrypted_key(&self, key_name: &str) -> Result<(), PrismError> {
        self.storage
            .remove_item(&format!("{LEGACY_PREFIX}{key_name}"))
    }
}
