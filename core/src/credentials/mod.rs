//! Encrypted per-provider API key storage.
//!
//! Keys are encrypted with the device key from [`KeyManager`] and stored as
//! one blob per provider. Callers only ever see plaintext. A blob that can no
//! longer be decrypted reads as "no key" so the provider simply becomes
//! unavailable.

pub mod legacy;

use std::sync::Arc;

use crate::crypto::{decrypt, encrypt, KeyManager};
use crate::errors::PrismError;
use crate::storage::LocalStorage;

pub use legacy::LegacyCredentialStore;

pub const API_KEY_PREFIX: &str = "api-key:";

fn storage_key(provider_id: &str) -> String {
    format!("{API_KEY_PREFIX}{provider_id}")
}

pub struct CredentialStore {
    storage: Arc<dyn LocalStorage>,
    keys: KeyManager,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        let keys = KeyManager::new(storage.clone());
        Self { storage, keys }
    }

    /// Encrypt and persist `plaintext`, replacing any previous key.
    pub fn save_key(&self, provider_id: &str, plaintext: &str) -> Result<(), PrismError> {
        let trimmed = plaintext.trim();
        if trimmed.is_empty() {
            return Err(PrismError::Configuration(format!(
                "API key for {provider_id} must not be empty"
            )));
        }
        let key = self.keys.get_or_create_key()?;
        let blob = encrypt(trimmed, &key)?;
        self.storage.set_item(&storage_key(provider_id), &blob)?;
        log::info!(target: "prism::credentials", "stored API key for {provider_id}");
        Ok(())
    }

    /// Decrypt the stored key for `provider_id`.
    ///
    /// Absent and undecryptable keys both yield `Ok(None)`; only storage
    /// failures are errors.
    pub fn load_key(&self, provider_id: &str) -> Result<Option<String>, PrismError> {
        let Some(blob) = self.storage.get_item(&storage_key(provider_id))? else {
            return Ok(None);
        };
        let key = self.keys.get_or_create_key()?;
        match decrypt(&blob, &key) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(err) => {
                log::warn!(
                    target: "prism::credentials",
                    "[{}] API key for {provider_id} is unreadable and will be ignored: {err}",
                    err.code()
                );
                Ok(None)
            }
        }
    }

    pub fn has_key(&self, provider_id: &str) -> Result<bool, PrismError> {
        Ok(self.load_key(provider_id)?.is_some())
    }

    /// The subset of `provider_ids` that currently have a usable key.
    pub fn configured_providers<'a, I>(&self, provider_ids: I) -> Result<Vec<String>, PrismError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut configured = Vec::new();
        for id in provider_ids {
            if self.has_key(id)? {
                configured.push(id.to_string());
            }
        }
        Ok(configured)
    }

    pub fn clear_key(&self, provider_id: &str) -> Result<(), PrismError> {
        self.storage.remove_item(&storage_key(provider_id))
    }

    /// Remove every stored API key. The device key itself is kept.
    pub fn clear_all(&self) -> Result<(), PrismError> {
        for key in self.storage.keys()? {
            if key.starts_with(API_KEY_PREFIX) {
                self.storage.remove_item(&key)?;
            }
        }
        Ok(())
    }

    /// Move readable credentials out of the legacy store.
    ///
    /// Returns the provider ids that were migrated. Legacy entries that
    /// cannot be decrypted are left in place.
    pub fn migrate_legacy<'a, I>(
        &self,
        legacy: &LegacyCredentialStore,
        provider_ids: I,
    ) -> Result<Vec<String>, PrismError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut migrated = Vec::new();
        for id in provider_ids {
            if let Some(plaintext) = legacy.get_decrypted_key(id)? {
                self.save_key(id, &plaintext)?;
                legacy.remove_encrypted_key(id)?;
                migrated.push(id.to_string());
            }
        }
        if !migrated.is_empty() {
            log::info!(
                target: "prism::credentials",
                "migrated legacy credentials for {}",
                migrated.join(", ")
            );
        }
        Ok(migrated)
    }
}
