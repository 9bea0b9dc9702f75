use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::catalog::ProviderDescriptor;
use super::completion::CompletionRequest;
use crate::errors::PrismError;
use crate::storage::LocalStorage;

pub const MODEL_SETTINGS_KEY: &str = "ai-model-settings";
pub const ENABLED_PROVIDERS_KEY: &str = "selected-providers";
pub const TEMPERATURES_KEY: &str = "modelTemperatures";

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Settings as read once at the start of a dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub models: BTreeMap<String, String>,
    pub temperatures: BTreeMap<String, f32>,
    pub enabled_providers: Vec<String>,
}

impl SettingsSnapshot {
    pub fn model_for(&self, provider_id: &str) -> Option<&str> {
        self.models.get(provider_id).map(String::as_str)
    }

    pub fn temperature_for(&self, provider_id: &str) -> Option<f32> {
        self.temperatures.get(provider_id).copied()
    }
}

pub struct SettingsStore {
    storage: Arc<dyn LocalStorage>,
    catalog: Vec<ProviderDescriptor>,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn LocalStorage>, catalog: Vec<ProviderDescriptor>) -> Self {
        Self { storage, catalog }
    }

    pub fn catalog(&self) -> &[ProviderDescriptor] {
        &self.catalog
    }

    pub fn descriptor(&self, provider_id: &str) -> Result<&ProviderDescriptor, PrismError> {
        self.catalog
            .iter()
            .find(|d| d.id() == provider_id)
            .ok_or_else(|| PrismError::UnknownProvider(provider_id.to_string()))
    }

    pub fn snapshot(&self) -> Result<SettingsSnapshot, PrismError> {
        let models: BTreeMap<String, String> = read_json(self.storage.as_ref(), MODEL_SETTINGS_KEY)?;
        let temperatures: BTreeMap<String, f32> =
            read_json(self.storage.as_ref(), TEMPERATURES_KEY)?;
        let enabled_providers = match read_json::<Option<Vec<String>>>(
            self.storage.as_ref(),
            ENABLED_PROVIDERS_KEY,
        )? {
            Some(ids) => ids,
            None => self.catalog.iter().map(|d| d.id().to_string()).collect(),
        };
        Ok(SettingsSnapshot {
            models,
            temperatures,
            enabled_providers,
        })
    }

    pub fn select_model(&self, provider_id: &str, model_id: &str) -> Result<(), PrismError> {
        let descriptor = self.descriptor(provider_id)?;
        if descriptor.model(model_id).is_none() {
            return Err(PrismError::Configuration(format!(
                "{} has no model named {model_id}",
                descriptor.name()
            )));
        }
        let mut models: BTreeMap<String, String> =
            read_json(self.storage.as_ref(), MODEL_SETTINGS_KEY)?;
        models.insert(provider_id.to_string(), model_id.to_string());
        write_json(self.storage.as_ref(), MODEL_SETTINGS_KEY, &models)
    }

    pub fn set_temperature(&self, provider_id: &str, temperature: f32) -> Result<(), PrismError> {
        self.descriptor(provider_id)?;
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(PrismError::InvalidTemperature(temperature));
        }
        let mut temperatures: BTreeMap<String, f32> =
            read_json(self.storage.as_ref(), TEMPERATURES_KEY)?;
        temperatures.insert(provider_id.to_string(), temperature);
        write_json(self.storage.as_ref(), TEMPERATURES_KEY, &temperatures)
    }

    /// Stores the enabled set and returns what was kept. Unknown ids and
    /// repeats are dropped; order is preserved.
    pub fn set_enabled_providers<I, S>(&self, ids: I) -> Result<Vec<String>, PrismError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for id in ids {
            let id = id.as_ref();
            if self.descriptor(id).is_err() {
                log::warn!(target: "prism::settings", "ignoring unknown provider id {id}");
                continue;
            }
            if !kept.iter().any(|k| k == id) {
                kept.push(id.to_string());
            }
        }
        write_json(self.storage.as_ref(), ENABLED_PROVIDERS_KEY, &kept)?;
        Ok(kept)
    }

    pub fn reset_model_selections(&self) -> Result<(), PrismError> {
        let defaults: BTreeMap<String, String> = self
            .catalog
            .iter()
            .map(|d| (d.id().to_string(), d.default_model().id.clone()))
            .collect();
        write_json(self.storage.as_ref(), MODEL_SETTINGS_KEY, &defaults)
    }
}

/// Builds the call for one provider from the round's settings.
pub fn resolve_request(
    descriptor: &ProviderDescriptor,
    prompt: &str,
    settings: &SettingsSnapshot,
) -> Result<CompletionRequest, PrismError> {
    if prompt.trim().is_empty() {
        return Err(PrismError::EmptyPrompt);
    }
    let variant = settings
        .model_for(descriptor.id())
        .and_then(|id| descriptor.model(id))
        .unwrap_or_else(|| descriptor.default_model());
    let temperature = settings
        .temperature_for(descriptor.id())
        .or(variant.default_temperature)
        .unwrap_or(descriptor.default_temperature())
        .clamp(MIN_TEMPERATURE, descriptor.max_temperature());
    Ok(CompletionRequest {
        provider_id: descriptor.id().to_string(),
        model: variant.id.clone(),
        prompt: prompt.to_string(),
        temperature: Some(temperature),
        max_tokens: variant.max_tokens.unwrap_or(descriptor.default_max_tokens()),
    })
}

fn read_json<T>(storage: &dyn LocalStorage, key: &str) -> Result<T, PrismError>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = storage.get_item(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            log::warn!(target: "prism::settings", "discarding unreadable {key}: {err}");
            Ok(T::default())
        }
    }
}

fn write_json<T: Serialize>(storage: &dyn LocalStorage, key: &str, value: &T) -> Result<(), PrismError> {
    let raw = serde_json::to_string(value)
        .map_err(|err| PrismError::Storage(format!("failed to encode {key}: {err}")))?;
    storage.set_item(key, &raw)
}
