use std::sync::Arc;

use reqwest::Client;

use super::catalog::{builtin_descriptors, ProviderDescriptor};
use super::providers::{
    deepseek, AnthropicProvider, CompletionProvider, GeminiProvider, OpenAiCompatibleProvider,
};
use crate::errors::PrismError;

#[derive(Clone)]
pub struct RegisteredProvider {
    pub descriptor: ProviderDescriptor,
    pub adapter: Arc<dyn CompletionProvider>,
}

/// Ordered set of providers keyed by id. Registration order is display
/// order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four bundled vendors sharing one HTTP client.
    pub fn with_default_providers(client: Client) -> Result<Self, PrismError> {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            let adapter: Arc<dyn CompletionProvider> = match descriptor.id() {
                "openai" => Arc::new(OpenAiCompatibleProvider::openai(client.clone())),
                "anthropic" => Arc::new(AnthropicProvider::new(client.clone())),
                "google" => Arc::new(GeminiProvider::new(client.clone())),
                "deepseek" => Arc::new(deepseek::provider(client.clone())),
                other => return Err(PrismError::UnknownProvider(other.to_string())),
            };
            registry.register(descriptor, adapter)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        descriptor: ProviderDescriptor,
        adapter: Arc<dyn CompletionProvider>,
    ) -> Result<(), PrismError> {
        if adapter.provider_id() != descriptor.id() {
            return Err(PrismError::Configuration(format!(
                "adapter {} registered under provider {}",
                adapter.provider_id(),
                descriptor.id()
            )));
        }
        if self.get(descriptor.id()).is_some() {
            return Err(PrismError::Configuration(format!(
                "provider {} is already registered",
                descriptor.id()
            )));
        }
        self.entries.push(RegisteredProvider {
            descriptor,
            adapter,
        });
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<&RegisteredProvider> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.id() == provider_id)
    }

    /// Like [`get`](Self::get) but an unknown id is an error.
    pub fn require(&self, provider_id: &str) -> Result<&RegisteredProvider, PrismError> {
        self.get(provider_id)
            .ok_or_else(|| PrismError::UnknownProvider(provider_id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.descriptor.id())
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
