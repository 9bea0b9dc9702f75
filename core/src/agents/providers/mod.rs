//! Vendor adapters.
//!
//! Every adapter folds transport and vendor failures into the returned
//! [`CompletionResult`]. The only `Err` an adapter hands back is
//! [`PrismError::NotInitialized`], which signals a wiring bug rather than a
//! failed call.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::completion::{CompletionRequest, CompletionResult, TokenUsage};
use crate::errors::PrismError;

pub mod anthropic;
pub mod deepseek;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

pub const EMPTY_REPLY_TEXT: &str = "No response generated";

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Installs the credential and baseline temperature. Must precede
    /// `generate_completion`.
    fn initialize(&self, api_key: &str, temperature: f32) -> Result<(), PrismError>;

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, PrismError>;
}

#[derive(Clone)]
pub struct Session {
    pub api_key: String,
    pub temperature: f32,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Session {
    pub fn temperature_for(&self, request: &CompletionRequest) -> f32 {
        request.temperature.unwrap_or(self.temperature)
    }
}

#[derive(Debug, Default)]
pub struct SessionSlot(RwLock<Option<Session>>);

impl SessionSlot {
    pub fn install(&self, label: &str, api_key: &str, temperature: f32) -> Result<(), PrismError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(PrismError::Configuration(format!("{label} API key is required")));
        }
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Session {
            api_key: api_key.to_string(),
            temperature,
        });
        Ok(())
    }

    pub fn current(&self, provider_id: &str) -> Result<Session, PrismError> {
        let guard = match self.0.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().ok_or_else(|| PrismError::NotInitialized {
            provider: provider_id.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            user_agent: "Prism-Core/0.1".to_string(),
        }
    }
}

pub fn build_client(config: &HttpConfig) -> Result<Client, PrismError> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|err| PrismError::Configuration(format!("failed to construct HTTP client: {err}")))
}

/// Sends the request and returns the decoded JSON body, or the message to
/// show in the provider's panel.
pub(crate) async fn post_json(request: RequestBuilder, label: &str) -> Result<Value, String> {
    let response = request.send().await.map_err(|err| {
        log::warn!(target: "prism::providers", "{label} request failed: {err}");
        PrismError::Transport(format!("Failed to generate completion: {err}")).to_string()
    })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| format!("Failed to generate completion: {err}"))?;
    if !status.is_success() {
        log::warn!(target: "prism::providers", "{label} returned HTTP {}", status.as_u16());
        let message = vendor_error_message(&body).unwrap_or_else(|| {
            format!("An error occurred with the {label} API (HTTP {})", status.as_u16())
        });
        return Err(format!("{label} API Error: {message}"));
    }
    serde_json::from_str(&body)
        .map_err(|err| format!("{label} API Error: unreadable response body ({err})"))
}

/// Pulls a human message out of a vendor error payload.
pub(crate) fn vendor_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error");
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Wraps extracted text into a result. Replies with no text keep the
/// placeholder and carry no usage estimate.
pub(crate) fn completed(
    request: &CompletionRequest,
    text: String,
    reported: Option<TokenUsage>,
) -> CompletionResult {
    if text.trim().is_empty() {
        return CompletionResult::success(EMPTY_REPLY_TEXT, &request.model).with_reported_usage(reported);
    }
    let result = CompletionResult::success(text, &request.model);
    match reported {
        Some(usage) => result.with_reported_usage(Some(usage)),
        None => {
            let estimate = TokenUsage::estimate(&request.prompt, &result.text);
            result.with_estimated_usage(estimate)
        }
    }
}

pub(crate) fn read_u32(value: &Value, field: &str) -> Option<u32> {
    value.get(field).and_then(Value::as_u64).map(|v| v as u32)
}
