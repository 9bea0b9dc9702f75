use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{completed, post_json, read_u32, CompletionProvider, SessionSlot};
use crate::agents::completion::{CompletionRequest, CompletionResult, TokenUsage};
use crate::errors::PrismError;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    base_url: String,
    client: Client,
    session: SessionSlot,
}

impl AnthropicProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, ANTHROPIC_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session: SessionSlot::default(),
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn initialize(&self, api_key: &str, temperature: f32) -> Result<(), PrismError> {
        self.session.install("Anthropic", api_key, temperature)
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, PrismError> {
        let session = self.session.current("anthropic")?;
        let payload = messages_payload(request, session.temperature_for(request));
        let call = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &session.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        Ok(match post_json(call, "Anthropic").await {
            Ok(body) => completed(request, extract_content(&body), extract_usage(&body)),
            Err(message) => CompletionResult::failure(message),
        })
    }
}

fn messages_payload(request: &CompletionRequest, temperature: f32) -> Value {
    json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [{"role": "user", "content": request.prompt}],
        // The Messages API rejects anything above 1.0.
        "temperature": temperature.clamp(0.0, 1.0),
    })
}

fn extract_content(body: &Value) -> String {
    body.get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn extract_usage(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    Some(TokenUsage::new(
        read_u32(usage, "input_tokens")?,
        read_u32(usage, "output_tokens")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temperature: Option<f32>) -> CompletionRequest {
        CompletionRequest {
            provider_id: "anthropic".into(),
            model: "claude-3-5-haiku-20241022".into(),
            prompt: "Hello".into(),
            temperature,
            max_tokens: 1024,
        }
    }

    #[test]
    fn temperature_is_clamped_for_messages_api() {
        let payload = messages_payload(&request(Some(1.7)), 1.7);
        assert_eq!(payload["temperature"].as_f64(), Some(1.0));
        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(payload["messages"][0]["content"], "Hello");
    }

    #[test]
    fn text_blocks_are_joined() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": ", world"}
            ],
            "usage": {"input_tokens": 9, "output_tokens": 4}
        });
        assert_eq!(extract_content(&body), "Hello, world");
        assert_eq!(extract_usage(&body), Some(TokenUsage::new(9, 4)));
    }

    #[tokio::test]
    async fn refuses_to_run_uninitialised() {
        let provider = AnthropicProvider::new(Client::new());
        assert!(matches!(
            provider.generate_completion(&request(None)).await,
            Err(PrismError::NotInitialized { .. })
        ));
    }
}
