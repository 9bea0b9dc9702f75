use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{completed, post_json, read_u32, CompletionProvider, SessionSlot};
use crate::agents::completion::{CompletionRequest, CompletionResult, TokenUsage};
use crate::errors::PrismError;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for vendors speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatibleProvider {
    id: String,
    label: String,
    base_url: String,
    client: Client,
    session: SessionSlot,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: &str, label: &str, client: Client, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session: SessionSlot::default(),
        }
    }

    pub fn openai(client: Client) -> Self {
        Self::new("openai", "OpenAI", client, OPENAI_BASE_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, api_key: &str, temperature: f32) -> Result<(), PrismError> {
        self.session.install(&self.label, api_key, temperature)
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, PrismError> {
        let session = self.session.current(&self.id)?;
        let payload = chat_payload(request, session.temperature_for(request));
        let url = format!("{}/chat/completions", self.base_url);
        let call = self
            .client
            .post(url)
            .bearer_auth(&session.api_key)
            .json(&payload);
        Ok(match post_json(call, &self.label).await {
            Ok(body) => completed(request, extract_content(&body), extract_usage(&body)),
            Err(message) => CompletionResult::failure(message),
        })
    }
}

pub(crate) fn chat_payload(request: &CompletionRequest, temperature: f32) -> Value {
    json!({
        "model": request.model,
        "messages": [{"role": "user", "content": request.prompt}],
        "temperature": temperature,
        "max_tokens": request.max_tokens,
    })
}

fn extract_content(body: &Value) -> String {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_usage(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    let prompt = read_u32(usage, "prompt_tokens")?;
    let completion = read_u32(usage, "completion_tokens")?;
    let mut usage_out = TokenUsage::new(prompt, completion);
    if let Some(total) = read_u32(usage, "total_tokens") {
        usage_out.total_tokens = total;
    }
    Some(usage_out)
}
