use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{completed, post_json, read_u32, CompletionProvider, SessionSlot};
use crate::agents::completion::{CompletionRequest, CompletionResult, TokenUsage};
use crate::errors::PrismError;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    client: Client,
    session: SessionSlot,
}

impl GeminiProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GEMINI_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session: SessionSlot::default(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        "google"
    }

    fn initialize(&self, api_key: &str, temperature: f32) -> Result<(), PrismError> {
        self.session.install("Google", api_key, temperature)
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, PrismError> {
        let session = self.session.current("google")?;
        let payload = generate_payload(request, session.temperature_for(request));
        let call = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &session.api_key)
            .json(&payload);
        let body = match post_json(call, "Gemini").await {
            Ok(body) => body,
            Err(message) => return Ok(CompletionResult::failure(message)),
        };
        let text = extract_content(&body);
        if text.is_empty() {
            if let Some(reason) = block_reason(&body) {
                return Ok(CompletionResult::failure(format!(
                    "Gemini API Error: prompt was blocked ({reason})"
                )));
            }
        }
        Ok(completed(request, text, extract_usage(&body)))
    }
}

fn generate_payload(request: &CompletionRequest, temperature: f32) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": request.max_tokens,
        }
    })
}

fn extract_content(body: &Value) -> String {
    body.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn block_reason(body: &Value) -> Option<&str> {
    body.get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
}

fn extract_usage(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usageMetadata")?;
    let prompt = read_u32(usage, "promptTokenCount")?;
    let completion = read_u32(usage, "candidatesTokenCount").unwrap_or(0);
    let mut out = TokenUsage::new(prompt, completion);
    if let Some(total) = read_u32(usage, "totalTokenCount") {
        out.total_tokens = total;
    }
    Some(out)
}
