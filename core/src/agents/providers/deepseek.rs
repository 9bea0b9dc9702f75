//! DeepSeek exposes an OpenAI-compatible chat endpoint under its own host.

use reqwest::Client;

use super::OpenAiCompatibleProvider;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

pub fn provider(client: Client) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new("deepseek", "Deepseek", client, DEEPSEEK_BASE_URL)
}
