use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Length-based guess for vendors that omit usage from their reply.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self::new(approx_tokens(prompt) as u32, approx_tokens(completion) as u32)
    }

    /// Percentage of the usage bar to fill. The bar scales to twice the
    /// observed total (at least 1000) but never beyond `max_tokens`.
    pub fn share_of_budget(&self, max_tokens: u32) -> f64 {
        let scale = u64::from(self.total_tokens).saturating_mul(2).max(1000);
        let effective = u64::from(max_tokens).min(scale);
        if effective == 0 {
            return 0.0;
        }
        (f64::from(self.total_tokens) / effective as f64 * 100.0).min(100.0)
    }
}

pub fn approx_tokens(text: &str) -> usize {
    let chars = text.chars().count() as f32;
    let words = text.split_whitespace().count() as f32;
    let char_est = (chars / 4.0).ceil();
    let word_est = (words * 1.1).ceil();
    char_est.max(word_est).max(1.0) as usize
}

/// A fully resolved call against one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub provider_id: String,
    pub model: String,
    pub prompt: String,
    /// Overrides the temperature given to `initialize` when set.
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// Outcome of one provider call. `error` is set on failure and `text` is
/// then empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub text: String,
    /// Milliseconds between dispatch and settlement.
    pub response_time: f64,
    pub model: Option<String>,
    /// Counts reported by the vendor.
    pub token_usage: Option<TokenUsage>,
    /// Counts guessed from text length when the vendor reported none.
    pub estimated_usage: Option<TokenUsage>,
    pub error: Option<String>,
}

impl CompletionResult {
    pub fn success(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_reported_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_estimated_usage(mut self, usage: TokenUsage) -> Self {
        self.estimated_usage = Some(usage);
        self
    }

    pub fn with_response_time(mut self, elapsed: Duration) -> Self {
        self.response_time = elapsed.as_secs_f64() * 1000.0;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_tokens_has_floor() {
        assert_eq!(approx_tokens(""), 1);
        assert_eq!(approx_tokens("abcdefgh"), 2);
        assert_eq!(approx_tokens("one two three four five six seven eight"), 10);
    }

    #[test]
    fn usage_bar_scales_with_total() {
        let small = TokenUsage::new(100, 150);
        assert!((small.share_of_budget(4096) - 25.0).abs() < 1e-9);

        let large = TokenUsage::new(1500, 1500);
        assert!((large.share_of_budget(4096) - 3000.0 / 4096.0 * 100.0).abs() < 1e-9);

        let over = TokenUsage::new(3000, 2000);
        assert_eq!(over.share_of_budget(4096), 100.0);
        assert_eq!(over.share_of_budget(0), 0.0);
    }

    #[test]
    fn failure_carries_no_text() {
        let result = CompletionResult::failure("boom");
        assert!(result.is_error());
        assert!(result.text.is_empty());
        assert!(result.token_usage.is_none());
    }

    #[test]
    fn response_time_is_milliseconds() {
        let result = CompletionResult::success("hi", "m").with_response_time(Duration::from_millis(250));
        assert!((result.response_time - 250.0).abs() < 1e-6);
    }
}
