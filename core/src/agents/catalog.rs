//! Built-in provider catalog.

use serde::Serialize;

use crate::errors::PrismError;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVariant {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
    pub default_temperature: Option<f32>,
}

impl ModelVariant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            max_tokens: None,
            default_temperature: None,
        }
    }

    pub fn with_budget(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }
}

/// One vendor and its selectable models. Always holds at least one model;
/// the first is the default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    id: String,
    name: String,
    description: Option<String>,
    key_url: Option<String>,
    default_temperature: f32,
    max_temperature: f32,
    default_max_tokens: u32,
    models: Vec<ModelVariant>,
}

impl ProviderDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        models: Vec<ModelVariant>,
    ) -> Result<Self, PrismError> {
        let id = id.into();
        if models.is_empty() {
            return Err(PrismError::Configuration(format!(
                "provider {id} must offer at least one model"
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            description: None,
            key_url: None,
            default_temperature: DEFAULT_TEMPERATURE,
            max_temperature: 2.0,
            default_max_tokens: 1000,
            models,
        })
    }

    pub fn with_details(mut self, description: &str, key_url: &str) -> Self {
        self.description = Some(description.to_string());
        self.key_url = Some(key_url.to_string());
        self
    }

    pub fn with_limits(mut self, default_max_tokens: u32, max_temperature: f32) -> Self {
        self.default_max_tokens = default_max_tokens;
        self.max_temperature = max_temperature;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn key_url(&self) -> Option<&str> {
        self.key_url.as_deref()
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temperature
    }

    /// Highest temperature the vendor accepts.
    pub fn max_temperature(&self) -> f32 {
        self.max_temperature
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.default_max_tokens
    }

    pub fn models(&self) -> &[ModelVariant] {
        &self.models
    }

    pub fn default_model(&self) -> &ModelVariant {
        // Non-empty by construction.
        &self.models[0]
    }

    pub fn model(&self, model_id: &str) -> Option<&ModelVariant> {
        self.models.iter().find(|m| m.id == model_id)
    }
}

struct VariantSeed {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

struct ProviderSeed {
    id: &'static str,
    display: &'static str,
    description: &'static str,
    key_url: &'static str,
    default_max_tokens: u32,
    max_temperature: f32,
    models: &'static [VariantSeed],
}

const fn variant(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> VariantSeed {
    VariantSeed {
        id,
        name,
        description,
        max_tokens,
        temperature,
    }
}

const PROVIDER_SEEDS: &[ProviderSeed] = &[
    ProviderSeed {
        id: "openai",
        display: "OpenAI",
        description: "OpenAI's models, including GPT-4 and GPT-3.5",
        key_url: "https://platform.openai.com/api-keys",
        default_max_tokens: 1000,
        max_temperature: 2.0,
        models: &[
            variant("gpt-4-turbo-preview", "GPT-4 Turbo", "Most capable model, best at complex tasks", Some(4096), Some(0.7)),
            variant("gpt-4o-mini", "GPT-4o Mini", "Optimized for efficiency and performance", Some(4096), Some(0.7)),
            variant("gpt-4", "GPT-4", "More reliable, slightly slower than Turbo", Some(8192), Some(0.7)),
            variant("gpt-3.5-turbo", "GPT-3.5 Turbo", "Faster and more cost-effective", Some(4096), Some(0.7)),
        ],
    },
    ProviderSeed {
        id: "anthropic",
        display: "Anthropic",
        description: "Anthropic's Claude models",
        key_url: "https://console.anthropic.com/settings/keys",
        default_max_tokens: 1024,
        max_temperature: 1.0,
        models: &[
            variant("claude-3-7-sonnet-20250219", "Claude 3.7 Sonnet", "Most advanced Claude model", None, None),
            variant("claude-3-5-haiku-20241022", "Claude 3.5 Haiku", "Fast and efficient model", None, None),
            variant("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet v2", "Balanced performance and capabilities", None, None),
            variant("claude-3-5-sonnet-20240620", "Claude 3.5 Sonnet", "First Claude 3.5 Sonnet release", None, None),
            variant("claude-3-opus-20240229", "Claude 3 Opus", "Most powerful Claude 3 model", None, None),
            variant("claude-3-sonnet-20240229", "Claude 3 Sonnet", "Balanced performance and speed", None, None),
            variant("claude-3-haiku-20240307", "Claude 3 Haiku", "Fast and efficient model", None, None),
        ],
    },
    ProviderSeed {
        id: "google",
        display: "Google",
        description: "Google's Gemini models",
        key_url: "https://makersuite.google.com/app/apikey",
        default_max_tokens: 8192,
        max_temperature: 2.0,
        models: &[
            variant("gemini-2.5-pro-preview-03-25", "Gemini 2.5 Pro Preview", "Enhanced thinking and reasoning, multimodal understanding, advanced coding", Some(8192), None),
            variant("gemini-2.0-flash", "Gemini 2.0 Flash", "Next generation features, speed and multimodal generation", Some(8192), None),
            variant("gemini-2.0-flash-lite", "Gemini 2.0 Flash-Lite", "Cost efficiency and low latency", Some(8192), None),
            variant("gemini-1.5-flash", "Gemini 1.5 Flash", "Fast and versatile performance across a diverse variety of tasks", Some(8192), None),
            variant("gemini-1.5-flash-8b", "Gemini 1.5 Flash-8B", "High volume and lower intelligence tasks", Some(8192), None),
            variant("gemini-1.5-pro", "Gemini 1.5 Pro", "Complex reasoning tasks requiring more intelligence", Some(8192), None),
        ],
    },
    ProviderSeed {
        id: "deepseek",
        display: "DeepSeek",
        description: "DeepSeek's chat and reasoning models",
        key_url: "https://platform.deepseek.com/",
        default_max_tokens: 4096,
        max_temperature: 2.0,
        models: &[
            variant("deepseek-chat", "DeepSeek Chat", "DeepSeek-V3 chat model for general purpose use", Some(4096), Some(0.7)),
            variant("deepseek-reasoner", "DeepSeek Reasoner", "DeepSeek-R1 model optimized for reasoning tasks", Some(4096), Some(0.7)),
        ],
    },
];

/// Descriptors for the four bundled vendors, in display order.
pub fn builtin_descriptors() -> Vec<ProviderDescriptor> {
    PROVIDER_SEEDS
        .iter()
        .map(|seed| ProviderDescriptor {
            id: seed.id.to_string(),
            name: seed.display.to_string(),
            description: Some(seed.description.to_string()),
            key_url: Some(seed.key_url.to_string()),
            default_temperature: DEFAULT_TEMPERATURE,
            max_temperature: seed.max_temperature,
            default_max_tokens: seed.default_max_tokens,
            models: seed
                .models
                .iter()
                .map(|m| ModelVariant {
                    id: m.id.to_string(),
                    name: m.name.to_string(),
                    description: Some(m.description.to_string()),
                    max_tokens: m.max_tokens,
                    default_temperature: m.temperature,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_provider_has_models() {
        let descriptors = builtin_descriptors();
        let ids: Vec<_> = descriptors.iter().map(|d| d.id()).collect();
        assert_eq!(ids, ["openai", "anthropic", "google", "deepseek"]);
        for d in &descriptors {
            assert!(!d.models().is_empty(), "{}", d.id());
        }
    }

    #[test]
    fn first_variant_is_default() {
        let openai = builtin_descriptors().remove(0);
        assert_eq!(openai.default_model().id, "gpt-4-turbo-preview");
        assert_eq!(openai.model("gpt-4").and_then(|m| m.max_tokens), Some(8192));
        assert!(openai.model("gpt-5").is_none());
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(ProviderDescriptor::new("x", "X", Vec::new()).is_err());
    }
}
