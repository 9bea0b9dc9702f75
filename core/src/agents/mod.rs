pub mod catalog;
pub mod completion;
pub mod config;
pub mod providers;
pub mod registry;

pub use catalog::{builtin_descriptors, ModelVariant, ProviderDescriptor};
pub use completion::{approx_tokens, CompletionRequest, CompletionResult, TokenUsage};
pub use config::{resolve_request, SettingsSnapshot, SettingsStore};
pub use providers::{build_client, CompletionProvider, HttpConfig};
pub use registry::{ProviderRegistry, RegisteredProvider};
