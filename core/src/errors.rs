use thiserror::Error;

/// Error catalogue shared by every Prism subsystem.
///
/// Per-provider call failures never surface through this type past the
/// adapter boundary; they are folded into the provider's
/// [`CompletionResult`](crate::agents::CompletionResult) instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrismError {
    #[error("{0}")] Configuration(String),
    #[error("{provider} adapter used before initialize()")] NotInitialized { provider: String },
    #[error("{0}")] Transport(String),
    #[error("Stored data could not be decrypted")] Decryption,
    #[error("Value could not be encrypted")] Encryption,
    #[error("Local storage unavailable: {0}")] Storage(String),
    #[error("Unknown provider: {0}")] UnknownProvider(String),
    #[error("Prompt must not be empty")] EmptyPrompt,
    #[error("Temperature {0} is outside 0.0..=2.0")] InvalidTemperature(f32),
    #[error("A newer dispatch replaced this one")] Superseded,
}

impl PrismError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CFG-1001",
            Self::NotInitialized { .. } => "ADP-1001",
            Self::Transport(_) => "NET-1001",
            Self::Decryption => "SEC-1001",
            Self::Encryption => "SEC-1002",
            Self::Storage(_) => "STO-1001",
            Self::UnknownProvider(_) => "CFG-1002",
            Self::EmptyPrompt => "DSP-1001",
            Self::InvalidTemperature(_) => "CFG-1003",
            Self::Superseded => "DSP-1002",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "No usable API key is configured for the enabled providers.",
            Self::NotInitialized { .. } => "A provider adapter was called before its credential was supplied.",
            Self::Transport(_) => "The provider could not be reached or rejected the request.",
            Self::Decryption => "The stored value was written with a different key or has been altered.",
            Self::Encryption => "The cipher refused the value; nothing was written.",
            Self::Storage(_) => "Local storage could not be read or written (full or disabled).",
            Self::UnknownProvider(_) => "No provider with the requested id is registered.",
            Self::EmptyPrompt => "A dispatch needs a non-empty prompt.",
            Self::InvalidTemperature(_) => "Sampling temperature must lie between 0.0 and 2.0.",
            Self::Superseded => "Another prompt was submitted while this one was being prepared.",
        }
    }
}

impl From<rusqlite::Error> for PrismError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for PrismError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
