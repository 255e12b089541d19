use std::env;

use super::error::CopyGenerationError;

/// Supported hosted LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Selection strategy that determines which backend handles a generation
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    /// Pick the first available backend, falling through to the next one
    /// when a call fails outright.
    Auto,
    /// Always use a specific backend.
    Single(ProviderKind),
}

impl ProviderSelection {
    const ENV_KEY: &'static str = "COPYFORGE_LLM_PROVIDER";

    pub fn from_environment() -> Result<Option<Self>, CopyGenerationError> {
        match env::var(Self::ENV_KEY) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                Self::parse(trimmed).map(Some)
            }
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(CopyGenerationError::Configuration(
                "COPYFORGE_LLM_PROVIDER contains invalid UTF-8".to_string(),
            )),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CopyGenerationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ProviderSelection::Auto),
            "gemini" => Ok(ProviderSelection::Single(ProviderKind::Gemini)),
            "openai" => Ok(ProviderSelection::Single(ProviderKind::OpenAi)),
            other => Err(CopyGenerationError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn choose(&self, available: &[ProviderKind]) -> Result<ProviderKind, CopyGenerationError> {
        match self {
            ProviderSelection::Single(kind) => {
                if available.contains(kind) {
                    Ok(*kind)
                } else {
                    Err(CopyGenerationError::ProviderUnavailable(
                        kind.as_str().into(),
                    ))
                }
            }
            ProviderSelection::Auto => available
                .first()
                .copied()
                .ok_or(CopyGenerationError::ProviderNotConfigured),
        }
    }
}
