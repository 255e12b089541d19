mod error;
mod gemini;
mod openai;
mod retry;
mod selection;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

pub use error::CopyGenerationError;
pub use gemini::GeminiGenerator;
pub use openai::ChatCompletionGenerator;
pub use retry::{is_retryable_status, RetryPolicy};
pub use selection::{ProviderKind, ProviderSelection};

use crate::config::Config;
use crate::prompt::CopyBrief;

/// Copy returned by a backend, tagged with the vendor that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedCopy {
    pub text: String,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone)]
pub struct CopyProvider {
    selection: ProviderSelection,
    gemini: Option<GeminiGenerator>,
    openai: Option<ChatCompletionGenerator>,
}

impl CopyProvider {
    /// Builds the provider stack from config plus environment. Missing API
    /// keys disable a backend rather than failing startup; the form should
    /// stay reachable so the operator can see what is misconfigured.
    pub fn from_environment(config: &Config) -> Result<Self, CopyGenerationError> {
        let selection = match ProviderSelection::from_environment()? {
            Some(selection) => selection,
            None => ProviderSelection::parse(&config.provider)?,
        };

        let client = build_http_client(config)?;

        let gemini = GeminiGenerator::maybe_from_environment(client.clone(), config)?;
        let openai = ChatCompletionGenerator::maybe_from_environment(client, config)?;

        let available = available_kinds(gemini.as_ref(), openai.as_ref());
        if available.is_empty() {
            warn!("No copy generation backend configured; set GEMINI_API_KEY or OPENAI_API_KEY");
        } else {
            let chosen = selection.choose(&available)?;
            info!("Copy generation provider ready: {}", chosen.as_str());
        }

        if gemini.is_none() {
            debug!("Gemini backend disabled - missing GEMINI_API_KEY");
        }
        if openai.is_none() {
            debug!("OpenAI backend disabled - missing OPENAI_API_KEY");
        }

        Ok(Self {
            selection,
            gemini,
            openai,
        })
    }

    pub fn from_parts(
        selection: ProviderSelection,
        gemini: Option<GeminiGenerator>,
        openai: Option<ChatCompletionGenerator>,
    ) -> Self {
        Self {
            selection,
            gemini,
            openai,
        }
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        available_kinds(self.gemini.as_ref(), self.openai.as_ref())
    }

    pub async fn generate(&self, brief: &CopyBrief) -> Result<GeneratedCopy, CopyGenerationError> {
        let prompt = brief.render_prompt();

        let available = self.available();
        let mut order = match self.selection {
            ProviderSelection::Auto => available,
            ProviderSelection::Single(kind) => vec![kind],
        };

        if order.is_empty() {
            return Err(CopyGenerationError::ProviderNotConfigured);
        }

        let mut last_error = None;
        for provider in order.drain(..) {
            let result = match provider {
                ProviderKind::Gemini => {
                    let backend = self.gemini.as_ref().ok_or_else(|| {
                        CopyGenerationError::ProviderUnavailable("gemini".into())
                    })?;
                    backend.generate(&prompt).await
                }
                ProviderKind::OpenAi => {
                    let backend = self.openai.as_ref().ok_or_else(|| {
                        CopyGenerationError::ProviderUnavailable("openai".into())
                    })?;
                    backend.generate(&prompt).await
                }
            };

            match result {
                Ok(text) => {
                    return Ok(GeneratedCopy {
                        text,
                        provider,
                    })
                }
                Err(err) => {
                    last_error = Some(err);
                    if !matches!(self.selection, ProviderSelection::Auto) {
                        break;
                    }
                    debug!("Provider {} failed, trying next option", provider.as_str());
                }
            }
        }

        Err(last_error.unwrap_or(CopyGenerationError::ProviderNotConfigured))
    }
}

fn build_http_client(config: &Config) -> Result<Client, CopyGenerationError> {
    Client::builder()
        .user_agent("copyforge/0.1")
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|err| {
            CopyGenerationError::Configuration(format!("failed to build HTTP client: {}", err))
        })
}

fn available_kinds(
    gemini: Option<&GeminiGenerator>,
    openai: Option<&ChatCompletionGenerator>,
) -> Vec<ProviderKind> {
    let mut kinds = Vec::with_capacity(2);
    if gemini.is_some() {
        kinds.push(ProviderKind::Gemini);
    }
    if openai.is_some() {
        kinds.push(ProviderKind::OpenAi);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_without_backends_reports_not_configured() {
        let provider = CopyProvider::from_parts(ProviderSelection::Auto, None, None);
        let brief = CopyBrief::new("a", "b", "c");
        let err = provider.generate(&brief).await.unwrap_err();
        assert!(matches!(err, CopyGenerationError::ProviderNotConfigured));
    }

    #[tokio::test]
    async fn single_selection_without_backend_is_unavailable() {
        let provider =
            CopyProvider::from_parts(ProviderSelection::Single(ProviderKind::Gemini), None, None);
        let brief = CopyBrief::new("a", "b", "c");
        let err = provider.generate(&brief).await.unwrap_err();
        assert!(matches!(err, CopyGenerationError::ProviderUnavailable(name) if name == "gemini"));
    }
}
