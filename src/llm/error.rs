use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyGenerationError {
    #[error("no copy generation provider configured")]
    ProviderNotConfigured,
    #[error("unsupported copy generation provider '{0}'")]
    UnsupportedProvider(String),
    #[error("copy generation provider '{0}' is not available")]
    ProviderUnavailable(String),
    #[error("missing required environment variable: {0}")]
    MissingEnvironment(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("HTTP request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP status {status} from {provider}: {message}")]
    HttpStatus {
        provider: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("unable to parse response from {provider}: {message}")]
    ResponseParse {
        provider: &'static str,
        message: String,
    },
}

impl CopyGenerationError {
    pub fn http(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Http { provider, source }
    }

    pub fn status(provider: &'static str, status: reqwest::StatusCode, message: String) -> Self {
        Self::HttpStatus {
            provider,
            status,
            message,
        }
    }

    pub fn response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ResponseParse {
            provider,
            message: message.into(),
        }
    }
}
