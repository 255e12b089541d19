use std::env;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::CopyGenerationError;
use super::retry::{is_retryable_status, RetryPolicy};
use crate::config::{Config, GenerationParams};

const PROVIDER_NAME: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const SYSTEM_MESSAGE: &str = "You are an expert copywriter.";

#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    client: Client,
    api_key: String,
    model: String,
    endpoint: Url,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl ChatCompletionGenerator {
    pub fn maybe_from_environment(
        client: Client,
        config: &Config,
    ) -> Result<Option<Self>, CopyGenerationError> {
        let api_key = match env::var("OPENAI_API_KEY") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => return Ok(None),
        };

        let model = env::var("OPENAI_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| config.openai_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let endpoint = Url::parse(ENDPOINT).map_err(|err| {
            CopyGenerationError::Configuration(format!("invalid OpenAI endpoint: {}", err))
        })?;

        Ok(Some(Self::from_parts(
            client,
            api_key,
            model,
            endpoint,
            config.generation,
            RetryPolicy::from_config(config),
        )))
    }

    pub fn from_parts(
        client: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: Url,
        params: GenerationParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint,
            params,
            retry,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, CopyGenerationError> {
        let mut attempt = 0;
        let request_body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_MESSAGE },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "max_tokens": self.params.max_output_tokens,
        });

        loop {
            attempt += 1;

            let request = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(&self.api_key)
                .json(&request_body);

            debug!("openai generation attempt {}", attempt);

            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        let payload: ChatCompletionResponse =
                            response.json().await.map_err(|err| {
                                CopyGenerationError::response(PROVIDER_NAME, err.to_string())
                            })?;
                        if let Some(text) = payload.primary_text() {
                            return Ok(text);
                        }
                        return Err(CopyGenerationError::response(
                            PROVIDER_NAME,
                            "chat completion did not contain message content",
                        ));
                    }

                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unavailable>".to_string());
                    warn!("openai returned {}: {}", status, truncate(&body));

                    if self.retry.exhausted(attempt) || !is_retryable_status(status) {
                        return Err(CopyGenerationError::status(
                            PROVIDER_NAME,
                            status,
                            truncate(&body),
                        ));
                    }
                }
                Err(err) => {
                    warn!("openai request failed: {}", err);
                    if self.retry.exhausted(attempt) {
                        return Err(CopyGenerationError::http(PROVIDER_NAME, err));
                    }
                }
            }

            sleep(self.retry.delay_after(attempt)).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

impl ChatCompletionResponse {
    fn primary_text(self) -> Option<String> {
        self.choices?
            .into_iter()
            .find_map(|choice| choice.message.content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn truncate(input: &str) -> String {
    const MAX_LEN: usize = 512;
    if input.len() <= MAX_LEN {
        return input.to_string();
    }
    let mut end = MAX_LEN;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &input[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_text_reads_first_choice() {
        let payload: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "finished copy" } }
            ]
        }))
        .unwrap();
        assert_eq!(payload.primary_text().as_deref(), Some("finished copy"));
    }

    #[test]
    fn missing_content_yields_no_text() {
        let payload: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [ { "message": { "role": "assistant" } } ] }))
                .unwrap();
        assert!(payload.primary_text().is_none());
    }
}
