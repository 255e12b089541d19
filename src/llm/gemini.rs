use std::env;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::CopyGenerationError;
use super::retry::{is_retryable_status, RetryPolicy};
use crate::config::{Config, GenerationParams};

const PROVIDER_NAME: &str = "gemini";
// The hosted form's long-standing default; override with GEMINI_MODEL or the
// gemini_model config key.
const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    endpoint: Url,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl GeminiGenerator {
    pub fn maybe_from_environment(
        client: Client,
        config: &Config,
    ) -> Result<Option<Self>, CopyGenerationError> {
        let api_key = match env::var("GEMINI_API_KEY") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => return Ok(None),
        };

        let configured_model = env::var("GEMINI_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| config.gemini_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = if configured_model.starts_with("models/") {
            configured_model
        } else {
            format!("models/{}", configured_model)
        };

        let endpoint = Url::parse(&format!("{}/{}:generateContent", ENDPOINT_BASE, model))
            .map_err(|err| {
                CopyGenerationError::Configuration(format!("invalid Gemini endpoint: {}", err))
            })?;

        Ok(Some(Self::from_parts(
            client,
            api_key,
            endpoint,
            config.generation,
            RetryPolicy::from_config(config),
        )))
    }

    pub fn from_parts(
        client: Client,
        api_key: impl Into<String>,
        endpoint: Url,
        params: GenerationParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint,
            params,
            retry,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, CopyGenerationError> {
        let mut attempt = 0;
        let request_body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": self.params.temperature,
                "topP": self.params.top_p,
                "topK": self.params.top_k,
                "maxOutputTokens": self.params.max_output_tokens,
            },
            "safetySettings": safety_settings(),
        });

        loop {
            attempt += 1;

            let mut url = self.endpoint.clone();
            url.query_pairs_mut().append_pair("key", &self.api_key);

            debug!("gemini generation attempt {}", attempt);

            let response = self.client.post(url).json(&request_body).send().await;
            match response {
                Ok(resp) => {
                    if resp.status().is_success() {
                        let payload: GeminiResponse = resp.json().await.map_err(|err| {
                            CopyGenerationError::response(PROVIDER_NAME, err.to_string())
                        })?;
                        if let Some(text) = payload.primary_text() {
                            return Ok(text);
                        }
                        return Err(CopyGenerationError::response(
                            PROVIDER_NAME,
                            "Gemini response did not contain generated text",
                        ));
                    }

                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unavailable>".to_string());
                    warn!("gemini returned {}: {}", status, truncate(&body));

                    if self.retry.exhausted(attempt) || !is_retryable_status(status) {
                        return Err(CopyGenerationError::status(
                            PROVIDER_NAME,
                            status,
                            truncate(&body),
                        ));
                    }
                }
                Err(err) => {
                    warn!("gemini request failed: {}", err);
                    if self.retry.exhausted(attempt) {
                        return Err(CopyGenerationError::http(PROVIDER_NAME, err));
                    }
                }
            }

            sleep(self.retry.delay_after(attempt)).await;
        }
    }
}

// Block categories the upstream form has always sent alongside the prompt.
fn safety_settings() -> Value {
    json!([
        { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
        { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
        { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
        { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
    ])
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

impl GeminiResponse {
    fn primary_text(self) -> Option<String> {
        self.candidates?
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .find_map(|part| part.text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
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
    fn primary_text_takes_first_part_with_text() {
        let payload: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [ { "text": "generated copy" }, { "text": "ignored" } ] }
            }]
        }))
        .unwrap();
        assert_eq!(payload.primary_text().as_deref(), Some("generated copy"));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let payload: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(payload.primary_text().is_none());
        let payload: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(payload.primary_text().is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(600);
        let out = truncate(&long);
        assert!(out.ends_with('…'));
        assert!(out.len() <= 512 + '…'.len_utf8());
    }
}
