use super::client::GeminiHttpClient;
use crate::ai::{CompletionService, GenerationOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

/// Retries after the initial attempt, for throttling/5xx/timeout failures.
const RETRY_ATTEMPTS: usize = 3;
/// Backoff multiplier: yields 1 s, 2 s, 4 s between attempts.
const BACKOFF_FACTOR_MS: u64 = 500;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Completion gateway over Gemini's `generateContent` endpoint.
pub struct GeminiClient {
    http: GeminiHttpClient,
    backoff_factor_ms: u64,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, reqwest::Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(api_key, model, timeout, client),
            backoff_factor_ms: BACKOFF_FACTOR_MS,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    #[cfg(test)]
    fn with_backoff_factor(mut self, factor_ms: u64) -> Self {
        self.backoff_factor_ms = factor_ms;
        self
    }

    fn extract_text(response: &GenerateContentResponse) -> Option<String> {
        response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_p: options.top_p,
                max_output_tokens: options.max_output_tokens,
            },
        };

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.backoff_factor_ms)
            .take(RETRY_ATTEMPTS);

        let response: GenerateContentResponse = RetryIf::spawn(
            strategy,
            || self.http.generate_content::<_, GenerateContentResponse>(&request),
            |err: &Error| {
                let retry = err.is_retryable();
                if retry {
                    tracing::warn!("Retryable Gemini failure: {}. Backing off.", err);
                }
                retry
            },
        )
        .await?;

        let text = Self::extract_text(&response).ok_or_else(|| {
            Error::MalformedModelResponse("no candidate text in response".to_string())
        })?;

        tracing::debug!(
            "Gemini completion ({} chars) from model {}",
            text.len(),
            self.http.model()
        );

        Ok(text.trim().to_string())
    }
}
