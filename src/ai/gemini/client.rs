use crate::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Lightweight Gemini REST client used by the completion module.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// Construct a Gemini client.
    ///
    /// `model` should be the bare model ID (for example `gemini-1.5-flash`),
    /// not a `models/...`-prefixed path segment.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// One POST to `generateContent`, no retries. The caller decides which
    /// failures are worth retrying via [`Error::is_retryable`].
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!("Gemini request timed out after {:?}", self.timeout);
                    Error::ModelTimeout
                } else {
                    tracing::error!("Failed to send request to Gemini: {}", e);
                    Error::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::ModelApi {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::MalformedModelResponse(format!("envelope did not parse: {}", e))
        })
    }
}
