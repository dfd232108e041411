use crate::errors::AppError;
use crate::upstream::{ensure_success, DEFAULT_TIMEOUT};
use serde::Serialize;
use serde_json::Value;

/// Returned instead of calling out when no API key is configured.
pub const DISABLED_MESSAGE: &str =
    "AI responses are disabled because GEMINI_API_KEY is not configured on the server.";

/// Returned when the model answered without any candidate text.
pub const FALLBACK_MESSAGE: &str = "Sorry, I could not generate a response.";

/// A composed prompt: fixed system instruction plus the user's own words.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Single-turn text in the layout the model is prompted with.
    pub fn combined_text(&self) -> String {
        format!("{}\n\nUser Question: {}", self.system, self.user)
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

/// Pulls `candidates[0].content.parts[0].text`, ignoring blank text.
fn first_candidate_text(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Client for the hosted generative-text API (`generateContent`).
#[derive(Clone)]
pub struct GenerativeClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GenerativeClient {
    /// Creates a new `GenerativeClient`.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `endpoint` - Full `generateContent` URL, without the key.
    /// * `api_key` - Sent as the `key` query parameter. `None` disables generation.
    pub fn new(client: reqwest::Client, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    /// Generates a reply for the prompt.
    ///
    /// Missing key and missing candidate text are answered with fixed messages;
    /// only transport or HTTP failures come back as `Err`.
    pub async fn generate(&self, prompt: &Prompt) -> Result<String, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("Generation disabled: no API key");
            return Ok(DISABLED_MESSAGE.to_string());
        };

        let url = reqwest::Url::parse_with_params(&self.endpoint, &[("key", api_key)])
            .map_err(|e| AppError::ConfigMissing(format!("Invalid generation endpoint: {}", e)))?;
        tracing::info!("Requesting generation from {}?key=[REDACTED]", self.endpoint);

        let text = prompt.combined_text();
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: &text }],
            }],
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Generation request failed: {}", e.without_url()))
            })?;

        let data: Value = ensure_success(response, "Generation API")
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Failed to parse generation response: {}", e.without_url()))
            })?;

        match first_candidate_text(&data) {
            Some(text) => Ok(text),
            None => {
                tracing::warn!("Generation response had no candidate text");
                Ok(FALLBACK_MESSAGE.to_string())
            }
        }
    }
}
