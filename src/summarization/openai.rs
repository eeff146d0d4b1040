//! OpenAI-compatible generation backend.

use super::{ApiStyle, GenerationError, TextGenerator};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Connection settings for [`OpenAiGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer credential; calls fail with [`GenerationError::Auth`] when absent.
    pub api_key: Option<String>,
    /// API base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Which endpoint family to call.
    pub style: ApiStyle,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Text generator talking to an OpenAI-compatible HTTP API.
pub struct OpenAiGenerator {
    http: Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    /// Build a generator with its own HTTP client.
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("docbrief/summary")
            .timeout(config.timeout)
            .build()
            .map_err(|error| {
                GenerationError::Network(format!("failed to construct HTTP client: {error}"))
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.style {
            ApiStyle::Chat => format!("{base}/chat/completions"),
            ApiStyle::Completion => format!("{base}/completions"),
        }
    }

    fn payload(&self, prompt: &str, max_output_tokens: u32, temperature: f32) -> serde_json::Value {
        match self.config.style {
            ApiStyle::Chat => json!({
                "model": self.config.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": max_output_tokens,
                "temperature": temperature,
            }),
            ApiStyle::Completion => json!({
                "model": self.config.model,
                "prompt": prompt,
                "max_tokens": max_output_tokens,
                "temperature": temperature,
            }),
        }
    }

    fn extract_text(&self, body: CompletionResponse) -> Result<String, GenerationError> {
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            GenerationError::InvalidResponse("response contained no choices".into())
        })?;
        let text = match self.config.style {
            ApiStyle::Chat => choice.message.and_then(|message| message.content),
            ApiStyle::Completion => choice.text,
        };
        text.map(|value| value.trim().to_string()).ok_or_else(|| {
            GenerationError::InvalidResponse("choice contained no generated text".into())
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn map_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(error.to_string())
    } else {
        GenerationError::Network(error.to_string())
    }
}

async fn map_error_response(response: Response) -> GenerationError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited {
            message,
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT => GenerationError::Timeout(message),
        status if status.is_server_error() => GenerationError::Server {
            status: status.as_u16(),
            message,
        },
        status => GenerationError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(GenerationError::Auth(
                "no credential configured (set OPENAI_API_KEY)".into(),
            ));
        };

        tracing::debug!(
            model = %self.config.model,
            style = ?self.config.style,
            prompt_chars = prompt.len(),
            max_output_tokens,
            "Sending generation request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.payload(prompt, max_output_tokens, temperature))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                GenerationError::Timeout(error.to_string())
            } else {
                GenerationError::InvalidResponse(format!("failed to decode response: {error}"))
            }
        })?;

        self.extract_text(body)
    }
}
