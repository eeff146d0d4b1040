//! Text generation capability and the per-chunk summarizer built on it.
//!
//! Every backend is reached through [`TextGenerator`], a single
//! `generate(prompt, max_output_tokens, temperature)` call. The OpenAI-compatible adapter speaks
//! both the chat-style and the older completion-style endpoints, so the summarizer stays
//! agnostic to which API version serves it.

mod openai;
mod summarizer;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use summarizer::{RetryPolicy, SUMMARY_INSTRUCTION, SummarizeError, Summarizer};

/// Errors surfaced by a text generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Credential missing or rejected.
    #[error("Authentication with the generation API failed: {0}")]
    Auth(String),
    /// Provider asked us to slow down.
    #[error("Rate limited by the generation API: {message}")]
    RateLimited {
        /// Provider message.
        message: String,
        /// Delay requested through `Retry-After`, when present.
        retry_after: Option<Duration>,
    },
    /// The call did not complete within its timeout.
    #[error("Generation request timed out: {0}")]
    Timeout(String),
    /// Provider returned a 5xx status.
    #[error("Generation API server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// Connection-level failure.
    #[error("Failed to reach the generation API: {0}")]
    Network(String),
    /// Provider rejected the request for a reason retrying cannot fix.
    #[error("Generation request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// Response could not be decoded.
    #[error("Malformed generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Server { .. } | Self::Network(_)
        )
    }

    /// Delay the provider asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Interface implemented by text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for an instruction-augmented prompt.
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError>;
}

/// Endpoint flavour of an OpenAI-compatible API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiStyle {
    /// `POST /chat/completions` with a single user message.
    Chat,
    /// Legacy `POST /completions` with a raw prompt.
    Completion,
}

impl std::str::FromStr for ApiStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "completion" | "completions" | "legacy" => Ok(Self::Completion),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(GenerationError::Timeout("slow".into()).is_retryable());
        assert!(GenerationError::Network("reset".into()).is_retryable());
        assert!(
            GenerationError::Server {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            GenerationError::RateLimited {
                message: "slow down".into(),
                retry_after: None
            }
            .is_retryable()
        );
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!GenerationError::Auth("bad key".into()).is_retryable());
        assert!(!GenerationError::InvalidResponse("garbage".into()).is_retryable());
        assert!(
            !GenerationError::Rejected {
                status: 400,
                message: "context length".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn api_style_parses_known_names() {
        assert_eq!("Chat".parse::<ApiStyle>(), Ok(ApiStyle::Chat));
        assert_eq!("completion".parse::<ApiStyle>(), Ok(ApiStyle::Completion));
        assert!("davinci".parse::<ApiStyle>().is_err());
    }
}
