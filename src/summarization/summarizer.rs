//! Per-chunk summarization with bounded exponential backoff.

use super::{GenerationError, TextGenerator};
use crate::pipeline::{SummaryFragment, TextChunk};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fixed instruction prepended to every chunk.
pub const SUMMARY_INSTRUCTION: &str = "Simplify and summarize the following content for review. \
Use plain language, keep the key facts, and write short paragraphs separated by blank lines.";

/// Retry budget for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first call. Always at least one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32, error: &GenerationError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.initial_backoff.saturating_mul(1 << exponent);
        let requested = error.retry_after().unwrap_or_default();
        exponential.max(requested).min(self.max_backoff)
    }
}

/// Terminal failure for one chunk.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Credential problem; never retried.
    #[error("chunk {sequence}: {source}")]
    Auth {
        /// Chunk sequence number.
        sequence: usize,
        /// Underlying generator error.
        #[source]
        source: GenerationError,
    },
    /// Transient failures used up the retry budget.
    #[error("chunk {sequence} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Chunk sequence number.
        sequence: usize,
        /// Number of calls made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: GenerationError,
    },
    /// Failure that retrying cannot fix.
    #[error("chunk {sequence}: {source}")]
    Rejected {
        /// Chunk sequence number.
        sequence: usize,
        /// Underlying generator error.
        #[source]
        source: GenerationError,
    },
}

/// Turns chunks into summary fragments through a [`TextGenerator`].
#[derive(Clone)]
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    max_output_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl Summarizer {
    /// Create a summarizer with fixed output bound, temperature, and retry policy.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        max_output_tokens: u32,
        temperature: f32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            max_output_tokens,
            temperature,
            retry,
        }
    }

    /// Build the instruction-augmented prompt for a chunk.
    pub fn prompt_for(text: &str) -> String {
        format!("{SUMMARY_INSTRUCTION}\n\n{text}")
    }

    /// Summarize one chunk, retrying transient failures.
    pub async fn summarize(&self, chunk: &TextChunk) -> Result<SummaryFragment, SummarizeError> {
        let prompt = Self::prompt_for(&chunk.text);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .generator
                .generate(&prompt, self.max_output_tokens, self.temperature)
                .await
            {
                Ok(text) => {
                    tracing::debug!(
                        sequence = chunk.sequence,
                        attempt,
                        output_chars = text.len(),
                        "Chunk summarized"
                    );
                    return Ok(SummaryFragment {
                        sequence: chunk.sequence,
                        text,
                    });
                }
                Err(error @ GenerationError::Auth(_)) => {
                    return Err(SummarizeError::Auth {
                        sequence: chunk.sequence,
                        source: error,
                    });
                }
                Err(error) if !error.is_retryable() => {
                    return Err(SummarizeError::Rejected {
                        sequence: chunk.sequence,
                        source: error,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(SummarizeError::Exhausted {
                        sequence: chunk.sequence,
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let backoff = self.retry.backoff_for(attempt, &error);
                    tracing::warn!(
                        sequence = chunk.sequence,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Generation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
