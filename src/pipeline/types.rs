//! Core data types and error definitions for the summary pipeline.

use crate::artifact::ArtifactError;
use crate::extract::ExtractError;
use crate::staging::StagingError;
use crate::summarization::{GenerationError, SummarizeError};
use std::path::PathBuf;
use thiserror::Error;

/// Bounded slice of extracted text sent to the generator in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position in the chunk sequence.
    pub sequence: usize,
    /// Chunk contents; never longer than the chunk budget.
    pub text: String,
    /// Inclusive range of source unit indexes this chunk was drawn from.
    pub source_units: (usize, usize),
    /// Whether the chunk begins inside a unit that had to be hard-split.
    pub starts_mid_unit: bool,
}

/// Generator output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFragment {
    /// Mirrors the originating [`TextChunk::sequence`].
    pub sequence: usize,
    /// Generated text.
    pub text: String,
}

/// Errors produced while turning extracted units into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A zero budget cannot hold any text.
    #[error("chunk budget must be greater than zero")]
    InvalidBudget,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer: {0}")]
    Tokenizer(String),
}

/// Failure kinds of one pipeline run. The run is all-or-nothing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upload is not a `.pptx` or `.pdf` file.
    #[error("Unsupported file format {0}. Please upload a .pptx or .pdf file.")]
    UnsupportedFormat(String),
    /// The document could not be parsed.
    #[error("Failed to extract document content: {0}")]
    ExtractionFailed(#[source] ExtractError),
    /// Extraction succeeded but found no text to summarize.
    #[error("The uploaded document contains no extractable text.")]
    EmptyDocument,
    /// Chunk configuration was unusable.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// A chunk could not be summarized within the retry budget.
    #[error("Summarization failed for chunk {sequence}: {source}")]
    SummarizationFailed {
        /// Sequence of the failing chunk.
        sequence: usize,
        /// Calls made for that chunk.
        attempts: u32,
        /// Last generator error.
        #[source]
        source: GenerationError,
    },
    /// The generator rejected our credential.
    #[error("Summarization is not authorized: {0}")]
    SummarizationAuthError(#[source] GenerationError),
    /// The output document could not be written.
    #[error("Failed to write output document: {0}")]
    ArtifactWriteFailed(#[from] ArtifactError),
    /// The upload could not be staged in the upload directory.
    #[error("Failed to stage upload in {}: {source}", .dir.display())]
    Staging {
        /// Upload directory.
        dir: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: StagingError,
    },
    /// A pipeline stage broke an internal contract.
    #[error("Internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl PipelineError {
    /// Whether the failure was caused by the caller's input rather than the service.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::EmptyDocument)
    }
}

impl From<ExtractError> for PipelineError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::UnsupportedFormat(extension) => Self::UnsupportedFormat(extension),
            other => Self::ExtractionFailed(other),
        }
    }
}

impl From<SummarizeError> for PipelineError {
    fn from(error: SummarizeError) -> Self {
        match error {
            SummarizeError::Auth { source, .. } => Self::SummarizationAuthError(source),
            SummarizeError::Exhausted {
                sequence,
                attempts,
                source,
            } => Self::SummarizationFailed {
                sequence,
                attempts,
                source,
            },
            SummarizeError::Rejected { sequence, source } => Self::SummarizationFailed {
                sequence,
                attempts: 1,
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_maps_to_user_error() {
        let error = PipelineError::from(ExtractError::UnsupportedFormat(".txt".into()));
        assert!(matches!(error, PipelineError::UnsupportedFormat(_)));
        assert!(error.is_user_error());
        assert!(PipelineError::EmptyDocument.is_user_error());
    }

    #[test]
    fn summarizer_failures_map_to_pipeline_kinds() {
        let auth = PipelineError::from(SummarizeError::Auth {
            sequence: 0,
            source: GenerationError::Auth("bad key".into()),
        });
        assert!(matches!(auth, PipelineError::SummarizationAuthError(_)));
        assert!(!auth.is_user_error());

        let exhausted = PipelineError::from(SummarizeError::Exhausted {
            sequence: 1,
            attempts: 3,
            source: GenerationError::Timeout("slow".into()),
        });
        assert!(matches!(
            exhausted,
            PipelineError::SummarizationFailed {
                sequence: 1,
                attempts: 3,
                ..
            }
        ));
    }
}
