//! Format extractors turning uploaded documents into ordered text units.
//!
//! Each supported source format has one extractor. Both produce an [`ExtractedDocument`] whose
//! units are numbered from 1 in source order: slides for decks, pages for PDFs. Units without
//! text are kept so that indexes stay contiguous.

mod pdf;
mod pptx;

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Source formats accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Office Open XML presentation (`.pptx`).
    #[serde(rename = "pptx")]
    SlideDeck,
    /// Portable Document Format (`.pdf`).
    Pdf,
}

impl DocumentFormat {
    /// Resolve the declared format from an upload file name.
    pub fn from_file_name(file_name: &str) -> Result<Self, ExtractError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("pptx") => Ok(Self::SlideDeck),
            Some("pdf") => Ok(Self::Pdf),
            other => Err(ExtractError::UnsupportedFormat(
                other.map(|ext| format!(".{ext}")).unwrap_or_else(|| "(none)".into()),
            )),
        }
    }

    /// Short noun for one unit of this format.
    pub fn unit_label(self) -> &'static str {
        match self {
            Self::SlideDeck => "Slide",
            Self::Pdf => "Page",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlideDeck => f.write_str("pptx"),
            Self::Pdf => f.write_str("pdf"),
        }
    }
}

/// One slide or page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedUnit {
    /// 1-based position in the source document.
    pub index: usize,
    /// Text elements of the unit, each trimmed, joined with newlines.
    pub text: String,
}

impl ExtractedUnit {
    /// Build a unit from its text elements, dropping elements that are blank after trimming.
    pub fn from_elements<I, S>(index: usize, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = elements
            .into_iter()
            .filter_map(|element| {
                let trimmed = element.as_ref().trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self { index, text }
    }
}

/// Ordered extraction result for a whole document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    /// Format the document was parsed as.
    pub format: DocumentFormat,
    /// Units in source order.
    pub units: Vec<ExtractedUnit>,
}

impl ExtractedDocument {
    /// Number of slides or pages in the source.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Whether no unit carries any text.
    pub fn is_blank(&self) -> bool {
        self.units.iter().all(|unit| unit.text.is_empty())
    }
}

/// Errors raised while reading a source document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The upload is not a `.pptx` or `.pdf` file.
    #[error("Unsupported file format {0}. Please upload a .pptx or .pdf file.")]
    UnsupportedFormat(String),
    /// The format library could not parse the document.
    #[error("Failed to extract {format} content: {reason}")]
    Failed {
        /// Declared format of the document.
        format: DocumentFormat,
        /// Description of the underlying parse failure.
        reason: String,
    },
    /// The staged document could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub(crate) fn failed(format: DocumentFormat, reason: impl fmt::Display) -> Self {
        Self::Failed {
            format,
            reason: reason.to_string(),
        }
    }
}

/// Extract units from an in-memory document.
pub fn extract_bytes(
    format: DocumentFormat,
    bytes: &[u8],
) -> Result<ExtractedDocument, ExtractError> {
    let units = match format {
        DocumentFormat::SlideDeck => pptx::extract(std::io::Cursor::new(bytes))?,
        DocumentFormat::Pdf => pdf::extract_mem(bytes)?,
    };
    Ok(finish(format, units))
}

/// Extract units from a document on disk.
pub fn extract_file(
    format: DocumentFormat,
    path: &Path,
) -> Result<ExtractedDocument, ExtractError> {
    let units = match format {
        DocumentFormat::SlideDeck => pptx::extract(std::fs::File::open(path)?)?,
        DocumentFormat::Pdf => pdf::extract_path(path)?,
    };
    Ok(finish(format, units))
}

fn finish(format: DocumentFormat, units: Vec<ExtractedUnit>) -> ExtractedDocument {
    tracing::debug!(
        %format,
        units = units.len(),
        blank_units = units.iter().filter(|unit| unit.text.is_empty()).count(),
        "Extracted document"
    );
    ExtractedDocument { format, units }
}
