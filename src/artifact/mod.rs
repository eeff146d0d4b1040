//! Output document builder.
//!
//! The summary is delivered as a minimal WordprocessingML package (`.docx`): a zip archive with
//! the content-type map, package relationships, a style sheet providing `Heading1`, and the
//! document body. Paragraphs come from blank-line separated blocks of the summary text.

mod docx;

pub use docx::read_blocks;

use crate::pipeline::SummarySection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MIME type of the generated document.
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Suffix appended to the upload's stem to name the download.
const FILE_NAME_SUFFIX: &str = "_summary.docx";

/// Errors raised while materializing the output document.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Writing bytes failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The zip container could not be assembled.
    #[error("failed to package document: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// A document part could not be serialized.
    #[error("failed to serialize document XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// One structural element of the output body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Section heading (`Heading1` style).
    Heading(String),
    /// Body paragraph; single newlines become line breaks.
    Paragraph(String),
}

/// The downloadable summary document.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    /// Upload file name without its extension.
    pub file_name_stem: String,
    /// Aggregated summary text.
    pub body_text: String,
    /// MIME type sent with the download.
    pub mime_type: &'static str,
    /// Packaged document bytes.
    pub bytes: Vec<u8>,
}

impl OutputArtifact {
    /// File name offered to the client.
    pub fn file_name(&self) -> String {
        format!("{}{FILE_NAME_SUFFIX}", self.file_name_stem)
    }

    /// Write the document into `dir`, returning the full path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ArtifactError> {
        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Renders summary text into an [`OutputArtifact`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactBuilder;

impl ArtifactBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        Self
    }

    /// Render `body_text` as plain paragraphs.
    pub fn build(&self, stem: &str, body_text: &str) -> Result<OutputArtifact, ArtifactError> {
        self.package(stem, body_text.to_string(), paragraphs(body_text))
    }

    /// Render one heading per section followed by that section's paragraphs.
    pub fn build_sections(
        &self,
        stem: &str,
        sections: &[SummarySection],
    ) -> Result<OutputArtifact, ArtifactError> {
        let mut blocks = Vec::new();
        for section in sections {
            blocks.push(Block::Heading(section.heading.clone()));
            blocks.extend(paragraphs(&section.text));
        }
        let body_text = sections
            .iter()
            .map(|section| section.text.as_str())
            .collect::<Vec<_>>()
            .join(crate::pipeline::FRAGMENT_SEPARATOR);
        self.package(stem, body_text, blocks)
    }

    fn package(
        &self,
        stem: &str,
        body_text: String,
        blocks: Vec<Block>,
    ) -> Result<OutputArtifact, ArtifactError> {
        let bytes = docx::package(&blocks)?;
        tracing::debug!(
            stem,
            blocks = blocks.len(),
            bytes = bytes.len(),
            "Output document packaged"
        );
        Ok(OutputArtifact {
            file_name_stem: stem.to_string(),
            body_text,
            mime_type: DOCX_MIME_TYPE,
            bytes,
        })
    }
}

/// Split text into paragraphs on blank lines, dropping empty paragraphs.
pub fn paragraphs(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(Block::Paragraph(current.join("\n")));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(Block::Paragraph(current.join("\n")));
    }

    blocks
}
