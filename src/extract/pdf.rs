//! PDF extractor backed by `lopdf`.

use super::{DocumentFormat, ExtractError, ExtractedUnit};
use lopdf::Document;
use std::path::Path;

pub(super) fn extract_mem(bytes: &[u8]) -> Result<Vec<ExtractedUnit>, ExtractError> {
    let mut document = Document::load_mem(bytes).map_err(failed)?;
    unlock(&mut document)?;
    extract_pages(&document)
}

pub(super) fn extract_path(path: &Path) -> Result<Vec<ExtractedUnit>, ExtractError> {
    let mut document = Document::load(path).map_err(failed)?;
    unlock(&mut document)?;
    extract_pages(&document)
}

/// Open documents protected only by an owner password (empty user password).
fn unlock(document: &mut Document) -> Result<(), ExtractError> {
    if !document.is_encrypted() {
        return Ok(());
    }
    document
        .decrypt("")
        .map_err(|error| failed(format!("document requires a password: {error}")))?;
    tracing::debug!("Opened owner-protected PDF with empty user password");
    Ok(())
}

/// One unit per page, using the text layer of each page in page-number order.
fn extract_pages(document: &Document) -> Result<Vec<ExtractedUnit>, ExtractError> {
    // `get_pages` is keyed by 1-based page number, so iteration is already in page order.
    let pages = document.get_pages();
    let mut units = Vec::with_capacity(pages.len());
    for (position, page_number) in pages.keys().enumerate() {
        let text = document
            .extract_text(&[*page_number])
            .map_err(|error| failed(format!("page {page_number}: {error}")))?;
        units.push(ExtractedUnit::from_elements(position + 1, [text]));
    }

    Ok(units)
}

fn failed(reason: impl std::fmt::Display) -> ExtractError {
    ExtractError::failed(DocumentFormat::Pdf, reason)
}
