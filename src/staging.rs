//! Request-scoped storage of uploads in the upload directory.
//!
//! Every upload is written to `{upload_dir}/{uuid}-{sanitized name}` so concurrent requests never
//! collide, and the file is removed when its [`StagedUpload`] guard is dropped. Removal happens on
//! every exit path, including early returns and panics that unwind through the request.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload";

/// Errors raised while staging an upload.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The upload directory could not be created.
    #[error("failed to create upload directory: {0}")]
    CreateDir(#[source] io::Error),
    /// The upload bytes could not be written.
    #[error("failed to write staged upload: {0}")]
    Write(#[source] io::Error),
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped and characters outside `[A-Za-z0-9._-]` become `_`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let sanitized: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

/// File name without its final extension, after sanitizing.
pub fn file_stem(file_name: &str) -> String {
    let sanitized = sanitize_file_name(file_name);
    Path::new(&sanitized)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}

/// Create the upload directory if missing.
pub fn ensure_upload_dir(dir: &Path) -> Result<(), StagingError> {
    std::fs::create_dir_all(dir).map_err(StagingError::CreateDir)
}

/// An upload persisted for the lifetime of one request.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    /// Write `bytes` into `dir` under a unique name derived from `file_name`.
    ///
    /// `dir` must already exist; see [`ensure_upload_dir`].
    pub async fn write(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<Self, StagingError> {
        let path = dir.join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name)));
        // Guard first so a partial write is still cleaned up.
        let staged = Self { path };
        tokio::fs::write(&staged.path, bytes)
            .await
            .map_err(StagingError::Write)?;
        tracing::debug!(path = %staged.path.display(), bytes = bytes.len(), "Upload staged");
        Ok(staged)
    }

    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Staged upload removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove staged upload"
            ),
        }
    }
}
