//! Persisting uploaded files under the upload directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised while saving uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    /// File name was empty or reduced to nothing once directories were stripped.
    #[error("Invalid upload file name: '{0}'")]
    InvalidName(String),
    /// Filesystem write failed.
    #[error("Failed to write upload {path}: {source}")]
    Io {
        /// Destination path being written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Background write task failed to complete.
    #[error("Upload task failed: {0}")]
    Task(String),
}

/// In-memory upload received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name, possibly including directories.
    pub name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Reduce a client-supplied name to a safe base name.
///
/// Both `/` and `\` count as separators so Windows-style paths cannot escape the directory.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

/// Save every file under `dir`, returning the saved paths in input order.
///
/// Each file is written to a temporary file first and then renamed into place, replacing an
/// earlier upload with the same name.
pub async fn save_uploaded_files(
    dir: &Path,
    files: Vec<UploadedFile>,
) -> Result<Vec<PathBuf>, UploadError> {
    let mut validated = Vec::with_capacity(files.len());
    for file in files {
        let name =
            sanitize_file_name(&file.name).ok_or_else(|| UploadError::InvalidName(file.name.clone()))?;
        validated.push((name, file.bytes));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| UploadError::Io {
            path: dir.display().to_string(),
            source,
        })?;

    let dir = dir.to_path_buf();
    let saved = tokio::task::spawn_blocking(move || {
        validated
            .into_iter()
            .map(|(name, bytes)| persist(&dir, &name, &bytes))
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|error| UploadError::Task(error.to_string()))??;

    tracing::info!(count = saved.len(), "Uploads saved");
    Ok(saved)
}

fn persist(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
    let destination = dir.join(name);
    let io_error = |source| UploadError::Io {
        path: destination.display().to_string(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(&destination)
        .map_err(|error| io_error(error.error))?;

    tracing::debug!(path = %destination.display(), bytes = bytes.len(), "Upload persisted");
    Ok(destination)
}
