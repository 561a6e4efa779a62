//! Plain-text extraction for uploaded documents.
//!
//! The file extension picks the extractor. Batch extraction never aborts: unsupported files are
//! skipped and per-file failures are recorded as empty text so callers can still index the rest.

mod docx;
mod ocr;
mod pdf;
mod text;

use crate::config::Config;
use std::collections::{BTreeMap, btree_map::Entry};
use std::path::Path;
use thiserror::Error;

/// Errors raised while extracting text from a single file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File extension is not handled by any extractor.
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    /// File could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF parser rejected the document.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// OCR process failed or could not be launched.
    #[error("OCR failed: {0}")]
    Ocr(String),
    /// DOCX archive or XML body was malformed.
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Document families recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Raster image processed with OCR.
    Image,
    /// UTF-8 text or Markdown.
    Text,
    /// Office Open XML word processing document.
    Docx,
}

impl DocumentKind {
    /// Classify `path` by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => Some(Self::Image),
            "txt" | "md" | "markdown" | "text" => Some(Self::Text),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

/// Settings for the external OCR tool.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// OCR executable name or path.
    pub ocr_command: String,
    /// OCR language code passed via `-l`.
    pub ocr_language: String,
}

impl ExtractionSettings {
    /// Derive settings from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ocr_command: config.ocr_command.clone(),
            ocr_language: config.ocr_language.clone(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            ocr_command: "tesseract".into(),
            ocr_language: "eng".into(),
        }
    }
}

/// Source key used to identify a file across extraction, storage, and citations.
pub fn source_key_for_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Extract trimmed plain text from a single file.
pub async fn extract_text(
    path: &Path,
    settings: &ExtractionSettings,
) -> Result<String, ExtractionError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| ExtractionError::Unsupported(path.display().to_string()))?;

    let text = match kind {
        DocumentKind::Pdf => pdf::extract(path).await?,
        DocumentKind::Image => ocr::extract(path, settings).await?,
        DocumentKind::Text => text::extract(path).await?,
        DocumentKind::Docx => docx::extract(path).await?,
    };
    Ok(text.trim().to_string())
}

/// Extract every supported file, keyed by source key.
///
/// Unsupported extensions are skipped with a warning. A file that fails to extract maps to an
/// empty string. When two paths share a source key the first text is kept; a later non-empty
/// text only replaces an earlier empty one.
pub async fn extract_all_text<P>(paths: &[P], settings: &ExtractionSettings) -> BTreeMap<String, String>
where
    P: AsRef<Path>,
{
    let mut extracted = BTreeMap::new();
    for path in paths {
        let path = path.as_ref();
        if DocumentKind::from_path(path).is_none() {
            tracing::warn!(path = %path.display(), "Skipping unsupported file type");
            continue;
        }

        let key = source_key_for_path(path);
        let text = match extract_text(path, settings).await {
            Ok(text) => {
                tracing::debug!(source_key = %key, chars = text.chars().count(), "Extracted text");
                text
            }
            Err(error) => {
                tracing::warn!(source_key = %key, error = %error, "Text extraction failed");
                String::new()
            }
        };
        match extracted.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(text);
            }
            Entry::Occupied(mut entry) => {
                tracing::warn!(
                    source_key = %entry.key(),
                    path = %path.display(),
                    "Source key already extracted from another path"
                );
                if entry.get().is_empty() && !text.is_empty() {
                    entry.insert(text);
                }
            }
        }
    }
    extracted
}

pub(crate) async fn read_file(path: &Path) -> Result<Vec<u8>, ExtractionError> {
    tokio::fs::read(path).await.map_err(|source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn kinds_follow_extension_case_insensitively() {
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("scan.JpEg")), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_path(Path::new("memo.docx")), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_path(Path::new("sheet.xlsx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn source_key_is_the_base_name() {
        assert_eq!(source_key_for_path(Path::new("/tmp/up/report.pdf")), "report.pdf");
        assert_eq!(source_key_for_path(Path::new("report.pdf")), "report.pdf");
    }

    #[tokio::test]
    async fn batch_skips_unsupported_and_records_failures_as_empty() {
        let dir = TempDir::new().expect("tempdir");
        let notes = dir.path().join("notes.txt");
        tokio::fs::write(&notes, "  Contract penalty is $500.\n")
            .await
            .expect("write");
        let sheet = dir.path().join("sheet.xlsx");
        tokio::fs::write(&sheet, b"ignored").await.expect("write");
        let broken = dir.path().join("broken.pdf");
        tokio::fs::write(&broken, b"not a pdf").await.expect("write");
        let missing = dir.path().join("missing.docx");

        let paths: Vec<PathBuf> = vec![notes, sheet, broken, missing];
        let extracted = extract_all_text(&paths, &ExtractionSettings::default()).await;

        assert_eq!(extracted.len(), 3);
        assert_eq!(extracted["notes.txt"], "Contract penalty is $500.");
        assert_eq!(extracted["broken.pdf"], "");
        assert_eq!(extracted["missing.docx"], "");
        assert!(!extracted.contains_key("sheet.xlsx"));
    }

    #[tokio::test]
    async fn same_base_name_keeps_the_first_good_text() {
        let dir = TempDir::new().expect("tempdir");
        let first_dir = dir.path().join("x");
        let second_dir = dir.path().join("y");
        tokio::fs::create_dir_all(&first_dir).await.expect("mkdir");
        tokio::fs::create_dir_all(&second_dir).await.expect("mkdir");
        let good = first_dir.join("report.txt");
        tokio::fs::write(&good, "first good text").await.expect("write");
        let missing = second_dir.join("report.txt");
        let later = second_dir.join("summary.txt");
        tokio::fs::write(&later, "later text").await.expect("write");
        let earlier_missing = first_dir.join("summary.txt");

        let paths: Vec<PathBuf> = vec![good, missing, earlier_missing, later];
        let extracted = extract_all_text(&paths, &ExtractionSettings::default()).await;

        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted["report.txt"], "first good text");
        assert_eq!(extracted["summary.txt"], "later text");
    }

    #[tokio::test]
    async fn same_base_name_never_replaces_non_empty_text() {
        let dir = TempDir::new().expect("tempdir");
        let first = dir.path().join("a").join("notes.txt");
        let second = dir.path().join("b").join("notes.txt");
        for (path, body) in [(&first, "original"), (&second, "replacement")] {
            tokio::fs::create_dir_all(path.parent().expect("parent"))
                .await
                .expect("mkdir");
            tokio::fs::write(path, body).await.expect("write");
        }

        let extracted =
            extract_all_text(&[first, second], &ExtractionSettings::default()).await;

        assert_eq!(extracted["notes.txt"], "original");
    }

    #[tokio::test]
    async fn unsupported_single_file_is_an_error() {
        let error = extract_text(Path::new("a.xlsx"), &ExtractionSettings::default())
            .await
            .expect_err("unsupported");
        assert!(matches!(error, ExtractionError::Unsupported(_)));
    }
}
