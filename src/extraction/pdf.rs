use super::{ExtractionError, read_file};
use std::path::Path;

/// Extract embedded text from a PDF. Parsing runs on the blocking pool.
pub(super) async fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = read_file(path).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Extracting PDF");

    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| ExtractionError::Pdf(format!("task join error: {error}")))?
        .map_err(|error| ExtractionError::Pdf(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn garbage_bytes_are_a_pdf_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("fake.pdf");
        tokio::fs::write(&path, b"%PDF-nothing here").await.expect("write");

        let error = extract(&path).await.expect_err("invalid pdf");
        assert!(matches!(error, ExtractionError::Pdf(_)));
    }
}
