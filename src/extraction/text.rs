use super::{ExtractionError, read_file};
use std::path::Path;

/// Read a text file, replacing invalid UTF-8 sequences.
pub(super) async fn extract(path: &Path) -> Result<String, ExtractionError> {
    let bytes = read_file(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
