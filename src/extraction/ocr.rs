use super::{ExtractionError, ExtractionSettings};
use std::path::Path;
use tokio::process::Command;

/// Run the OCR tool on an image and capture the recognised text from stdout.
pub(super) async fn extract(
    path: &Path,
    settings: &ExtractionSettings,
) -> Result<String, ExtractionError> {
    tracing::debug!(
        path = %path.display(),
        command = %settings.ocr_command,
        language = %settings.ocr_language,
        "Running OCR"
    );

    let output = Command::new(&settings.ocr_command)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(&settings.ocr_language)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|error| {
            ExtractionError::Ocr(format!(
                "failed to launch '{}': {error}",
                settings.ocr_command
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractionError::Ocr(format!(
            "'{}' exited with {}: {}",
            settings.ocr_command,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
