//! Local tesseract CLI engine.
//!
//! Decodes the upload with the `image` crate, re-encodes it to a temporary
//! PNG, and shells out to `tesseract <file> stdout`. A decode failure is
//! reported as an invalid image without ever invoking the engine.

use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use super::{OcrError, TextExtractor};

pub struct TesseractExtractor;

impl TesseractExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Returns true when the tesseract binary answers `--version`.
    pub async fn probe() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError> {
        let decoded = image::load_from_memory(image)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        // Always hand tesseract a clean PNG regardless of the upload format.
        let temp_path = std::env::temp_dir().join(format!(
            "unification_ocr_{}.png",
            Uuid::new_v4().simple()
        ));
        decoded
            .save(&temp_path)
            .map_err(|e| OcrError::Engine(format!("failed to write temp image: {}", e)))?;

        let output = Command::new("tesseract")
            .arg(&temp_path)
            .arg("stdout")
            .output()
            .await;

        let _ = tokio::fs::remove_file(&temp_path).await;

        let output = output
            .map_err(|e| OcrError::Engine(format!("failed to run tesseract: {}", e)))?;
        if !output.status.success() {
            return Err(OcrError::Engine(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("TesseractExtractor: extracted {} chars", text.len());
        Ok(text)
    }
}
