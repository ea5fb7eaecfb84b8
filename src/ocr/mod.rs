//! Modular text-extraction abstraction.
//!
//! Defines the [`TextExtractor`] trait so different OCR engines (local
//! tesseract CLI, HTTP sidecar) can back the same endpoints. One engine is
//! selected at startup and stays fixed for the process lifetime; when none
//! can be probed, an unavailable stub is installed and extraction endpoints
//! report the capability as missing instead of failing.

pub mod sidecar;
pub mod tesseract;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

/// Extracted text is capped at this many characters before leaving the adapter.
pub const MAX_TEXT_CHARS: usize = 8000;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("text extraction is not available in this deployment")]
    Unavailable,
    #[error("could not decode image: {0}")]
    InvalidImage(String),
    #[error("text extraction failed: {0}")]
    Engine(String),
}

/// Async capability implemented by each extraction engine.
#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this engine can actually produce text.
    fn available(&self) -> bool {
        true
    }

    /// Run extraction over raw image bytes.
    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Stub installed when no engine could be probed at startup.
pub struct UnavailableExtractor;

#[async_trait::async_trait]
impl TextExtractor for UnavailableExtractor {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn available(&self) -> bool {
        false
    }

    async fn extract_text(&self, _image: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::Unavailable)
    }
}

/// Probe engines once and pick one for the process lifetime.
///
/// A local tesseract binary wins; a configured sidecar is the fallback.
pub async fn select_engine(sidecar_url: Option<&str>) -> Arc<dyn TextExtractor> {
    if tesseract::TesseractExtractor::probe().await {
        info!("OCR engine: local tesseract");
        return Arc::new(tesseract::TesseractExtractor::new());
    }

    if let Some(url) = sidecar_url {
        info!("OCR engine: sidecar at {}", url);
        return Arc::new(sidecar::SidecarExtractor::new(
            url.to_string(),
            reqwest::Client::new(),
        ));
    }

    warn!("OCR engine: none available, extraction endpoints will report 501");
    Arc::new(UnavailableExtractor)
}

/// Cap extractor output at [`MAX_TEXT_CHARS`] characters on a char boundary.
pub fn cap_text(text: String) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}
