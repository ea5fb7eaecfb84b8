//! HTTP sidecar engine.
//!
//! Posts the image as multipart to `{url}/ocr` and reads the extracted text
//! back as JSON. Enabled only when `OCR_SIDECAR_URL` is configured.

use serde::Deserialize;
use tracing::info;

use super::{OcrError, TextExtractor};

/// Sidecar response (private deserialization type).
#[derive(Debug, Deserialize)]
struct SidecarResponse {
    text: String,
}

pub struct SidecarExtractor {
    url: String,
    client: reqwest::Client,
}

impl SidecarExtractor {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait::async_trait]
impl TextExtractor for SidecarExtractor {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError> {
        use reqwest::multipart::{Form, Part};

        let part = Part::bytes(image.to_vec())
            .file_name("screenshot.png")
            .mime_str("image/png")
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        let form = Form::new().part("file", part);

        info!(
            "SidecarExtractor: posting {} bytes to {}/ocr",
            image.len(),
            self.url
        );

        let resp = self
            .client
            .post(format!("{}/ocr", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::Engine(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OcrError::Engine(format!(
                "sidecar error ({}): {}",
                status, text
            )));
        }

        let body: SidecarResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        Ok(body.text)
    }
}
