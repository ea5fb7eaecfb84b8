//! Process configuration, read once at startup.
//!
//! Values come from the environment (`.env` is loaded in `main` via dotenvy)
//! and are passed explicitly into the store and engine constructors.

use anyhow::{Context, Result};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub uploads_dir: String,
    /// Request body cap wired into the router.
    pub max_upload_bytes: usize,
    /// Base URL of an OCR sidecar, consulted when no local engine is present.
    pub ocr_sidecar_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let uploads_dir =
            std::env::var("UPLOADS_DIR").unwrap_or_else(|_| DEFAULT_UPLOADS_DIR.to_string());
        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .parse()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let ocr_sidecar_url = std::env::var("OCR_SIDECAR_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string());

        Ok(Self {
            bind_addr,
            uploads_dir,
            max_upload_bytes,
            ocr_sidecar_url,
        })
    }
}
