//! File-backed store for uploaded screenshots.
//!
//! Uploads are written once under a generated identifier and never updated
//! or deleted, so concurrent stores and resolves need no coordination.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extensions accepted on upload. Anything else is normalized to `.png`.
const ALLOWED_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".webp"];
const DEFAULT_EXTENSION: &str = ".png";

/// Descriptor for a stored upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub extension: String,
    pub path: PathBuf,
    /// Digest of the stored bytes, kept for traceability in logs.
    pub sha256: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("empty upload payload")]
    EmptyPayload,
    #[error("no stored file for id '{0}'")]
    NotFound(String),
    #[error("multiple stored files share id '{0}'")]
    AmbiguousId(String),
    #[error("storage I/O failed")]
    Io(#[from] std::io::Error),
}

/// Write-once file store rooted at a dedicated uploads directory.
///
/// Files are named `{id}{extension}`. The id is a fresh 128-bit UUID per
/// upload, so identifiers are never reused and resolve is a read-only scan.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open the store, creating the uploads directory if missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an uploaded payload under a fresh identifier.
    pub async fn store(
        &self,
        bytes: &[u8],
        original_filename: Option<&str>,
    ) -> Result<StoredFile, StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::EmptyPayload);
        }

        let extension = normalize_extension(original_filename);
        let id = Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("{}{}", id, extension));

        tokio::fs::write(&path, bytes).await?;

        let sha256 = {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            format!("{:x}", hasher.finalize())
        };
        debug!(
            "ContentStore: stored {} ({} bytes, sha256={})",
            path.display(),
            bytes.len(),
            sha256
        );

        Ok(StoredFile {
            id,
            extension: extension.to_string(),
            path,
            sha256,
        })
    }

    /// Look up a stored file by identifier.
    ///
    /// Scans the uploads directory for `{id}{ext}` across the extension
    /// allow-list. Exactly one match must exist; more than one means the
    /// key space is corrupted and is reported as such rather than picking
    /// the first hit.
    pub async fn resolve(&self, id: &str) -> Result<PathBuf, StoreError> {
        // Identifiers are hex UUIDs; anything else never names a stored file.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let mut matches = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(suffix) = name.strip_prefix(id) else { continue };
            if ALLOWED_EXTENSIONS.contains(&suffix) {
                matches.push(entry.path());
            }
        }

        match matches.len() {
            0 => Err(StoreError::NotFound(id.to_string())),
            1 => Ok(matches.remove(0)),
            n => {
                warn!("ContentStore: {} files share id '{}'", n, id);
                Err(StoreError::AmbiguousId(id.to_string()))
            }
        }
    }
}

/// Derive the storage extension from the client-supplied filename, lower-cased
/// and checked against the allow-list.
fn normalize_extension(filename: Option<&str>) -> &'static str {
    let Some(filename) = filename else {
        return DEFAULT_EXTENSION;
    };
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return DEFAULT_EXTENSION;
    };
    let dotted = format!(".{}", ext.to_lowercase());
    ALLOWED_EXTENSIONS
        .iter()
        .find(|e| **e == dotted)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}
