//! Content-addressed document storage for signed contracts.

use super::CollaboratorError;
use crate::domain::types::DocumentLocator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const LOCATOR_PREFIX: &str = "sha256:";

/// Descriptive data stored beside a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Stores `blob` and returns the locator that retrieves it.
    async fn store(
        &self,
        blob: &[u8],
        metadata: &DocumentMetadata,
    ) -> Result<DocumentLocator, CollaboratorError>;

    async fn fetch(&self, locator: &DocumentLocator) -> Result<Vec<u8>, CollaboratorError>;
}

/// Stores blobs under `<root>/<first two hex chars>/<digest>.bin`.
#[derive(Debug, Clone)]
pub struct FsDocumentStorage {
    root: PathBuf,
}

impl FsDocumentStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn blob_path(&self, digest: &str) -> Result<PathBuf, CollaboratorError> {
        let valid = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
        let Some(shard) = digest.get(..2).filter(|_| valid) else {
            return Err(CollaboratorError::Rejected(format!(
                "malformed document digest '{}'",
                digest
            )));
        };
        Ok(self.root.join(shard).join(format!("{}.bin", digest)))
    }
}

/// Lowercase hex SHA-256 of `blob`.
pub fn content_digest(blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blob);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[async_trait]
impl DocumentStorage for FsDocumentStorage {
    async fn store(
        &self,
        blob: &[u8],
        metadata: &DocumentMetadata,
    ) -> Result<DocumentLocator, CollaboratorError> {
        let digest = content_digest(blob);
        let path = self.blob_path(&digest)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Same content, same file: storing twice is harmless.
        if tokio::fs::metadata(&path).await.is_err() {
            let tmp = path.with_extension("bin.tmp");
            tokio::fs::write(&tmp, blob).await?;
            tokio::fs::rename(&tmp, &path).await?;
        }
        let sidecar = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(path.with_extension("json"), sidecar).await?;

        Ok(DocumentLocator::from(format!("{}{}", LOCATOR_PREFIX, digest)))
    }

    async fn fetch(&self, locator: &DocumentLocator) -> Result<Vec<u8>, CollaboratorError> {
        let Some(digest) = locator.as_str().strip_prefix(LOCATOR_PREFIX) else {
            return Err(CollaboratorError::Rejected(format!(
                "unknown document locator '{}'",
                locator
            )));
        };
        let path = self.blob_path(digest)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CollaboratorError::Missing(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
