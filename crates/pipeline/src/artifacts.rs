//! Content-addressed storage for uploaded results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use brandgen_core::error::CoreError;
use brandgen_core::storage::content_address;

/// Default directory for stored artifacts.
const DEFAULT_ARTIFACT_DIR: &str = "./data/artifacts";

/// Default public URL prefix the API serves artifacts under.
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000/artifacts";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Unsupported content type, empty or oversized upload.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a stored artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// `<sha256>.<ext>`
    pub key: String,
    /// Publicly fetchable URL.
    pub url: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` and return their public URL. Storing the same bytes
    /// twice yields the same key.
    async fn put(&self, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, ArtifactError>;
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    pub public_base_url: String,
}

impl ArtifactConfig {
    /// Load from environment variables.
    ///
    /// | Variable          | Default                           |
    /// |-------------------|-----------------------------------|
    /// | `ARTIFACT_DIR`    | `./data/artifacts`                |
    /// | `PUBLIC_BASE_URL` | `http://localhost:3000/artifacts` |
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("ARTIFACT_DIR")
                .unwrap_or_else(|_| DEFAULT_ARTIFACT_DIR.into())
                .into(),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.into()),
        }
    }
}

/// Writes artifacts into one directory, named by content address.
pub struct LocalArtifactStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStore {
    pub fn new(config: ArtifactConfig) -> Self {
        Self {
            dir: config.dir,
            public_base_url: config.public_base_url,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, ArtifactError> {
        let key = content_address(bytes, content_type)?;
        let path = self.dir.join(&key);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(key = %key, "Artifact already stored");
        } else {
            tokio::fs::create_dir_all(&self.dir).await?;
            // Write under a temporary name so readers never see a partial file.
            let tmp = self.dir.join(format!(".{key}.{}.part", uuid::Uuid::new_v4()));
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tracing::info!(key = %key, size = bytes.len(), "Artifact stored");
        }

        Ok(StoredArtifact {
            url: join_url(&self.public_base_url, &key),
            key,
        })
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// Keeps artifacts in a map. For tests and runs without a writable disk.
pub struct InMemoryArtifactStore {
    base_url: String,
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryArtifactStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Content type and bytes stored under `key`.
    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new("memory://artifacts")
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, bytes: &[u8], content_type: &str) -> Result<StoredArtifact, ArtifactError> {
        let key = content_address(bytes, content_type)?;
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), (content_type.to_string(), bytes.to_vec()));
        Ok(StoredArtifact {
            url: join_url(&self.base_url, &key),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn local_store_writes_content_addressed_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = LocalArtifactStore::new(ArtifactConfig {
            dir: dir.path().join("artifacts"),
            public_base_url: "https://brandgen.example.com/artifacts/".into(),
        });

        let first = store.put(b"png-bytes", "image/png").await.unwrap();
        let second = store.put(b"png-bytes", "image/png").await.unwrap();

        assert_eq!(first, second);
        assert!(first.key.ends_with(".png"));
        assert_eq!(
            first.url,
            format!("https://brandgen.example.com/artifacts/{}", first.key)
        );
        let on_disk = std::fs::read(store.dir().join(&first.key)).unwrap();
        assert_eq!(on_disk, b"png-bytes");
        // Only the final file remains.
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rejects_unsupported_type_and_empty_upload() {
        let store = InMemoryArtifactStore::default();
        assert_matches!(
            store.put(b"%PDF", "application/pdf").await,
            Err(ArtifactError::Rejected(CoreError::Validation(_)))
        );
        assert_matches!(
            store.put(b"", "image/png").await,
            Err(ArtifactError::Rejected(CoreError::Validation(_)))
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_store_keeps_bytes() {
        let store = InMemoryArtifactStore::default();
        let stored = store.put(b"gif", "image/gif").await.unwrap();
        assert!(stored.url.starts_with("memory://artifacts/"));
        assert_eq!(
            store.get(&stored.key),
            Some(("image/gif".to_string(), b"gif".to_vec()))
        );
    }
}
