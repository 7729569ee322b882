use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix appended to a document path to name its text artifact
pub const ARTIFACT_SUFFIX: &str = ".txt";

/// Derive the artifact path for a document.
///
/// A path that already ends in the artifact suffix is its own artifact.
pub fn artifact_path(document_path: &str) -> String {
    if is_artifact(document_path) {
        document_path.to_string()
    } else {
        format!("{}{}", document_path, ARTIFACT_SUFFIX)
    }
}

pub fn is_artifact(path: &str) -> bool {
    path.ends_with(ARTIFACT_SUFFIX)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

impl Serialize for StoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Text storage keyed by path. Artifacts outlive any single session.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    async fn read(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Write the whole text or nothing. Returns the path written.
    async fn write(&self, path: &str, text: &str) -> Result<String, StoreError>;
}

/// Source of the binary documents that get analyzed.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Filesystem store: artifacts sit next to their documents under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_atomically(target: &Path, text: &str) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        not_found_as_none(tokio::fs::read_to_string(self.resolve(path)).await)
    }

    async fn write(&self, path: &str, text: &str) -> Result<String, StoreError> {
        let target = self.resolve(path);
        let text = text.to_string();
        // Temp file + rename keeps readers from ever seeing a partial artifact.
        tokio::task::spawn_blocking(move || write_atomically(&target, &text))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        tracing::debug!(path, "Artifact written to filesystem");
        Ok(path.to_string())
    }
}

#[async_trait]
impl DocumentSource for FsStore {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        not_found_as_none(tokio::fs::read(self.resolve(path)).await)
    }
}
