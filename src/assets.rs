use crate::errors::AppError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Read-only store of static binary files addressed by logical name.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn read(&self, name: &str) -> Result<Vec<u8>, AppError>;
}

/// Serves files from one directory. Names with path separators or `..` are
/// rejected, so nothing outside the directory is reachable.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn read(&self, name: &str) -> Result<Vec<u8>, AppError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(AppError::ValidationError(format!("invalid asset name '{}'", name)));
        }

        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!("Asset missing: {}", path.display());
                Err(AppError::NotFound(format!("asset '{}'", name)))
            }
            Err(e) => Err(AppError::InternalError(format!(
                "failed to read asset {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_file_and_rejects_traversal() {
        let dir = std::env::temp_dir().join(format!("riva-assets-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("guide.pdf"), b"%PDF-1.4").await.unwrap();

        let store = FsAssetStore::new(&dir);
        assert_eq!(store.read("guide.pdf").await.unwrap(), b"%PDF-1.4");
        assert!(matches!(
            store.read("missing.pdf").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(AppError::ValidationError(_))
        ));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
