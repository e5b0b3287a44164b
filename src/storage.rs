use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocket::fs::TempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;

/// Where uploaded media bytes live. Rows in `media` only keep the stored name.
#[rocket::async_trait]
pub trait MediaStorage: Send + Sync {
    /// Saves the upload under a fresh random name and returns that name.
    async fn store(
        &self,
        file: &mut TempFile<'_>,
        extension: Option<&str>,
    ) -> Result<String, AppError>;

    async fn read(&self, stored_name: &str) -> Result<Vec<u8>, AppError>;

    async fn remove(&self, stored_name: &str) -> Result<(), AppError>;
}

pub type SharedStorage = Arc<dyn MediaStorage>;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, AppError> {
        let valid = !stored_name.is_empty()
            && stored_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !stored_name.starts_with('.');
        if !valid {
            return Err(AppError::Storage(format!(
                "Refusing to resolve stored name {:?}",
                stored_name
            )));
        }
        Ok(self.root.join(stored_name))
    }
}

/// Lowercased extension, kept only when it is short and alphanumeric.
pub fn clean_extension(raw: &str) -> Option<String> {
    let ext = Path::new(raw)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(raw)
        .to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

#[rocket::async_trait]
impl MediaStorage for LocalStorage {
    async fn store(
        &self,
        file: &mut TempFile<'_>,
        extension: Option<&str>,
    ) -> Result<String, AppError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let stored_name = match extension.and_then(clean_extension) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.path_for(&stored_name)?;

        file.copy_to(&path).await?;
        info!(stored_name = %stored_name, size = file.len(), "Stored media file");

        Ok(stored_name)
    }

    async fn read(&self, stored_name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.path_for(stored_name)?;
        debug!(path = %path.display(), "Reading media file");
        Ok(tokio::fs::read(path).await?)
    }

    async fn remove(&self, stored_name: &str) -> Result<(), AppError> {
        let path = self.path_for(stored_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("welfare-ops-media-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_clean_extension() {
        assert_eq!(clean_extension("scan.PDF"), Some("pdf".to_string()));
        assert_eq!(clean_extension("png"), Some("png".to_string()));
        assert_eq!(clean_extension("../../etc/passwd"), None);
        assert_eq!(clean_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(clean_extension(""), None);
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let storage = LocalStorage::new("/tmp/media");
        assert!(storage.path_for("../secret").is_err());
        assert!(storage.path_for(".hidden").is_err());
        assert!(storage.path_for("a/b").is_err());
        assert!(storage.path_for("0b7c.png").is_ok());
    }

    #[rocket::async_test]
    async fn test_store_read_remove() {
        let root = scratch_root();
        let storage = LocalStorage::new(&root);
        let mut file = TempFile::Buffered {
            content: b"signature image",
        };

        let name = storage.store(&mut file, Some("png")).await.unwrap();
        assert!(name.ends_with(".png"));
        assert_eq!(storage.read(&name).await.unwrap(), b"signature image");

        storage.remove(&name).await.unwrap();
        assert!(storage.read(&name).await.is_err());
        // Removing twice is fine.
        storage.remove(&name).await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }
}
