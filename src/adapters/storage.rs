use crate::domain::ports::Storage;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 以本機目錄為根的檔案存取
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// 拆成 (目錄, 檔名)，讓設定中的快照路徑可以直接使用
    pub fn for_file(path: &str) -> (Self, String) {
        let path = Path::new(path);
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (Self::new(base), name)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_creates_directories() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("cache/fo.json", b"[]").await.unwrap();
        let data = storage.read_file("cache/fo.json").await.unwrap();

        assert_eq!(data, b"[]");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        let err = storage.read_file("missing.json").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::ScanError::IoError(_)));
    }

    #[test]
    fn test_for_file_splits_directory_and_name() {
        let (storage, name) = LocalStorage::for_file("data/fo_snapshot.json");
        assert_eq!(storage.base_path, PathBuf::from("data"));
        assert_eq!(name, "fo_snapshot.json");

        let (storage, name) = LocalStorage::for_file("fo_snapshot.json");
        assert_eq!(storage.base_path, PathBuf::from("."));
        assert_eq!(name, "fo_snapshot.json");
    }
}
