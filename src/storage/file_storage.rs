//! 文档长期存储
//!
//! 测验完成后把源文档从暂存区移交长期存储。失败不影响任务结果，
//! 只保留本地文件并记警告。

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult, StorageError};

/// 已归档文件
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// 归档后的访问位置
    pub url: String,
    /// 归档内部 ID（删除时使用）
    pub id: String,
}

/// 文件归档接口
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// 上传本地文件
    async fn upload_file(&self, local_path: &Path, name: &str, mime: &str)
        -> AppResult<StoredFile>;

    /// 删除归档文件，返回是否确实删除了
    async fn delete_file(&self, id: &str) -> AppResult<bool>;
}

/// 本地归档目录实现
pub struct LocalArchiveStorage {
    archive_dir: PathBuf,
}

impl LocalArchiveStorage {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }
}

#[async_trait]
impl FileStorage for LocalArchiveStorage {
    async fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        _mime: &str,
    ) -> AppResult<StoredFile> {
        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .map_err(|e| {
                AppError::storage_write_failed(self.archive_dir.display().to_string(), e)
            })?;

        let id = format!("{}_{}", uuid::Uuid::new_v4(), name);
        let target = self.archive_dir.join(&id);

        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| AppError::storage_write_failed(target.display().to_string(), e))?;

        Ok(StoredFile {
            url: format!("file://{}", target.display()),
            id,
        })
    }

    async fn delete_file(&self, id: &str) -> AppResult<bool> {
        let path = self.archive_dir.join(id);
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(StorageError::DeleteFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_delete() {
        let base = std::env::temp_dir().join(format!("quiz_archive_{}", uuid::Uuid::new_v4()));
        let storage = LocalArchiveStorage::new(base.join("archive"));

        tokio::fs::create_dir_all(&base).await.unwrap();
        let source = base.join("đề.txt");
        tokio::fs::write(&source, "Câu 1: nội dung").await.unwrap();

        let stored = storage
            .upload_file(&source, "đề.txt", "text/plain")
            .await
            .unwrap();
        assert!(stored.url.starts_with("file://"));
        assert!(stored.id.ends_with("đề.txt"));

        assert!(storage.delete_file(&stored.id).await.unwrap());
        // 再删一次：文件已不存在
        assert!(!storage.delete_file(&stored.id).await.unwrap());
    }
}
