//! 测验记录存储
//!
//! 持久化用读-改-写（加载 → 修改 → 保存），不做局部更新，
//! 保证子文档身份稳定

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{AppError, AppResult, StorageError};
use crate::models::Quiz;

/// 测验存储接口
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// 保存（插入或整体覆盖）
    async fn save(&self, quiz: &Quiz) -> AppResult<()>;

    /// 按 ID 加载
    async fn load(&self, id: &str) -> AppResult<Quiz>;

    /// 按内容哈希查找未删除的测验（上传去重）
    async fn find_by_hash(&self, file_hash: &str) -> AppResult<Option<Quiz>>;

    /// 删除记录（解析失败的终态清理）
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// 文件系统实现：每条测验一个 JSON 文件
pub struct FileQuizStore {
    dir: PathBuf,
}

impl FileQuizStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn quiz_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl QuizStore for FileQuizStore {
    async fn save(&self, quiz: &Quiz) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::storage_write_failed(self.dir.display().to_string(), e))?;

        let path = self.quiz_path(&quiz.id);
        let json = serde_json::to_string_pretty(quiz)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| AppError::storage_write_failed(path.display().to_string(), e))?;
        Ok(())
    }

    async fn load(&self, id: &str) -> AppResult<Quiz> {
        let path = self.quiz_path(id);
        let content = tokio::fs::read_to_string(&path).await.map_err(|_| {
            AppError::Storage(StorageError::NotFound { id: id.to_string() })
        })?;
        let quiz = serde_json::from_str(&content)?;
        Ok(quiz)
    }

    async fn find_by_hash(&self, file_hash: &str) -> AppResult<Option<Quiz>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // 目录还不存在 = 还没有任何测验
            Err(_) => return Ok(None),
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(quiz) = serde_json::from_str::<Quiz>(&content) else {
                continue;
            };
            if quiz.file_hash == file_hash && !quiz.is_deleted {
                return Ok(Some(quiz));
            }
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let path = self.quiz_path(id);
        tokio::fs::remove_file(&path).await.map_err(|e| {
            AppError::Storage(StorageError::DeleteFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::DocumentKind;

    fn temp_store() -> FileQuizStore {
        FileQuizStore::new(
            std::env::temp_dir().join(format!("quiz_store_{}", uuid::Uuid::new_v4())),
        )
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = temp_store();
        let quiz = Quiz::new("Đề thi thử", "file:///tmp/a.pdf", DocumentKind::Pdf, "abc123", "user-1");

        store.save(&quiz).await.unwrap();
        let loaded = store.load(&quiz.id).await.unwrap();
        assert_eq!(loaded.title, "Đề thi thử");
        assert_eq!(loaded.file_hash, "abc123");
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = temp_store();
        let err = store.load("không-có").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_find_by_hash_dedup() {
        let store = temp_store();
        assert!(store.find_by_hash("h1").await.unwrap().is_none());

        let quiz = Quiz::new("Đề 1", "file:///tmp/a.pdf", DocumentKind::Pdf, "h1", "user-1");
        store.save(&quiz).await.unwrap();

        let found = store.find_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(found.id, quiz.id);

        // 软删除后不再参与去重
        let mut deleted = quiz.clone();
        deleted.is_deleted = true;
        store.save(&deleted).await.unwrap();
        assert!(store.find_by_hash("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = temp_store();
        let quiz = Quiz::new("Đề 1", "file:///tmp/a.pdf", DocumentKind::Pdf, "h1", "user-1");
        store.save(&quiz).await.unwrap();

        store.delete(&quiz.id).await.unwrap();
        assert!(store.load(&quiz.id).await.is_err());
    }
}
