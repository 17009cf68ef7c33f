//! 文件持久化的答案缓存
//!
//! 内存 HashMap 加 JSON 文件落盘。复合键唯一性由 map 键保证，
//! 命中计数的原子性由互斥锁保证。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::AnswerCacheStore;
use crate::models::CachedAnswer;

/// 文件缓存
pub struct FileAnswerCache {
    path: PathBuf,
    entries: Mutex<HashMap<(String, String), CachedAnswer>>,
}

impl FileAnswerCache {
    /// 打开缓存文件；不存在或损坏时从空缓存开始
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut map = HashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<CachedAnswer>>(&content) {
                Ok(list) => {
                    for entry in list {
                        map.insert(
                            (entry.stem_hash.clone(), entry.choices_hash.clone()),
                            entry,
                        );
                    }
                    debug!("✓ 已加载 {} 条缓存记录: {}", map.len(), path.display());
                }
                Err(e) => {
                    warn!("⚠️ 缓存文件损坏，从空缓存开始 ({}): {}", path.display(), e);
                }
            },
            Err(_) => {
                debug!("缓存文件不存在，从空缓存开始: {}", path.display());
            }
        }

        Self {
            path,
            entries: Mutex::new(map),
        }
    }

    /// 当前记录数（测试用）
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 落盘；失败只记日志
    async fn persist(&self, entries: &HashMap<(String, String), CachedAnswer>) {
        let list: Vec<&CachedAnswer> = entries.values().collect();
        let json = match serde_json::to_string(&list) {
            Ok(json) => json,
            Err(e) => {
                warn!("⚠️ 缓存序列化失败: {}", e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(&self.path, json).await {
            warn!("⚠️ 缓存写入失败 ({}): {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl AnswerCacheStore for FileAnswerCache {
    async fn lookup(&self, stem_hash: &str, choices_hash: &str) -> Option<CachedAnswer> {
        let mut entries = self.entries.lock().await;
        let key = (stem_hash.to_string(), choices_hash.to_string());

        let hit = match entries.get_mut(&key) {
            Some(entry) => {
                entry.hit_count += 1;
                entry.last_hit_at = Utc::now();
                entry.clone()
            }
            None => return None,
        };

        self.persist(&entries).await;
        Some(hit)
    }

    async fn write_batch(&self, batch: Vec<CachedAnswer>) {
        if batch.is_empty() {
            return;
        }

        let mut entries = self.entries.lock().await;
        let mut inserted = 0;
        for entry in batch {
            let key = (entry.stem_hash.clone(), entry.choices_hash.clone());
            // 仅插入：已有记录的答案字段保持首个权威值
            entries.entry(key).or_insert_with(|| {
                inserted += 1;
                entry
            });
        }

        if inserted > 0 {
            debug!("✓ 缓存新增 {} 条记录", inserted);
            self.persist(&entries).await;
        }
    }
}
