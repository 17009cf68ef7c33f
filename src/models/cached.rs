//! 语义缓存记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已缓存的答案
///
/// 主键为 (stem_hash, choices_hash)；答案字段只在首次插入时写入，
/// 后续命中只更新计数器，首个权威答案不会被覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    /// 规范化题干的 MD5
    pub stem_hash: String,
    /// 规范化选项集的 MD5
    pub choices_hash: String,
    /// 正确答案键
    pub correct_key: String,
    /// 答案解释
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// 置信度 [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// 首次解答的供应商名称
    pub provider: String,
    /// 命中次数
    pub hit_count: u64,
    /// 最近命中时间
    pub last_hit_at: DateTime<Utc>,
}
