//! 任务队列载荷

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::quiz::DocumentKind;

/// 测验处理任务
///
/// 队列消息的持久化形态，重试信息由队列维护
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizJob {
    /// 任务 ID
    pub job_id: String,
    /// 关联的测验 ID
    pub quiz_id: String,
    /// 源文档位置（可能带 file:// 前缀）
    pub document_url: String,
    /// 文档类型
    pub document_type: DocumentKind,
    /// 已尝试次数
    #[serde(default)]
    pub attempts_made: u32,
    /// 下次可执行时间
    pub next_attempt_at: DateTime<Utc>,
}

impl QuizJob {
    /// 创建立即可执行的新任务
    pub fn new(
        quiz_id: impl Into<String>,
        document_url: impl Into<String>,
        document_type: DocumentKind,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz_id.into(),
            document_url: document_url.into(),
            document_type,
            attempts_made: 0,
            next_attempt_at: Utc::now(),
        }
    }
}
