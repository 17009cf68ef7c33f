use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 测验处理状态
///
/// 状态机：
/// Pending ─► Processing ─► Completed
///               ├─► WaitingAi   （供应商暂时全部不可用，任务延后重排）
///               └─► Failed      （解析失败，触发清理）
///
/// NeedsReview 为保留状态，当前流水线不会产生它。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuizStatus {
    /// 已创建，等待处理
    Pending,
    /// 正在处理中
    Processing,
    /// 处理完成
    Completed,
    /// 需要人工复核（保留状态）
    NeedsReview,
    /// 等待 AI 供应商恢复
    WaitingAi,
    /// 解析失败
    Failed,
}

/// 上传文档类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// PDF 文档
    Pdf,
    /// DOCX 及同类格式（doc / odt / rtf）
    Docx,
    /// 纯文本
    Text,
}

impl DocumentKind {
    /// 对应的外部接口字符串（任务载荷中使用）
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Text => "text",
        }
    }
}

/// 答案来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerSource {
    /// 文档中的视觉标记（加粗、下划线、高亮、✓）
    StyleDetected,
    /// AI 解答（含缓存命中与兜底答案）
    AiGenerated,
    /// 人工录入
    Manual,
}

/// 单个选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// 选项键（A-F 单个大写字母）
    pub key: String,
    /// 选项文本
    pub text: String,
    /// 是否带有视觉标记
    #[serde(default)]
    pub is_visually_marked: bool,
}

/// 单个题目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// 题干
    pub stem: String,
    /// 选项列表（2-6 个，键从 A 起连续）
    pub choices: Vec<Choice>,
    /// 正确答案键（空字符串表示尚未确定）
    #[serde(default)]
    pub correct_answer_key: String,
    /// 答案解释
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// 答案来源
    pub source: AnswerSource,
    /// 所属章节
    pub section: String,
}

impl Question {
    /// 校验答案键是否指向某个存在的选项
    pub fn answer_key_is_valid(&self) -> bool {
        self.correct_answer_key.is_empty()
            || self.choices.iter().any(|c| c.key == self.correct_answer_key)
    }
}

/// 章节题目数量
///
/// 注意：必须是 (name, count) 记录列表而不是映射，
/// 章节名可能含 "."（如 "CLO 1"、"2.3"），映射键会与文档存储的
/// 点路径更新语义冲突。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionCount {
    /// 章节名（已规范化）
    pub name: String,
    /// 该章节下的题目数
    pub count: usize,
}

/// 测验记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    /// 唯一标识
    pub id: String,
    /// 标题
    pub title: String,
    /// 源文档位置（本地路径或归档 URL）
    pub document_url: String,
    /// 源文档类型
    pub document_kind: DocumentKind,
    /// 文档内容 MD5（hex，用于上传去重）
    pub file_hash: String,
    /// 处理状态
    pub status: QuizStatus,
    /// 题目总数
    pub total_questions: usize,
    /// 已处理题目数
    pub processed_questions: usize,
    /// 题目列表（按解析顺序）
    pub questions: Vec<Question>,
    /// 发现的章节（按首次出现顺序，去重）
    pub sections: Vec<String>,
    /// 各章节题目数
    pub section_counts: Vec<SectionCount>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 所有者
    pub created_by: String,
    /// 软删除标记
    #[serde(default)]
    pub is_deleted: bool,
}

impl Quiz {
    /// 创建一条待处理的测验记录
    pub fn new(
        title: impl Into<String>,
        document_url: impl Into<String>,
        document_kind: DocumentKind,
        file_hash: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            document_url: document_url.into(),
            document_kind,
            file_hash: file_hash.into(),
            status: QuizStatus::Pending,
            total_questions: 0,
            processed_questions: 0,
            questions: Vec::new(),
            sections: Vec::new(),
            section_counts: Vec::new(),
            created_at: now,
            updated_at: now,
            created_by: created_by.into(),
            is_deleted: false,
        }
    }
}

/// 上传结果
///
/// 去重信息作为独立的返回类型，不附加在 Quiz 上
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// 新测验已创建并入队
    New(Quiz),
    /// 内容与已有测验重复
    Duplicate {
        /// 已存在的测验 ID
        quiz_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_with_key(key: &str) -> Question {
        Question {
            stem: "Thủ đô của Việt Nam?".to_string(),
            choices: vec![
                Choice {
                    key: "A".to_string(),
                    text: "Hà Nội".to_string(),
                    is_visually_marked: false,
                },
                Choice {
                    key: "B".to_string(),
                    text: "Huế".to_string(),
                    is_visually_marked: false,
                },
            ],
            correct_answer_key: key.to_string(),
            explanation: None,
            source: AnswerSource::AiGenerated,
            section: "Nội dung chung".to_string(),
        }
    }

    #[test]
    fn test_answer_key_validity() {
        // 空答案键合法（尚未解答）
        assert!(question_with_key("").answer_key_is_valid());
        // 指向存在的选项合法
        assert!(question_with_key("B").answer_key_is_valid());
        // 指向不存在的选项非法
        assert!(!question_with_key("D").answer_key_is_valid());
    }

    #[test]
    fn test_new_quiz_starts_pending() {
        let quiz = Quiz::new("Đề thi", "file:///tmp/đề.pdf", DocumentKind::Pdf, "hash", "user-1");
        assert_eq!(quiz.status, QuizStatus::Pending);
        assert_eq!(quiz.total_questions, 0);
        assert!(!quiz.is_deleted);
        assert!(!quiz.id.is_empty());
    }
}
