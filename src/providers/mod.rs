//! AI 供应商适配器
//!
//! ## 职责
//!
//! 在 N 个语言模型后端之上提供统一的批量解答接口：
//!
//! - **密钥轮换**：适配器持有有序密钥表，轮询取用
//! - **频率限制记账**：429 时记下 remaining = 0 与恢复时间，
//!   由编排层决定是否跳过
//! - **提示词构建**：统一的编号题目块格式，外加注入防护过滤
//! - **响应解析**：JSON 直接解析失败后做确定性修复再解析
//!
//! ## 设计
//!
//! 适配器是实现 `Provider` trait 的普通结构体，不搞继承；
//! 公共行为收在 `ProviderCore` 里由各适配器持有

pub mod gemini;
pub mod github;
pub mod groq;
pub mod huggingface;
pub mod json_repair;
pub mod shared;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use gemini::GeminiProvider;
pub use github::GithubModelsProvider;
pub use groq::GroqProvider;
pub use huggingface::HuggingFaceProvider;
pub use shared::ProviderCore;

/// 送往供应商的单个题目
#[derive(Debug, Clone)]
pub struct ProviderQuestion {
    /// 题目序号（1 起，文档内唯一）
    pub index: usize,
    /// 题干
    pub stem: String,
    /// 选项 (键, 文本)
    pub choices: Vec<(String, String)>,
    /// 章节（可选，拼入提示词帮助模型理解上下文）
    pub section: Option<String>,
}

/// 供应商给出的单题答案
#[derive(Debug, Clone)]
pub struct ProviderAnswer {
    /// 题目序号
    pub index: usize,
    /// 答案键（单个大写字母）
    pub correct_key: String,
}

/// 批量解答结果
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// 各题答案
    pub responses: Vec<ProviderAnswer>,
    /// 供应商名称
    pub provider: String,
    /// 消耗 token 数
    pub tokens_used: u64,
    /// 调用耗时（毫秒）
    pub duration_ms: u64,
    /// 成功解答数
    pub questions_answered: usize,
    /// 未解答数
    pub questions_failed: usize,
}

impl BatchResult {
    /// 全部失败的结果（网络 / 解析错误时使用）
    pub fn failure(provider: impl Into<String>, total: usize, duration_ms: u64) -> Self {
        Self {
            responses: Vec::new(),
            provider: provider.into(),
            tokens_used: 0,
            duration_ms,
            questions_answered: 0,
            questions_failed: total,
        }
    }
}

/// 频率限制状态快照
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitStatus {
    /// 剩余配额；None 表示未知（视为可用）
    pub remaining: Option<u32>,
    /// 配额恢复时间
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// 是否处于"已限流且尚未恢复"状态
    pub fn is_throttled(&self, now: DateTime<Utc>) -> bool {
        self.remaining == Some(0) && self.reset_at.map(|t| now < t).unwrap_or(false)
    }
}

/// 供应商统一接口
///
/// 实现者是普通结构体；公共能力（密钥轮换、限流记账、提示词、
/// JSON 修复）都在各自持有的 ProviderCore 中
#[async_trait]
pub trait Provider: Send + Sync {
    /// 供应商名称（写入缓存与结果统计）
    fn name(&self) -> &str;

    /// 优先级，数字越小越先尝试
    fn priority(&self) -> u8;

    /// 是否可用（默认语义：至少配置了一个密钥）
    fn is_available(&self) -> bool;

    /// 批量解答
    ///
    /// 网络 / 解析错误不向上抛：返回 questions_answered = 0 的结果，
    /// 由编排层降级到下一个供应商
    async fn solve_batch(&self, questions: &[ProviderQuestion]) -> BatchResult;

    /// 当前频率限制状态
    fn rate_limit_status(&self) -> RateLimitStatus;
}
