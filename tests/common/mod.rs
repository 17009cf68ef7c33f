//! 集成测试共用设施：脚本化桩供应商与题目构造

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use quiz_pipeline::models::quiz::AnswerSource;
use quiz_pipeline::models::{ParsedChoice, ParsedQuestion};
use quiz_pipeline::providers::{
    BatchResult, Provider, ProviderAnswer, ProviderQuestion, RateLimitStatus,
};

/// 脚本步骤：每次 solve_batch 按顺序消费一步
pub enum ScriptStep {
    /// 返回给定的 (序号, 答案键) 映射
    Answers(Vec<(usize, &'static str)>),
    /// 模拟 429：限流记账后返回零答案
    RateLimited { retry_after_secs: u64 },
    /// 零答案（瞬时失败）
    Empty,
}

/// 脚本化桩供应商
pub struct ScriptedProvider {
    name: &'static str,
    priority: u8,
    available: bool,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    /// 每次调用看到的题目序号
    pub seen_batches: Mutex<Vec<Vec<usize>>>,
    status: Mutex<RateLimitStatus>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, priority: u8, steps: Vec<ScriptStep>) -> Self {
        Self {
            name,
            priority,
            available: true,
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            seen_batches: Mutex::new(Vec::new()),
            status: Mutex::new(RateLimitStatus::default()),
        }
    }

    /// 未配置密钥的供应商
    pub fn unavailable(name: &'static str, priority: u8) -> Self {
        let mut provider = Self::new(name, priority, Vec::new());
        provider.available = false;
        provider
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn solve_batch(&self, questions: &[ProviderQuestion]) -> BatchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_batches
            .lock()
            .unwrap()
            .push(questions.iter().map(|q| q.index).collect());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptStep::Empty);

        match step {
            ScriptStep::Answers(list) => {
                let responses: Vec<ProviderAnswer> = list
                    .iter()
                    .filter(|(index, _)| questions.iter().any(|q| q.index == *index))
                    .map(|(index, key)| ProviderAnswer {
                        index: *index,
                        correct_key: key.to_string(),
                    })
                    .collect();
                let answered = responses.len();
                BatchResult {
                    responses,
                    provider: self.name.to_string(),
                    tokens_used: 10,
                    duration_ms: 1,
                    questions_answered: answered,
                    questions_failed: questions.len() - answered,
                }
            }
            ScriptStep::RateLimited { retry_after_secs } => {
                *self.status.lock().unwrap() = RateLimitStatus {
                    remaining: Some(0),
                    reset_at: Some(Utc::now() + ChronoDuration::seconds(retry_after_secs as i64)),
                };
                BatchResult::failure(self.name, questions.len(), 1)
            }
            ScriptStep::Empty => BatchResult::failure(self.name, questions.len(), 1),
        }
    }

    fn rate_limit_status(&self) -> RateLimitStatus {
        *self.status.lock().unwrap()
    }
}

/// 构造一个解析后的题目
pub fn question(index: usize, stem: &str, choices: &[(&str, &str)]) -> ParsedQuestion {
    ParsedQuestion {
        index,
        stem: stem.to_string(),
        choices: choices
            .iter()
            .map(|(key, text)| ParsedChoice {
                key: key.to_string(),
                text: text.to_string(),
                is_visually_marked: false,
            })
            .collect(),
        correct_answer_key: String::new(),
        section: "Nội dung chung".to_string(),
        source: AnswerSource::AiGenerated,
    }
}
