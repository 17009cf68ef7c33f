//! 兜底供应商：Hugging Face
//!
//! 通用推理路由，批量能力较弱：子批最多 10 题逐批发送；
//! 被限流时按 120 秒记账并放弃剩余子批

use async_trait::async_trait;
use std::time::Instant;
use tracing::warn;

use crate::config::Config;
use crate::providers::shared::{openai_chat, ChatOutcome, ProviderCore};
use crate::providers::{BatchResult, Provider, ProviderQuestion, RateLimitStatus};

const ENDPOINT: &str = "https://router.huggingface.co/v1/chat/completions";
const SYSTEM_MESSAGE: &str = "Return ONLY JSON: {\"<index>\": \"<letter>\"}";
/// 单个子批的题目数上限
const SUB_BATCH: usize = 10;
/// 兜底供应商的限流恢复期更长
const DEFAULT_RETRY_AFTER_SECS: u64 = 120;

/// Hugging Face 适配器
pub struct HuggingFaceProvider {
    core: ProviderCore,
    model: String,
}

impl HuggingFaceProvider {
    pub fn new(config: &Config) -> Self {
        let keys = if config.hf_access_token.is_empty() {
            Vec::new()
        } else {
            vec![config.hf_access_token.clone()]
        };
        Self {
            core: ProviderCore::new(
                "HuggingFace",
                keys,
                config.provider_timeout_secs,
                config.prompt_max_len,
            ),
            model: config.hf_model.clone(),
        }
    }
}

#[async_trait]
impl Provider for HuggingFaceProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn priority(&self) -> u8 {
        4
    }

    fn is_available(&self) -> bool {
        self.core.has_keys()
    }

    async fn solve_batch(&self, questions: &[ProviderQuestion]) -> BatchResult {
        let started = Instant::now();
        let total = questions.len();

        let token = match self.core.next_key() {
            Some(k) => k.to_string(),
            None => return BatchResult::failure(self.name(), total, 0),
        };

        let mut responses = Vec::new();
        let mut tokens_used = 0u64;
        let mut throttled = false;

        for sub in questions.chunks(SUB_BATCH) {
            let prompt = self.core.build_prompt(sub);
            let outcome = openai_chat(
                &self.core,
                ENDPOINT,
                &token,
                &self.model,
                SYSTEM_MESSAGE,
                &prompt,
                DEFAULT_RETRY_AFTER_SECS,
            )
            .await;

            match outcome {
                ChatOutcome::Success { content, tokens } => {
                    tokens_used += tokens;
                    responses.extend(self.core.parse_answer_map(&content, sub));
                }
                ChatOutcome::RateLimited { retry_after_secs } => {
                    self.core.record_rate_limit(retry_after_secs);
                    throttled = true;
                    break;
                }
                ChatOutcome::Failed { detail } => {
                    warn!("⚠️ [HuggingFace] {}", detail);
                    break;
                }
            }
        }

        if responses.is_empty() {
            return BatchResult::failure(self.name(), total, elapsed_ms(started));
        }

        if !throttled {
            self.core.record_success();
        }
        let answered = responses.len();
        BatchResult {
            responses,
            provider: self.name().to_string(),
            tokens_used,
            duration_ms: elapsed_ms(started),
            questions_answered: answered,
            questions_failed: total - answered,
        }
    }

    fn rate_limit_status(&self) -> RateLimitStatus {
        self.core.rate_limit_status()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
