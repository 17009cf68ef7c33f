//! 次级供应商：GitHub Models
//!
//! OpenAI 风格对话接口，系统消息压到最短以省输入 token

use async_trait::async_trait;
use std::time::Instant;
use tracing::warn;

use crate::config::Config;
use crate::providers::shared::{openai_chat, ChatOutcome, ProviderCore};
use crate::providers::{BatchResult, Provider, ProviderQuestion, RateLimitStatus};

const ENDPOINT: &str = "https://models.inference.ai.azure.com/chat/completions";
const SYSTEM_MESSAGE: &str = "Return ONLY JSON: {\"<index>\": \"<letter>\"}";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// GitHub Models 适配器
pub struct GithubModelsProvider {
    core: ProviderCore,
    model: String,
}

impl GithubModelsProvider {
    pub fn new(config: &Config) -> Self {
        let keys = if config.github_token.is_empty() {
            Vec::new()
        } else {
            vec![config.github_token.clone()]
        };
        Self {
            core: ProviderCore::new(
                "GitHub",
                keys,
                config.provider_timeout_secs,
                config.prompt_max_len,
            ),
            model: config.github_model.clone(),
        }
    }
}

#[async_trait]
impl Provider for GithubModelsProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn priority(&self) -> u8 {
        2
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

        let prompt = self.core.build_prompt(questions);
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

        let (content, tokens) = match outcome {
            ChatOutcome::Success { content, tokens } => (content, tokens),
            ChatOutcome::RateLimited { retry_after_secs } => {
                self.core.record_rate_limit(retry_after_secs);
                return BatchResult::failure(self.name(), total, elapsed_ms(started));
            }
            ChatOutcome::Failed { detail } => {
                warn!("⚠️ [GitHub] {}", detail);
                return BatchResult::failure(self.name(), total, elapsed_ms(started));
            }
        };

        let responses = self.core.parse_answer_map(&content, questions);
        if responses.is_empty() {
            warn!("⚠️ [GitHub] 未解析出任何答案映射");
            return BatchResult::failure(self.name(), total, elapsed_ms(started));
        }

        self.core.record_success();
        let answered = responses.len();
        BatchResult {
            responses,
            provider: self.name().to_string(),
            tokens_used: tokens,
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
