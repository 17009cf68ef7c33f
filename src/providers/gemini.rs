//! 主力供应商：Gemini
//!
//! 高吞吐批量解答，单批最多 40 题，使用原生 JSON 输出模式
//! （responseMimeType），支持逗号分隔的多密钥轮换

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::providers::shared::{retry_after_secs, ProviderCore};
use crate::providers::{BatchResult, Provider, ProviderQuestion, RateLimitStatus};

/// 单批题目数上限
const MAX_BATCH: usize = 40;
/// 429 缺少 Retry-After 时的默认等待
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Gemini 适配器
pub struct GeminiProvider {
    core: ProviderCore,
    model: String,
}

impl GeminiProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            core: ProviderCore::new(
                "Gemini",
                config.gemini_api_keys.clone(),
                config.provider_timeout_secs,
                config.prompt_max_len,
            ),
            model: "gemini-2.0-flash".to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn priority(&self) -> u8 {
        1
    }

    fn is_available(&self) -> bool {
        self.core.has_keys()
    }

    async fn solve_batch(&self, questions: &[ProviderQuestion]) -> BatchResult {
        let started = Instant::now();
        let questions = &questions[..questions.len().min(MAX_BATCH)];
        let total = questions.len();

        let key = match self.core.next_key() {
            Some(k) => k,
            None => return BatchResult::failure(self.name(), total, 0),
        };

        let prompt = self.core.build_prompt(questions);
        debug!("[Gemini] 发送 {} 题，提示词 {} 字符", total, prompt.len());

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.1,
                "responseMimeType": "application/json"
            }
        });

        let response = match self
            .core
            .client()
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("⚠️ [Gemini] 请求失败: {}", e);
                return BatchResult::failure(self.name(), total, elapsed_ms(started));
            }
        };

        if response.status().as_u16() == 429 {
            let secs = retry_after_secs(&response, DEFAULT_RETRY_AFTER_SECS);
            self.core.record_rate_limit(secs);
            return BatchResult::failure(self.name(), total, elapsed_ms(started));
        }
        if !response.status().is_success() {
            warn!("⚠️ [Gemini] HTTP {}", response.status());
            return BatchResult::failure(self.name(), total, elapsed_ms(started));
        }

        let value: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("⚠️ [Gemini] 响应体不是 JSON: {}", e);
                return BatchResult::failure(self.name(), total, elapsed_ms(started));
            }
        };

        let content = value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        let tokens = value["usageMetadata"]["totalTokenCount"].as_u64().unwrap_or(0);

        let responses = self.core.parse_answer_map(content, questions);
        if responses.is_empty() {
            warn!("⚠️ [Gemini] 未解析出任何答案映射");
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
