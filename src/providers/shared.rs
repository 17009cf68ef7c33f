//! 适配器公共能力
//!
//! 密钥轮换、频率限制记账、提示词构建（含注入防护）、响应解析与
//! JSON 修复。每个适配器持有一个 ProviderCore，而不是继承基类。

use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::providers::json_repair::repair_json;
use crate::providers::{ProviderAnswer, ProviderQuestion, RateLimitStatus};

/// 注入防护过滤模式
fn injection_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)ignore (all )?(previous|above|prior)",
            r"(?i)forget (everything|all|instructions)",
            r"(?i)disregard (all|previous)",
            r"(?i)new instructions:",
            r"(?i)system:",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("注入防护正则无效"))
        .collect()
    })
}

/// 频率限制内部状态
#[derive(Debug, Default)]
struct RateLimitState {
    remaining: Option<u32>,
    reset_at: Option<chrono::DateTime<Utc>>,
}

/// 适配器公共核心
///
/// 并发说明：限流状态用互斥锁保护，密钥游标用原子数递增取模。
/// 竞争下可能跳过或重复某个密钥，但绝不会丢失
pub struct ProviderCore {
    name: &'static str,
    keys: Vec<String>,
    key_cursor: AtomicUsize,
    rate_limit: Mutex<RateLimitState>,
    client: reqwest::Client,
    prompt_max_len: usize,
}

impl ProviderCore {
    pub fn new(
        name: &'static str,
        keys: Vec<String>,
        timeout_secs: u64,
        prompt_max_len: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            name,
            keys,
            key_cursor: AtomicUsize::new(0),
            rate_limit: Mutex::new(RateLimitState::default()),
            client,
            prompt_max_len,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 是否配置了至少一个密钥
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    /// 轮询取下一个密钥
    pub fn next_key(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let i = self.key_cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Some(self.keys[i].as_str())
    }

    /// 记录 429：remaining 归零，恢复时间 = 现在 + retry_after
    pub fn record_rate_limit(&self, retry_after_secs: u64) {
        warn!(
            "⚠️ [{}] 频率限制，{} 秒后恢复",
            self.name, retry_after_secs
        );
        if let Ok(mut state) = self.rate_limit.lock() {
            state.remaining = Some(0);
            state.reset_at = Some(Utc::now() + ChronoDuration::seconds(retry_after_secs as i64));
        }
    }

    /// 记录一次成功调用：清掉限流标记
    pub fn record_success(&self) {
        if let Ok(mut state) = self.rate_limit.lock() {
            state.remaining = None;
            state.reset_at = None;
        }
    }

    /// 当前限流状态快照
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        match self.rate_limit.lock() {
            Ok(state) => RateLimitStatus {
                remaining: state.remaining,
                reset_at: state.reset_at,
            },
            Err(_) => RateLimitStatus::default(),
        }
    }

    /// 构建批量解答提示词
    ///
    /// 每题一个编号块：可选的 (章节) 前缀、[序号] 题干、缩进的选项行。
    /// 全文经注入防护过滤并截断到长度上限。
    pub fn build_prompt(&self, questions: &[ProviderQuestion]) -> String {
        let mut prompt = String::from(
            "Giải các câu hỏi trắc nghiệm sau. \
             Trả về DUY NHẤT một đối tượng JSON dạng {\"<số thứ tự>\": \"<chữ cái đáp án>\"}.\n\n",
        );

        for q in questions {
            if let Some(section) = &q.section {
                if !section.is_empty() {
                    prompt.push_str(&format!("({}) ", section));
                }
            }
            prompt.push_str(&format!("[{}] {}\n", q.index, q.stem));
            for (key, text) in &q.choices {
                prompt.push_str(&format!("  {}. {}\n", key, text));
            }
            prompt.push('\n');
        }

        sanitize_prompt(&prompt, self.prompt_max_len)
    }

    /// 解析答案映射
    ///
    /// 接受 {"<序号>": "<字母>"} 形式；先去掉 Markdown 代码围栏，
    /// 直接解析失败则修复后重试。序号必须属于本批题目，字母必须是
    /// 该题的选项键。一个有效映射都没有时返回空（视为解析失败）。
    pub fn parse_answer_map(
        &self,
        content: &str,
        questions: &[ProviderQuestion],
    ) -> Vec<ProviderAnswer> {
        let stripped = strip_code_fences(content);

        let value: serde_json::Value = match serde_json::from_str(stripped) {
            Ok(v) => v,
            Err(first_err) => {
                debug!("[{}] JSON 直接解析失败，尝试修复: {}", self.name, first_err);
                let repaired = match repair_json(stripped) {
                    Some(r) => r,
                    None => {
                        warn!("⚠️ [{}] 响应不是 JSON 对象，放弃解析", self.name);
                        return Vec::new();
                    }
                };
                match serde_json::from_str(&repaired) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("⚠️ [{}] JSON 修复后仍无法解析: {}", self.name, e);
                        return Vec::new();
                    }
                }
            }
        };

        let map = match value.as_object() {
            Some(map) => map,
            None => return Vec::new(),
        };

        let mut answers = Vec::new();
        for (raw_index, raw_answer) in map {
            let index: usize = match raw_index.trim().parse() {
                Ok(i) => i,
                Err(_) => continue,
            };
            let question = match questions.iter().find(|q| q.index == index) {
                Some(q) => q,
                None => continue,
            };

            // 答案归一到第一个字母并大写
            let answer_text = match raw_answer {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let key = match answer_text.chars().find(|c| c.is_ascii_alphabetic()) {
                Some(c) => c.to_ascii_uppercase().to_string(),
                None => continue,
            };

            if question.choices.iter().any(|(k, _)| *k == key) {
                answers.push(ProviderAnswer {
                    index,
                    correct_key: key,
                });
            }
        }

        answers
    }
}

/// 注入防护：过滤危险指令片段并截断总长
pub fn sanitize_prompt(prompt: &str, max_len: usize) -> String {
    let mut filtered = prompt.to_string();
    for re in injection_regexes().iter() {
        filtered = re.replace_all(&filtered, "[FILTERED]").into_owned();
    }

    if filtered.chars().count() > max_len {
        filtered = filtered.chars().take(max_len).collect();
    }
    filtered
}

/// 去掉 Markdown 代码围栏
fn strip_code_fences(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// 一次对话调用的结局
#[derive(Debug)]
pub enum ChatOutcome {
    /// 拿到回复文本
    Success { content: String, tokens: u64 },
    /// 被限流（已折算 Retry-After）
    RateLimited { retry_after_secs: u64 },
    /// 网络或协议层失败
    Failed { detail: String },
}

/// 调用 OpenAI 风格的 chat/completions 端点
///
/// GitHub Models、Groq、Hugging Face 路由共用这一报文形状；
/// 各自只差 URL、令牌与模型名
pub async fn openai_chat(
    core: &ProviderCore,
    url: &str,
    token: &str,
    model: &str,
    system_message: &str,
    prompt: &str,
    rate_limit_default_secs: u64,
) -> ChatOutcome {
    let body = serde_json::json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system_message},
            {"role": "user", "content": prompt}
        ],
        "temperature": 0.1,
    });

    let response = match core
        .client()
        .post(url)
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            return ChatOutcome::Failed {
                detail: format!("请求失败: {}", e),
            }
        }
    };

    if response.status().as_u16() == 429 {
        let secs = retry_after_secs(&response, rate_limit_default_secs);
        return ChatOutcome::RateLimited {
            retry_after_secs: secs,
        };
    }
    if !response.status().is_success() {
        return ChatOutcome::Failed {
            detail: format!("HTTP {}", response.status()),
        };
    }

    let value: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            return ChatOutcome::Failed {
                detail: format!("响应体不是 JSON: {}", e),
            }
        }
    };

    let content = value["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    if content.is_empty() {
        return ChatOutcome::Failed {
            detail: "回复内容为空".to_string(),
        };
    }

    let tokens = value["usage"]["total_tokens"].as_u64().unwrap_or(0);
    ChatOutcome::Success { content, tokens }
}

/// 从 429 响应中读 Retry-After（秒），缺失时用默认值
pub fn retry_after_secs(response: &reqwest::Response, default_secs: u64) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default_secs)
}
