//! 缓存优先的多供应商解答引擎

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::{question_cache_keys, AnswerCacheStore};
use crate::config::Config;
use crate::models::{CachedAnswer, ParsedQuestion};
use crate::providers::{Provider, ProviderQuestion};

/// 缓存命中时的供应商标签
const CACHE_LABEL: &str = "Cache";

/// 解答选项
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// 每块题目数
    pub chunk_size: usize,
    /// 单个供应商内的最大重试次数
    pub max_retries: usize,
    /// 线性退避基数（毫秒）：第 n 次重试前睡 n × base
    pub retry_base_ms: u64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            chunk_size: 30,
            max_retries: 2,
            retry_base_ms: 1000,
        }
    }
}

impl SolveOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_retries: config.max_retries,
            ..Default::default()
        }
    }
}

/// 单题的最终答案
#[derive(Debug, Clone)]
pub struct SolvedAnswer {
    /// 题目序号
    pub index: usize,
    /// 答案键
    pub correct_key: String,
    /// 答案解释（目前仅缓存命中会带）
    pub explanation: Option<String>,
    /// 解答来源（"Cache" 或供应商名）
    pub provider: String,
}

/// 编排结果
#[derive(Debug, Default)]
pub struct OrchestratorResult {
    /// 各题答案，按序号升序
    pub responses: Vec<SolvedAnswer>,
    /// 实际参与过的供应商（插入序去重；有缓存命中时含 "Cache"）
    pub providers_used: Vec<String>,
    /// 缓存命中数
    pub cache_hits: usize,
    /// 缓存未命中数
    pub cache_misses: usize,
    /// 消耗 token 总数
    pub total_tokens: u64,
    /// 所有供应商都没答出来的题目数
    pub failed_questions: usize,
    /// 本轮是否有供应商报告限流（暂缓重排的判断依据）
    pub any_rate_limited: bool,
}

/// 答案编排器
///
/// 协作者全部注入：测试用内存缓存与桩供应商替换
pub struct AnswerOrchestrator {
    cache: Arc<dyn AnswerCacheStore>,
    providers: Vec<Arc<dyn Provider>>,
    options: SolveOptions,
}

impl AnswerOrchestrator {
    pub fn new(
        cache: Arc<dyn AnswerCacheStore>,
        mut providers: Vec<Arc<dyn Provider>>,
        options: SolveOptions,
    ) -> Self {
        // 优先级小的先试
        providers.sort_by_key(|p| p.priority());
        Self {
            cache,
            providers,
            options,
        }
    }

    /// 解答一批题目
    ///
    /// 供应商错误全部内部消化，调用方只会看到答案与统计
    pub async fn solve_questions(&self, questions: &[ParsedQuestion]) -> OrchestratorResult {
        let mut result = OrchestratorResult::default();

        // ========== 阶段 1: 缓存查询 ==========
        let mut uncached: Vec<ProviderQuestion> = Vec::new();
        for question in questions {
            let (stem_hash, choices_hash) = question_cache_keys(question);
            match self.cache.lookup(&stem_hash, &choices_hash).await {
                Some(hit) => {
                    result.cache_hits += 1;
                    result.responses.push(SolvedAnswer {
                        index: question.index,
                        correct_key: hit.correct_key,
                        explanation: hit.explanation,
                        provider: CACHE_LABEL.to_string(),
                    });
                }
                None => {
                    result.cache_misses += 1;
                    uncached.push(to_provider_question(question));
                }
            }
        }

        if result.cache_hits > 0 {
            result.providers_used.push(CACHE_LABEL.to_string());
        }
        info!(
            "📊 缓存命中 {}/{}，待解答 {}",
            result.cache_hits,
            questions.len(),
            uncached.len()
        );

        if uncached.is_empty() {
            result.responses.sort_by_key(|r| r.index);
            return result;
        }

        // 序号 → 原始题目，回写缓存时要用
        let by_index: HashMap<usize, &ParsedQuestion> =
            questions.iter().map(|q| (q.index, q)).collect();

        // ========== 阶段 2: 分块 + 供应商降级 ==========
        let mut writebacks = Vec::new();
        let chunks: Vec<Vec<ProviderQuestion>> = uncached
            .chunks(self.options.chunk_size)
            .map(|c| c.to_vec())
            .collect();

        for chunk in chunks {
            let mut remaining = chunk;

            for provider in &self.providers {
                if remaining.is_empty() {
                    break;
                }
                if !provider.is_available() {
                    debug!("[{}] 未配置密钥，跳过", provider.name());
                    continue;
                }
                if provider.rate_limit_status().is_throttled(Utc::now()) {
                    result.any_rate_limited = true;
                    debug!("[{}] 限流尚未恢复，跳过", provider.name());
                    continue;
                }

                push_unique(&mut result.providers_used, provider.name());

                // 供应商内重试：拿到答案即止，限流立即换下家
                for retry in 1..=self.options.max_retries {
                    let batch = provider.solve_batch(&remaining).await;
                    result.total_tokens += batch.tokens_used;

                    if batch.questions_answered > 0 {
                        info!(
                            "✓ [{}] 解答 {}/{} 题 ({} ms)",
                            batch.provider,
                            batch.questions_answered,
                            remaining.len(),
                            batch.duration_ms
                        );

                        let answered: Vec<usize> =
                            batch.responses.iter().map(|r| r.index).collect();
                        for answer in &batch.responses {
                            result.responses.push(SolvedAnswer {
                                index: answer.index,
                                correct_key: answer.correct_key.clone(),
                                explanation: None,
                                provider: batch.provider.clone(),
                            });
                        }
                        remaining.retain(|q| !answered.contains(&q.index));

                        // 异步回写缓存，标注本次胜出的供应商
                        let entries =
                            build_cache_entries(&batch.responses, &by_index, &batch.provider);
                        let cache = Arc::clone(&self.cache);
                        writebacks.push(tokio::spawn(async move {
                            cache.write_batch(entries).await;
                        }));
                        break;
                    }

                    let status = provider.rate_limit_status();
                    if status.remaining == Some(0) {
                        // 限流：不睡，直接换下一个供应商
                        result.any_rate_limited = true;
                        break;
                    }
                    if retry < self.options.max_retries {
                        let backoff = self.options.retry_base_ms * retry as u64;
                        debug!("[{}] 第 {} 次无答案，{} ms 后重试", provider.name(), retry, backoff);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }

            if !remaining.is_empty() {
                warn!("⚠️ {} 题在所有供应商处都未得到答案", remaining.len());
                result.failed_questions += remaining.len();
            }
        }

        // ========== 阶段 3: 汇总 ==========
        // 回写是尽力而为的：等它们结束只为测试可观测，失败不影响结果
        futures::future::join_all(writebacks).await;

        result.responses.sort_by_key(|r| r.index);
        result
    }
}

/// 转换为供应商题目形状
fn to_provider_question(q: &ParsedQuestion) -> ProviderQuestion {
    ProviderQuestion {
        index: q.index,
        stem: q.stem.clone(),
        choices: q
            .choices
            .iter()
            .map(|c| (c.key.clone(), c.text.clone()))
            .collect(),
        section: if q.section.is_empty() {
            None
        } else {
            Some(q.section.clone())
        },
    }
}

/// 为成功批次构建缓存记录
fn build_cache_entries(
    responses: &[crate::providers::ProviderAnswer],
    by_index: &HashMap<usize, &ParsedQuestion>,
    provider: &str,
) -> Vec<CachedAnswer> {
    responses
        .iter()
        .filter_map(|answer| {
            let question = by_index.get(&answer.index)?;
            let (stem_hash, choices_hash) = question_cache_keys(question);
            Some(CachedAnswer {
                stem_hash,
                choices_hash,
                correct_key: answer.correct_key.clone(),
                explanation: None,
                confidence: None,
                provider: provider.to_string(),
                hit_count: 0,
                last_hit_at: Utc::now(),
            })
        })
        .collect()
}

/// 插入序去重
fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}
