//! 核心处理流程
//!
//! ## 职责
//!
//! 驱动单个测验任务从头到尾：
//!
//! 1. 测验转入 Processing
//! 2. 解析源文档（file:// 前缀剥掉后交给解析器）
//! 3. 没有视觉标记答案的题目送缓存 / 供应商解答
//! 4. 合并答案，优先级：视觉标记 > 供应商答案 > 字面 "A" 兜底
//! 5. 在内存里算每章节题目数（章节名可能含点号，不能当映射键持久化）
//! 6. 读-改-写整体持久化，状态转 Completed
//! 7. 机会性地把源文档移交长期归档
//!
//! 只有解析错误是致命的（由工作进程触发清理）；供应商彻底失败时
//! 若属于瞬时限流且还有额度，测验转入 WaitingAi 并延迟重排

pub mod intake;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::AnswerCacheStore;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::quiz::{AnswerSource, Choice, DocumentKind, Question, QuizStatus, SectionCount};
use crate::models::{ParsedQuestion, QuizJob};
use crate::orchestrator::{AnswerOrchestrator, SolveOptions, SolvedAnswer};
use crate::parser;
use crate::providers::Provider;
use crate::queue::JobQueue;
use crate::storage::{FileStorage, QuizStore};

pub use intake::register_upload;

/// 流水线协作者
///
/// 全部构造注入，测试用内存实现与桩供应商替换
pub struct PipelineDeps {
    pub config: Config,
    pub quiz_store: Arc<dyn QuizStore>,
    pub file_storage: Arc<dyn FileStorage>,
    pub queue: Arc<dyn JobQueue>,
    pub orchestrator: AnswerOrchestrator,
}

impl PipelineDeps {
    /// 按常规装配（缓存 + 四个供应商）构建
    pub fn new(
        config: Config,
        quiz_store: Arc<dyn QuizStore>,
        file_storage: Arc<dyn FileStorage>,
        queue: Arc<dyn JobQueue>,
        cache: Arc<dyn AnswerCacheStore>,
        providers: Vec<Arc<dyn Provider>>,
    ) -> Self {
        let orchestrator =
            AnswerOrchestrator::new(cache, providers, SolveOptions::from_config(&config));
        Self {
            config,
            quiz_store,
            file_storage,
            queue,
            orchestrator,
        }
    }
}

/// 处理单个测验任务
///
/// # 错误
/// 只有解析错误会作为 `AppError::Parser` 返回；供应商与缓存的一切
/// 故障都在内部消化
pub async fn process_job(job: &QuizJob, deps: &PipelineDeps) -> AppResult<()> {
    info!("[任务 {}] 开始处理测验 {}", job.job_id, job.quiz_id);

    // 1. 转入 Processing
    let mut quiz = deps.quiz_store.load(&job.quiz_id).await?;
    quiz.status = QuizStatus::Processing;
    quiz.updated_at = chrono::Utc::now();
    deps.quiz_store.save(&quiz).await?;

    // 2. 解析文档
    let local_path = strip_file_scheme(&job.document_url).to_string();
    let parsed = parser::parse_document(Path::new(&local_path), job.document_type)
        .await
        .map_err(AppError::Parser)?;

    info!(
        "[任务 {}] 解析出 {} 个题目",
        job.job_id,
        parsed.questions.len()
    );

    // 3. 视觉标记已给出答案的题目不再送解答；其余走缓存 / 供应商
    let to_solve: Vec<ParsedQuestion> = parsed
        .questions
        .iter()
        .filter(|q| q.correct_answer_key.is_empty())
        .cloned()
        .collect();

    let solve_result = deps.orchestrator.solve_questions(&to_solve).await;
    info!(
        "[任务 {}] 解答完成: 命中 {} / 未中 {} / 失败 {} / 供应商 {:?}",
        job.job_id,
        solve_result.cache_hits,
        solve_result.cache_misses,
        solve_result.failed_questions,
        solve_result.providers_used
    );

    // 暂缓重排：一个答案都没拿到、且确属瞬时限流、且还有重排额度
    let nothing_answered = solve_result.cache_misses > 0
        && solve_result.failed_questions == solve_result.cache_misses;
    if nothing_answered && solve_result.any_rate_limited && job.attempts_made < deps.config.job_attempts
    {
        warn!(
            "[任务 {}] 供应商全部限流，测验转入 WaitingAi 并延迟重排",
            job.job_id
        );
        quiz.status = QuizStatus::WaitingAi;
        quiz.updated_at = chrono::Utc::now();
        deps.quiz_store.save(&quiz).await?;

        let mut rescheduled = job.clone();
        rescheduled.attempts_made += 1;
        deps.queue
            .enqueue_delayed(rescheduled, deps.config.job_backoff_secs)
            .await?;
        return Ok(());
    }

    // 4. 合并答案：视觉标记 > 供应商 > "A" 兜底
    let questions = merge_answers(&parsed.questions, &solve_result.responses);

    // 5. 章节统计：临时映射计数，落库时转为记录列表
    let (sections, section_counts) = count_sections(&questions);

    // 6. 读-改-写持久化，转 Completed
    let mut quiz = deps.quiz_store.load(&job.quiz_id).await?;
    quiz.total_questions = questions.len();
    quiz.processed_questions = questions.len();
    quiz.questions = questions;
    quiz.sections = sections;
    quiz.section_counts = section_counts;
    quiz.status = QuizStatus::Completed;
    quiz.updated_at = chrono::Utc::now();
    deps.quiz_store.save(&quiz).await?;

    info!(
        "[任务 {}] ✅ 测验 {} 处理完成 ({} 题)",
        job.job_id, quiz.id, quiz.total_questions
    );

    // 7. 机会性归档：成功则更新指针并删本地文件，失败只记警告
    archive_document(&mut quiz, &local_path, job.document_type, deps).await;

    Ok(())
}

/// 把源文档移交长期归档
async fn archive_document(
    quiz: &mut crate::models::Quiz,
    local_path: &str,
    kind: DocumentKind,
    deps: &PipelineDeps,
) {
    let path = Path::new(local_path);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    match deps
        .file_storage
        .upload_file(path, &name, mime_for(kind))
        .await
    {
        Ok(stored) => {
            quiz.document_url = stored.url;
            quiz.updated_at = chrono::Utc::now();
            if let Err(e) = deps.quiz_store.save(quiz).await {
                warn!("⚠️ 归档指针保存失败: {}", e);
                return;
            }
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("⚠️ 本地文件删除失败 ({}): {}", local_path, e);
            }
        }
        Err(e) => {
            warn!("⚠️ 文档归档失败，保留本地文件 ({}): {}", local_path, e);
        }
    }
}

/// 合并最终答案
///
/// 每题按优先级取答案键：视觉标记 > 供应商答案 > 字面 "A"。
/// 兜底到 "A" 的题目同样标记为 AiGenerated（数据契约如此），
/// 失败本身记为警告日志
pub fn merge_answers(
    parsed_questions: &[ParsedQuestion],
    responses: &[SolvedAnswer],
) -> Vec<Question> {
    let answers_by_index: HashMap<usize, &SolvedAnswer> =
        responses.iter().map(|a| (a.index, a)).collect();

    let mut questions = Vec::with_capacity(parsed_questions.len());
    for pq in parsed_questions {
        let (correct_answer_key, explanation, source) = if !pq.correct_answer_key.is_empty() {
            (pq.correct_answer_key.clone(), None, AnswerSource::StyleDetected)
        } else if let Some(answer) = answers_by_index.get(&pq.index) {
            (
                answer.correct_key.clone(),
                answer.explanation.clone(),
                AnswerSource::AiGenerated,
            )
        } else {
            warn!("⚠️ 题目 {} 无答案，使用兜底答案 A", pq.index);
            ("A".to_string(), None, AnswerSource::AiGenerated)
        };

        questions.push(Question {
            stem: pq.stem.clone(),
            choices: pq
                .choices
                .iter()
                .map(|c| Choice {
                    key: c.key.clone(),
                    text: c.text.clone(),
                    is_visually_marked: c.is_visually_marked,
                })
                .collect(),
            correct_answer_key,
            explanation,
            source,
            section: pq.section.clone(),
        });
    }
    questions
}

/// 在内存里统计各章节题目数
///
/// 返回 (章节按首次出现顺序, 章节计数记录列表)
fn count_sections(questions: &[Question]) -> (Vec<String>, Vec<SectionCount>) {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for q in questions {
        if !counts.contains_key(&q.section) {
            order.push(q.section.clone());
        }
        *counts.entry(q.section.clone()).or_insert(0) += 1;
    }

    let section_counts = order
        .iter()
        .map(|name| SectionCount {
            name: name.clone(),
            count: counts[name],
        })
        .collect();

    (order, section_counts)
}

/// 剥掉 file:// 前缀
fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// 文档类型对应的 MIME
fn mime_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => "application/pdf",
        DocumentKind::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        DocumentKind::Text => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_file_scheme() {
        assert_eq!(strip_file_scheme("file:///tmp/a.pdf"), "/tmp/a.pdf");
        assert_eq!(strip_file_scheme("/tmp/a.pdf"), "/tmp/a.pdf");
    }

    fn parsed(index: usize, visual_key: &str) -> ParsedQuestion {
        use crate::models::ParsedChoice;
        ParsedQuestion {
            index,
            stem: format!("câu hỏi {}", index),
            choices: vec![
                ParsedChoice {
                    key: "A".to_string(),
                    text: "một".to_string(),
                    is_visually_marked: false,
                },
                ParsedChoice {
                    key: "B".to_string(),
                    text: "hai".to_string(),
                    is_visually_marked: false,
                },
                ParsedChoice {
                    key: "C".to_string(),
                    text: "ba".to_string(),
                    is_visually_marked: !visual_key.is_empty(),
                },
            ],
            correct_answer_key: visual_key.to_string(),
            section: "CLO 1".to_string(),
            source: if visual_key.is_empty() {
                AnswerSource::AiGenerated
            } else {
                AnswerSource::StyleDetected
            },
        }
    }

    fn solved(index: usize, key: &str) -> SolvedAnswer {
        SolvedAnswer {
            index,
            correct_key: key.to_string(),
            explanation: None,
            provider: "Gemini".to_string(),
        }
    }

    #[test]
    fn test_merge_visual_mark_beats_provider() {
        // 视觉标记是 C，即使供应商说 A，最终也是 C
        let questions = merge_answers(&[parsed(1, "C")], &[solved(1, "A")]);
        assert_eq!(questions[0].correct_answer_key, "C");
        assert_eq!(questions[0].source, AnswerSource::StyleDetected);
    }

    #[test]
    fn test_merge_provider_answer_used() {
        let questions = merge_answers(&[parsed(1, "")], &[solved(1, "B")]);
        assert_eq!(questions[0].correct_answer_key, "B");
        assert_eq!(questions[0].source, AnswerSource::AiGenerated);
    }

    #[test]
    fn test_merge_fallback_to_a() {
        // 没有任何答案：兜底 "A"，来源仍标 AiGenerated
        let questions = merge_answers(&[parsed(1, ""), parsed(2, "")], &[solved(1, "B")]);
        assert_eq!(questions[1].correct_answer_key, "A");
        assert_eq!(questions[1].source, AnswerSource::AiGenerated);
    }

    #[test]
    fn test_count_sections_order_and_sum() {
        let q = |section: &str| Question {
            stem: "s".to_string(),
            choices: Vec::new(),
            correct_answer_key: "A".to_string(),
            explanation: None,
            source: AnswerSource::AiGenerated,
            section: section.to_string(),
        };
        let questions = vec![q("CLO 1"), q("CLO 2"), q("CLO 1"), q("CLO 1")];

        let (sections, counts) = count_sections(&questions);
        assert_eq!(sections, vec!["CLO 1", "CLO 2"]);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].name, "CLO 1");
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[1].count, 1);
        // 各章节计数之和等于题目总数
        let total: usize = counts.iter().map(|c| c.count).sum();
        assert_eq!(total, questions.len());
    }
}
