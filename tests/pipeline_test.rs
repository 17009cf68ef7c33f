//! 端到端流水线测试：上传 → 入队 → 工作进程 → 持久化

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use quiz_pipeline::cache::{question_cache_keys, AnswerCacheStore, FileAnswerCache};
use quiz_pipeline::config::Config;
use quiz_pipeline::models::quiz::{AnswerSource, QuizStatus, UploadOutcome};
use quiz_pipeline::models::CachedAnswer;
use quiz_pipeline::pipeline::{register_upload, PipelineDeps};
use quiz_pipeline::providers::Provider;
use quiz_pipeline::queue::{FileJobQueue, JobQueue, QuizWorker};
use quiz_pipeline::storage::{FileQuizStore, LocalArchiveStorage, QuizStore};

use common::{question, ScriptStep, ScriptedProvider};

/// 一套落在临时目录里的完整装配
struct Harness {
    base: PathBuf,
    deps: Arc<PipelineDeps>,
    quiz_store: Arc<FileQuizStore>,
    queue: Arc<FileJobQueue>,
    cache: Arc<FileAnswerCache>,
}

impl Harness {
    async fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let base = std::env::temp_dir().join(format!("quiz_e2e_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&base).await.unwrap();

        let config = Config {
            data_dir: base.join("data").display().to_string(),
            upload_dir: base.join("uploads").display().to_string(),
            archive_dir: base.join("archive").display().to_string(),
            // 一次尝试即降级，测试里不等退避
            max_retries: 1,
            ..Config::default()
        };

        let quiz_store = Arc::new(FileQuizStore::new(config.quiz_dir()));
        let queue = Arc::new(FileJobQueue::open(config.queue_file()).await);
        let cache = Arc::new(FileAnswerCache::open(config.cache_file()).await);
        let file_storage = Arc::new(LocalArchiveStorage::new(&config.archive_dir));

        let deps = Arc::new(PipelineDeps::new(
            config,
            quiz_store.clone(),
            file_storage,
            queue.clone(),
            cache.clone(),
            providers,
        ));

        Self {
            base,
            deps,
            quiz_store,
            queue,
            cache,
        }
    }

    /// 把内容写成上传文件
    async fn write_upload(&self, name: &str, content: &str) -> PathBuf {
        let dir = self.base.join("uploads");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }
}

/// 场景：缓存预热后整条流水线不碰供应商
#[tokio::test]
async fn test_pure_cache_end_to_end() {
    quiz_pipeline::logger::init_test_log();

    let primary = Arc::new(ScriptedProvider::new("Primary", 1, Vec::new()));
    let harness = Harness::new(vec![primary.clone() as Arc<dyn Provider>]).await;

    // 预热：与文档解析结果相同的题目
    let q = question(
        1,
        "What is 2+2?",
        &[("A", "3"), ("B", "4"), ("C", "5"), ("D", "6")],
    );
    let (h1, h2) = question_cache_keys(&q);
    harness
        .cache
        .write_batch(vec![CachedAnswer {
            stem_hash: h1,
            choices_hash: h2,
            correct_key: "B".to_string(),
            explanation: None,
            confidence: None,
            provider: "Gemini".to_string(),
            hit_count: 0,
            last_hit_at: Utc::now(),
        }])
        .await;

    let path = harness
        .write_upload(
            "đề.txt",
            "Câu 1: What is 2+2?\n A. 3\n B. 4\n C. 5\n D. 6",
        )
        .await;

    let outcome = register_upload(&path, "Đề thi thử", "user-1", &harness.deps)
        .await
        .unwrap();
    let quiz_id = match outcome {
        UploadOutcome::New(quiz) => {
            assert_eq!(quiz.status, QuizStatus::Pending);
            quiz.id
        }
        UploadOutcome::Duplicate { .. } => panic!("不应判定为重复"),
    };

    let worker = QuizWorker::with_deps(harness.deps.clone());
    assert!(worker.run_once().await);

    let quiz = harness.quiz_store.load(&quiz_id).await.unwrap();
    assert_eq!(quiz.status, QuizStatus::Completed);
    assert_eq!(quiz.total_questions, 1);
    assert_eq!(quiz.processed_questions, 1);
    assert_eq!(quiz.questions[0].correct_answer_key, "B");
    assert_eq!(quiz.questions[0].source, AnswerSource::AiGenerated);
    assert_eq!(quiz.sections, vec!["Nội dung chung"]);
    assert_eq!(quiz.section_counts[0].count, 1);
    // 纯缓存：零供应商调用
    assert_eq!(primary.call_count(), 0);

    // 归档已完成：指针指向归档目录，上传原件已删除
    assert!(quiz.document_url.contains("archive"));
    assert!(!path.exists());
}

/// 场景：供应商只答出一半，其余题目兜底 "A" 并正常完成
#[tokio::test]
async fn test_fallback_answer_completes_quiz() {
    quiz_pipeline::logger::init_test_log();

    let primary = Arc::new(ScriptedProvider::new(
        "Primary",
        1,
        vec![ScriptStep::Answers(vec![(1, "B")])],
    ));
    let harness = Harness::new(vec![primary as Arc<dyn Provider>]).await;

    let path = harness
        .write_upload(
            "đề.txt",
            "Câu 1: câu hỏi thứ nhất?\n A. x\n B. y\n\
             Câu 2: câu hỏi thứ hai?\n A. x\n B. y",
        )
        .await;

    let outcome = register_upload(&path, "Đề 2", "user-1", &harness.deps)
        .await
        .unwrap();
    let UploadOutcome::New(created) = outcome else {
        panic!("不应判定为重复");
    };

    let worker = QuizWorker::with_deps(harness.deps.clone());
    assert!(worker.run_once().await);

    let quiz = harness.quiz_store.load(&created.id).await.unwrap();
    assert_eq!(quiz.status, QuizStatus::Completed);
    assert_eq!(quiz.processed_questions, quiz.total_questions);
    assert_eq!(quiz.questions[0].correct_answer_key, "B");
    // 没人答出来的题兜底 "A"，来源仍是 AiGenerated
    assert_eq!(quiz.questions[1].correct_answer_key, "A");
    assert_eq!(quiz.questions[1].source, AnswerSource::AiGenerated);
}

/// 场景：同一份内容重复上传，返回已有测验的 ID
#[tokio::test]
async fn test_duplicate_upload_detected() {
    quiz_pipeline::logger::init_test_log();

    let harness = Harness::new(vec![Arc::new(ScriptedProvider::new(
        "Primary",
        1,
        Vec::new(),
    )) as Arc<dyn Provider>])
    .await;

    let content = "Câu 1: nội dung trùng lặp?\n A. x\n B. y";
    let first = harness.write_upload("lần_1.txt", content).await;
    let second = harness.write_upload("lần_2.txt", content).await;

    let outcome = register_upload(&first, "Đề", "user-1", &harness.deps)
        .await
        .unwrap();
    let UploadOutcome::New(created) = outcome else {
        panic!("第一次上传应创建新测验");
    };

    let outcome = register_upload(&second, "Đề", "user-1", &harness.deps)
        .await
        .unwrap();
    match outcome {
        UploadOutcome::Duplicate { quiz_id } => assert_eq!(quiz_id, created.id),
        UploadOutcome::New(_) => panic!("第二次上传应判定为重复"),
    }

    // 只入队了一个任务
    assert_eq!(harness.queue.pending_len().await, 1);
}

/// 场景：解析不出题目的文档触发终态清理
#[tokio::test]
async fn test_parser_failure_cleans_up() {
    quiz_pipeline::logger::init_test_log();

    let harness = Harness::new(vec![Arc::new(ScriptedProvider::new(
        "Primary",
        1,
        Vec::new(),
    )) as Arc<dyn Provider>])
    .await;

    let path = harness
        .write_upload("trống.txt", "tài liệu này không chứa câu hỏi nào")
        .await;

    let outcome = register_upload(&path, "Đề hỏng", "user-1", &harness.deps)
        .await
        .unwrap();
    let UploadOutcome::New(created) = outcome else {
        panic!("上传本身应成功");
    };

    let worker = QuizWorker::with_deps(harness.deps.clone());
    assert!(worker.run_once().await);

    // 记录与本地文件都被清理，用户可重新上传
    assert!(harness.quiz_store.load(&created.id).await.is_err());
    assert!(!path.exists());
    // 解析失败是终态：不走队列重试
    assert!(harness.queue.claim_ready().await.is_none());
    assert!(harness.queue.failed_jobs().await.is_empty());
}

/// 场景：供应商全线限流时暂缓重排（WaitingAi）而不是删测验
#[tokio::test]
async fn test_graceful_postponement_on_rate_limit() {
    quiz_pipeline::logger::init_test_log();

    let primary = Arc::new(ScriptedProvider::new(
        "Primary",
        1,
        vec![ScriptStep::RateLimited {
            retry_after_secs: 60,
        }],
    ));
    let harness = Harness::new(vec![primary as Arc<dyn Provider>]).await;

    let path = harness
        .write_upload("đề.txt", "Câu 1: câu hỏi chưa ai trả lời?\n A. x\n B. y")
        .await;

    let outcome = register_upload(&path, "Đề", "user-1", &harness.deps)
        .await
        .unwrap();
    let UploadOutcome::New(created) = outcome else {
        panic!("不应判定为重复");
    };

    let worker = QuizWorker::with_deps(harness.deps.clone());
    assert!(worker.run_once().await);

    // 测验保留，状态 WaitingAi
    let quiz = harness.quiz_store.load(&created.id).await.unwrap();
    assert_eq!(quiz.status, QuizStatus::WaitingAi);

    // 延迟任务已重排：在队列里但还没到期
    assert_eq!(harness.queue.pending_len().await, 1);
    assert!(harness.queue.claim_ready().await.is_none());
}
