//! 测验工作进程
//!
//! 从持久队列认领任务并驱动流水线。并发度用 Semaphore 限制
//! （默认 1，避免供应商限流雪崩），外加队列级的每分钟任务数限流。
//!
//! 错误分流：
//! - 解析错误是终态：删除本地文件与测验记录（用户可重新上传）
//! - 其他错误交给队列的重试机制；供应商耗尽不会删测验

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cache::FileAnswerCache;
use crate::config::Config;
use crate::error::AppError;
use crate::models::QuizJob;
use crate::pipeline::{self, PipelineDeps};
use crate::providers::{
    GeminiProvider, GithubModelsProvider, GroqProvider, HuggingFaceProvider, Provider,
};
use crate::queue::FileJobQueue;
use crate::storage::{FileQuizStore, LocalArchiveStorage};

/// 队列空转时的轮询间隔
const IDLE_POLL_MS: u64 = 1000;
/// 限流窗口
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// 测验工作进程
pub struct QuizWorker {
    deps: Arc<PipelineDeps>,
    concurrency: usize,
    jobs_per_minute: u32,
    recent_starts: Mutex<VecDeque<Instant>>,
}

impl QuizWorker {
    /// 用默认装配初始化（文件存储 + 文件队列 + 四个供应商）
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        let quiz_store = Arc::new(FileQuizStore::new(config.quiz_dir()));
        let file_storage = Arc::new(LocalArchiveStorage::new(&config.archive_dir));
        let queue = Arc::new(FileJobQueue::open(config.queue_file()).await);
        let cache = Arc::new(FileAnswerCache::open(config.cache_file()).await);

        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(GeminiProvider::new(&config)),
            Arc::new(GithubModelsProvider::new(&config)),
            Arc::new(GroqProvider::new(&config)),
            Arc::new(HuggingFaceProvider::new(&config)),
        ];
        log_provider_availability(&providers);

        let concurrency = config.worker_concurrency.max(1);
        let jobs_per_minute = config.jobs_per_minute;
        let deps = PipelineDeps::new(
            config,
            quiz_store,
            file_storage,
            queue,
            cache,
            providers,
        );

        Ok(Self {
            deps: Arc::new(deps),
            concurrency,
            jobs_per_minute,
            recent_starts: Mutex::new(VecDeque::new()),
        })
    }

    /// 用现成的协作者构建（测试注入用）
    pub fn with_deps(deps: Arc<PipelineDeps>) -> Self {
        let concurrency = deps.config.worker_concurrency.max(1);
        let jobs_per_minute = deps.config.jobs_per_minute;
        Self {
            deps,
            concurrency,
            jobs_per_minute,
            recent_starts: Mutex::new(VecDeque::new()),
        }
    }

    /// 主循环：认领 → 并发处理，直到进程被终止
    pub async fn run(&self) -> anyhow::Result<()> {
        log_startup(self.concurrency, self.jobs_per_minute);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        loop {
            match self.deps.queue.claim_ready().await {
                Some(job) => {
                    self.throttle().await;
                    let permit = semaphore.clone().acquire_owned().await?;
                    let deps = Arc::clone(&self.deps);
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_job(job, &deps).await;
                    });
                }
                None => sleep(Duration::from_millis(IDLE_POLL_MS)).await,
            }
        }
    }

    /// 处理一个到期任务；队列为空时返回 false（测试与巡检用）
    pub async fn run_once(&self) -> bool {
        match self.deps.queue.claim_ready().await {
            Some(job) => {
                handle_job(job, &self.deps).await;
                true
            }
            None => false,
        }
    }

    /// 队列级限流：滑动窗口内的任务数不超过 jobs_per_minute
    async fn throttle(&self) {
        if self.jobs_per_minute == 0 {
            return;
        }
        loop {
            let now = Instant::now();
            let mut starts = self.recent_starts.lock().await;
            while let Some(front) = starts.front() {
                if now.duration_since(*front) >= RATE_WINDOW {
                    starts.pop_front();
                } else {
                    break;
                }
            }
            if (starts.len() as u32) < self.jobs_per_minute {
                starts.push_back(now);
                return;
            }
            let wait = RATE_WINDOW - now.duration_since(*starts.front().unwrap());
            drop(starts);
            sleep(wait).await;
        }
    }
}

/// 处理一个已认领的任务
async fn handle_job(job: QuizJob, deps: &PipelineDeps) {
    match pipeline::process_job(&job, deps).await {
        Ok(()) => {
            deps.queue.complete(&job.job_id).await;
        }
        Err(AppError::Parser(e)) => {
            // 终态：解析器救不回来，清理后让用户重新上传
            error!("[任务 {}] ❌ 解析失败: {}", job.job_id, e);
            cleanup_failed_quiz(&job, deps).await;
            deps.queue.complete(&job.job_id).await;
        }
        Err(e) => {
            error!("[任务 {}] ❌ 处理过程中发生错误: {}", job.job_id, e);
            deps.queue
                .fail(
                    &job.job_id,
                    deps.config.job_backoff_secs,
                    deps.config.job_attempts,
                )
                .await;
        }
    }
}

/// 解析失败的终态清理：删除本地文件与测验记录
async fn cleanup_failed_quiz(job: &QuizJob, deps: &PipelineDeps) {
    // 先把状态落成 Failed，随后删除记录；删除失败时至少留下 Failed 状态
    if let Ok(mut quiz) = deps.quiz_store.load(&job.quiz_id).await {
        quiz.status = crate::models::QuizStatus::Failed;
        quiz.updated_at = chrono::Utc::now();
        let _ = deps.quiz_store.save(&quiz).await;
    }

    let local_path = job
        .document_url
        .strip_prefix("file://")
        .unwrap_or(&job.document_url);
    if let Err(e) = tokio::fs::remove_file(local_path).await {
        warn!("⚠️ 本地文件删除失败 ({}): {}", local_path, e);
    }

    if let Err(e) = deps.quiz_store.delete(&job.quiz_id).await {
        warn!("⚠️ 测验记录删除失败 ({}): {}", job.quiz_id, e);
    } else {
        info!("🗑️ 测验 {} 已清理，用户可重新上传", job.quiz_id);
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(concurrency: usize, jobs_per_minute: u32) {
    info!("{}", "=".repeat(60));
    info!("🚀 测验工作进程启动");
    info!("📊 并发数: {} | 限流: {} 任务/分钟", concurrency, jobs_per_minute);
    info!("{}", "=".repeat(60));
}

fn log_provider_availability(providers: &[Arc<dyn Provider>]) {
    for p in providers {
        if p.is_available() {
            info!("✓ 供应商可用: {} (优先级 {})", p.name(), p.priority());
        } else {
            warn!("⚠️ 供应商未配置密钥: {}", p.name());
        }
    }
}
