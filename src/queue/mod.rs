//! 持久化任务队列
//!
//! ## 职责
//!
//! 先进先出地向工作进程投递测验处理任务：
//!
//! - **持久化**：队列状态落盘为 JSON 日志，进程重启后继续
//! - **重试**：失败任务按固定退避重排，超过次数进入失败分区留查
//! - **重投递**：进程中途退出时，进行中的任务重启后回到待处理队列
//!
//! 队列代理（broker）在源系统里是外部依赖；这里把持久 FIFO 语义
//! 收在 `JobQueue` 接口后面，换代理时只需换实现

pub mod worker;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::QuizJob;

pub use worker::QuizWorker;

/// 任务队列接口
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队（立即可执行）
    async fn enqueue(&self, job: QuizJob) -> AppResult<()>;

    /// 延迟入队（暂缓重排使用）
    async fn enqueue_delayed(&self, job: QuizJob, delay_secs: u64) -> AppResult<()>;

    /// 认领一个到期任务（FIFO；标记为进行中）
    async fn claim_ready(&self) -> Option<QuizJob>;

    /// 任务成功：移除记录
    async fn complete(&self, job_id: &str);

    /// 任务失败：按退避重排；尝试次数耗尽则移入失败分区
    async fn fail(&self, job_id: &str, backoff_secs: u64, max_attempts: u32);

    /// 失败分区（仅供巡检）
    async fn failed_jobs(&self) -> Vec<QuizJob>;
}

/// 队列持久化状态
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    pending: Vec<QuizJob>,
    active: HashMap<String, QuizJob>,
    failed: Vec<QuizJob>,
}

/// 文件日志实现
pub struct FileJobQueue {
    path: PathBuf,
    state: Mutex<QueueState>,
}

impl FileJobQueue {
    /// 打开队列日志；进行中的任务视为进程退出的遗留，回到待处理
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut state = QueueState::default();

        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            match serde_json::from_str::<QueueState>(&content) {
                Ok(loaded) => {
                    state = loaded;
                    // 重投递：上一个进程没做完的任务
                    let orphans: Vec<QuizJob> = state.active.drain().map(|(_, j)| j).collect();
                    if !orphans.is_empty() {
                        warn!("⚠️ 重投递 {} 个未完成任务", orphans.len());
                        state.pending.extend(orphans);
                    }
                }
                Err(e) => {
                    warn!("⚠️ 队列日志损坏，从空队列开始 ({}): {}", path.display(), e);
                }
            }
        }

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// 待处理任务数（测试用）
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    async fn persist(&self, state: &QueueState) {
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                warn!("⚠️ 队列状态序列化失败: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(&self.path, json).await {
            warn!("⚠️ 队列日志写入失败 ({}): {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl JobQueue for FileJobQueue {
    async fn enqueue(&self, job: QuizJob) -> AppResult<()> {
        let mut state = self.state.lock().await;
        debug!("📥 任务入队: {} (测验 {})", job.job_id, job.quiz_id);
        state.pending.push(job);
        self.persist(&state).await;
        Ok(())
    }

    async fn enqueue_delayed(&self, mut job: QuizJob, delay_secs: u64) -> AppResult<()> {
        job.next_attempt_at = Utc::now() + ChronoDuration::seconds(delay_secs as i64);
        let mut state = self.state.lock().await;
        debug!("📥 任务延迟入队: {} ({} 秒后)", job.job_id, delay_secs);
        state.pending.push(job);
        self.persist(&state).await;
        Ok(())
    }

    async fn claim_ready(&self) -> Option<QuizJob> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let position = state.pending.iter().position(|j| j.next_attempt_at <= now)?;
        let job = state.pending.remove(position);
        state.active.insert(job.job_id.clone(), job.clone());
        self.persist(&state).await;
        Some(job)
    }

    async fn complete(&self, job_id: &str) {
        let mut state = self.state.lock().await;
        state.active.remove(job_id);
        self.persist(&state).await;
    }

    async fn fail(&self, job_id: &str, backoff_secs: u64, max_attempts: u32) {
        let mut state = self.state.lock().await;
        let Some(mut job) = state.active.remove(job_id) else {
            return;
        };

        job.attempts_made += 1;
        if job.attempts_made >= max_attempts {
            warn!(
                "❌ 任务 {} 已尝试 {} 次，移入失败分区",
                job.job_id, job.attempts_made
            );
            state.failed.push(job);
        } else {
            job.next_attempt_at = Utc::now() + ChronoDuration::seconds(backoff_secs as i64);
            warn!(
                "⚠️ 任务 {} 第 {} 次失败，{} 秒后重试",
                job.job_id, job.attempts_made, backoff_secs
            );
            state.pending.push(job);
        }
        self.persist(&state).await;
    }

    async fn failed_jobs(&self) -> Vec<QuizJob> {
        self.state.lock().await.failed.clone()
    }
}
