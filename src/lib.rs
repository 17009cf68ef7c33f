//! # Quiz Pipeline
//!
//! 测验文档的题目提取与答案解析流水线
//!
//! ## 模块结构
//!
//! - `cache`: 语义缓存（按规范化内容哈希索引已解答的题目）
//! - `config`: 配置管理
//! - `error`: 错误类型定义
//! - `hash`: 内容哈希（上传去重、缓存键）
//! - `logger`: 日志初始化
//! - `models`: 数据模型
//! - `orchestrator`: 答案编排（缓存优先 + 多供应商降级）
//! - `parser`: 文档解析（PDF / DOCX / 文本 → 结构化题目）
//! - `pipeline`: 核心处理流程（解析 → 解答 → 持久化）
//! - `providers`: AI 供应商适配器
//! - `queue`: 持久化任务队列与工作进程
//! - `storage`: 测验存储与文件归档

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod storage;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ParsedDocument, Question, Quiz, QuizJob, QuizStatus};
pub use orchestrator::AnswerOrchestrator;
pub use pipeline::process_job;
pub use queue::QuizWorker;
