//! 答案编排层
//!
//! ## 职责
//!
//! 本层是解答环节的"指挥中心"：缓存优先，未命中的题目分块后
//! 按优先级在多个 AI 供应商之间降级。
//!
//! ## 流程
//!
//! ```text
//! solve_questions (Vec<ParsedQuestion>)
//!     ↓ 缓存查询（命中 / 未命中分流）
//!     ↓ 未命中按固定大小分块
//!     ↓ 每块按优先级遍历供应商
//!         ├─ 不可用（无密钥）→ 静默跳过
//!         ├─ 限流未恢复 → 跳过
//!         ├─ 有答案 → 接受并从剩余集中移除，异步回写缓存
//!         └─ 零答案 → 限流则立即换下家，否则线性退避后重试
//!     ↓ 汇总：按题目序号排序，统计命中 / 失败 / token
//! ```
//!
//! ## 设计原则
//!
//! 1. 供应商错误永不上抛，全部以降级消化
//! 2. 已被某供应商解答的题目不会再问更高优先级的供应商
//! 3. 缓存回写是尽力而为的，不阻塞也不失败

pub mod solver;

pub use solver::{AnswerOrchestrator, OrchestratorResult, SolveOptions, SolvedAnswer};
