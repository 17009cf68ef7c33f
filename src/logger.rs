//! 日志初始化
//!
//! 基于 tracing-subscriber，级别由 RUST_LOG 控制，默认 info

use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅者
///
/// 在 main 中调用一次；重复调用会 panic，测试请使用 init_test_log
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// 测试用日志初始化（可重复调用）
pub fn init_test_log() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .try_init();
}
