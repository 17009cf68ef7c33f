use anyhow::Result;
use quiz_pipeline::{Config, QuizWorker};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    quiz_pipeline::logger::init();

    // 加载配置：有 config.toml 用文件，否则用环境变量
    let config_path = std::path::Path::new("config.toml");
    let config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        Config::from_env()
    };

    // 初始化并运行工作进程
    QuizWorker::initialize(config).await?.run().await
}
