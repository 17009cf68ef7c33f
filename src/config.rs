use serde::{Deserialize, Serialize};

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 数据目录 ---
    /// 数据根目录
    pub data_dir: String,
    /// 上传文件暂存目录
    pub upload_dir: String,
    /// 长期归档目录
    pub archive_dir: String,

    // --- 供应商密钥 ---
    /// Gemini API 密钥列表（轮换使用）
    pub gemini_api_keys: Vec<String>,
    /// GitHub Models 令牌
    pub github_token: String,
    /// GitHub Models 模型名
    pub github_model: String,
    /// Groq API 密钥
    pub groq_api_key: String,
    /// Groq 模型名
    pub groq_model: String,
    /// Hugging Face 访问令牌
    pub hf_access_token: String,
    /// Hugging Face 模型名
    pub hf_model: String,

    // --- 解答编排 ---
    /// 每块题目数上限
    pub chunk_size: usize,
    /// 单个供应商内的最大重试次数
    pub max_retries: usize,
    /// 供应商单次请求超时（秒）
    pub provider_timeout_secs: u64,
    /// 提示词长度上限（字符）
    pub prompt_max_len: usize,

    // --- 任务队列与工作进程 ---
    /// 工作进程并发数
    pub worker_concurrency: usize,
    /// 队列级限流（每分钟任务数）
    pub jobs_per_minute: u32,
    /// 任务最大尝试次数
    pub job_attempts: u32,
    /// 任务重试间隔（秒）
    pub job_backoff_secs: u64,

    // --- 上传限制 ---
    /// 上传文件大小上限（字节）
    pub max_upload_bytes: u64,

    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            upload_dir: "data/uploads".to_string(),
            archive_dir: "data/archive".to_string(),
            gemini_api_keys: Vec::new(),
            github_token: String::new(),
            github_model: "gpt-4o-mini".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.3-70b-versatile".to_string(),
            hf_access_token: String::new(),
            hf_model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            chunk_size: 30,
            max_retries: 2,
            provider_timeout_secs: 60,
            prompt_max_len: 50_000,
            worker_concurrency: 1,
            jobs_per_minute: 5,
            job_attempts: 3,
            job_backoff_secs: 300,
            max_upload_bytes: 50 * 1024 * 1024,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            data_dir: std::env::var("QUIZ_DATA_DIR").unwrap_or(default.data_dir),
            upload_dir: std::env::var("QUIZ_UPLOAD_DIR").unwrap_or(default.upload_dir),
            archive_dir: std::env::var("QUIZ_ARCHIVE_DIR").unwrap_or(default.archive_dir),
            gemini_api_keys: read_gemini_keys(),
            github_token: std::env::var("GITHUB_TOKEN").unwrap_or(default.github_token),
            github_model: std::env::var("GITHUB_MODEL").unwrap_or(default.github_model),
            groq_api_key: std::env::var("GROQ_API_KEY").unwrap_or(default.groq_api_key),
            groq_model: std::env::var("GROQ_MODEL").unwrap_or(default.groq_model),
            hf_access_token: std::env::var("HF_ACCESS_TOKEN").unwrap_or(default.hf_access_token),
            hf_model: std::env::var("HF_MODEL").unwrap_or(default.hf_model),
            chunk_size: read_parsed("QUIZ_CHUNK_SIZE", default.chunk_size),
            max_retries: read_parsed("QUIZ_MAX_RETRIES", default.max_retries),
            provider_timeout_secs: read_parsed(
                "PROVIDER_TIMEOUT_SECS",
                default.provider_timeout_secs,
            ),
            prompt_max_len: read_parsed("PROMPT_MAX_LEN", default.prompt_max_len),
            // 兼容旧部署：先读新变量名，再读旧变量名
            worker_concurrency: std::env::var("QUIZ_WORKER_CONCURRENCY")
                .or_else(|_| std::env::var("BULLMQ_QUIZ_CONCURRENCY"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.worker_concurrency),
            jobs_per_minute: read_parsed("QUIZ_JOBS_PER_MINUTE", default.jobs_per_minute),
            job_attempts: read_parsed("QUIZ_JOB_ATTEMPTS", default.job_attempts),
            job_backoff_secs: read_parsed("QUIZ_JOB_BACKOFF_SECS", default.job_backoff_secs),
            max_upload_bytes: read_parsed("QUIZ_MAX_UPLOAD_BYTES", default.max_upload_bytes),
            verbose_logging: read_parsed("VERBOSE_LOGGING", default.verbose_logging),
        }
    }

    /// 从 TOML 配置文件加载，缺失字段回退到默认值
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 测验记录存储目录
    pub fn quiz_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("quizzes")
    }

    /// 答案缓存文件路径
    pub fn cache_file(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("answer_cache.json")
    }

    /// 任务队列日志文件路径
    pub fn queue_file(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("job_queue.json")
    }
}

/// 读取 Gemini 密钥：优先 GEMINI_API_KEYS（逗号分隔），其次 GEMINI_API_KEY
fn read_gemini_keys() -> Vec<String> {
    let raw = std::env::var("GEMINI_API_KEYS")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .unwrap_or_default();
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn read_parsed<T: std::str::FromStr>(var_name: &str, default: T) -> T {
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
