use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 文档解析错误
    Parser(ParserError),
    /// AI 供应商错误
    Provider(ProviderError),
    /// 语义缓存错误
    Cache(CacheError),
    /// 持久化存储错误
    Storage(StorageError),
    /// 任务队列错误
    Queue(QueueError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Parser(e) => write!(f, "解析错误: {}", e),
            AppError::Provider(e) => write!(f, "供应商错误: {}", e),
            AppError::Cache(e) => write!(f, "缓存错误: {}", e),
            AppError::Storage(e) => write!(f, "存储错误: {}", e),
            AppError::Queue(e) => write!(f, "队列错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Parser(e) => Some(e),
            AppError::Provider(e) => Some(e),
            AppError::Cache(e) => Some(e),
            AppError::Storage(e) => Some(e),
            AppError::Queue(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 文档解析错误
///
/// 流水线中唯一的致命错误：触发测验清理
#[derive(Debug)]
pub enum ParserError {
    /// 文件不可读
    FileUnreadable {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 不支持的文档格式
    UnsupportedFormat {
        detail: String,
    },
    /// 外部转换工具执行失败
    ConverterFailed {
        tool: String,
        detail: String,
    },
    /// 文档中未提取到任何题目
    NoQuestions,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::FileUnreadable { path, source } => {
                write!(f, "无法读取文件 ({}): {}", path, source)
            }
            ParserError::UnsupportedFormat { detail } => {
                write!(f, "不支持的文档格式: {}", detail)
            }
            ParserError::ConverterFailed { tool, detail } => {
                write!(f, "转换工具 {} 执行失败: {}", tool, detail)
            }
            ParserError::NoQuestions => write!(f, "文档中未提取到任何题目"),
        }
    }
}

impl std::error::Error for ParserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParserError::FileUnreadable { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// AI 供应商错误
#[derive(Debug)]
pub enum ProviderError {
    /// 瞬时失败（5xx、超时、网络错误），适配器内部可重试
    Transient {
        provider: String,
        detail: String,
    },
    /// 请求频率限制（HTTP 429 或配额信号）
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },
    /// 未配置 API 密钥，适配器不可用
    Unavailable {
        provider: String,
    },
    /// 响应无法解析且修复失败
    InvalidResponse {
        provider: String,
        detail: String,
    },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transient { provider, detail } => {
                write!(f, "供应商 {} 瞬时失败: {}", provider, detail)
            }
            ProviderError::RateLimited {
                provider,
                retry_after_secs,
            } => {
                write!(
                    f,
                    "供应商 {} 频率限制, 建议等待 {} 秒",
                    provider, retry_after_secs
                )
            }
            ProviderError::Unavailable { provider } => {
                write!(f, "供应商 {} 未配置密钥", provider)
            }
            ProviderError::InvalidResponse { provider, detail } => {
                write!(f, "供应商 {} 响应无法解析: {}", provider, detail)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// 语义缓存错误
///
/// 缓存是尽力而为的：读失败降级为未命中，写失败记日志，永不使任务失败
#[derive(Debug)]
pub enum CacheError {
    /// 读取失败
    ReadFailed {
        detail: String,
    },
    /// 写入失败
    WriteFailed {
        detail: String,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ReadFailed { detail } => write!(f, "缓存读取失败: {}", detail),
            CacheError::WriteFailed { detail } => write!(f, "缓存写入失败: {}", detail),
        }
    }
}

impl std::error::Error for CacheError {}

/// 持久化存储错误
#[derive(Debug)]
pub enum StorageError {
    /// 记录不存在
    NotFound {
        id: String,
    },
    /// 读取失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 删除失败
    DeleteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { id } => write!(f, "记录不存在: {}", id),
            StorageError::ReadFailed { path, source } => {
                write!(f, "读取失败 ({}): {}", path, source)
            }
            StorageError::WriteFailed { path, source } => {
                write!(f, "写入失败 ({}): {}", path, source)
            }
            StorageError::DeleteFailed { path, source } => {
                write!(f, "删除失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::ReadFailed { source, .. }
            | StorageError::WriteFailed { source, .. }
            | StorageError::DeleteFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 任务队列错误
#[derive(Debug)]
pub enum QueueError {
    /// 入队失败
    EnqueueFailed {
        detail: String,
    },
    /// 队列日志损坏
    JournalCorrupted {
        path: String,
        detail: String,
    },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::EnqueueFailed { detail } => write!(f, "入队失败: {}", detail),
            QueueError::JournalCorrupted { path, detail } => {
                write!(f, "队列日志损坏 ({}): {}", path, detail)
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        detail: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::FileParseFailed { path, detail } => {
                write!(f, "配置文件解析失败 ({}): {}", path, detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件不可读的解析错误
    pub fn file_unreadable(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Parser(ParserError::FileUnreadable {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建存储写入失败错误
    pub fn storage_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 对应的 HTTP 状态码（供外层传输适配使用）
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Parser(ParserError::UnsupportedFormat { .. }) => 400,
            AppError::Parser(_) => 422,
            AppError::Provider(ProviderError::RateLimited { .. }) => 429,
            AppError::Provider(_) => 502,
            AppError::Storage(StorageError::NotFound { .. }) => 404,
            AppError::Storage(_) => 500,
            AppError::Cache(_) | AppError::Queue(_) => 500,
            AppError::Config(_) => 500,
            AppError::Other(_) => 500,
        }
    }

    /// 序列化为外层响应可用的 JSON 投影
    pub fn serialize(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status_code(),
            "message": self.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let err = AppError::Parser(ParserError::NoQuestions);
        assert_eq!(err.status_code(), 422);

        let err = AppError::Provider(ProviderError::RateLimited {
            provider: "Gemini".to_string(),
            retry_after_secs: 60,
        });
        assert_eq!(err.status_code(), 429);

        let err = AppError::Storage(StorageError::NotFound {
            id: "abc".to_string(),
        });
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_serialize_projection() {
        let err = AppError::Parser(ParserError::NoQuestions);
        let json = err.serialize();
        assert_eq!(json["status"], 422);
        assert!(json["message"].as_str().unwrap().contains("题目"));
    }
}
