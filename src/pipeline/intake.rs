//! 上传入口
//!
//! 上传处理器（外部）落盘后调用这里：校验大小与魔数、计算内容哈希、
//! 按哈希去重、创建 Pending 测验并入队。去重信息通过独立的
//! UploadOutcome 返回，不往 Quiz 上挂旗子。

use std::path::Path;
use tracing::info;

use crate::error::{AppError, AppResult, ParserError};
use crate::hash;
use crate::models::quiz::{Quiz, UploadOutcome};
use crate::models::QuizJob;
use crate::parser;
use crate::pipeline::PipelineDeps;

/// 注册一次上传
///
/// # 参数
/// - `path`: 已落盘的上传文件
/// - `title`: 测验标题
/// - `owner`: 所有者标识
///
/// # 返回
/// 新测验（已入队）或已存在测验的 ID
pub async fn register_upload(
    path: &Path,
    title: &str,
    owner: &str,
    deps: &PipelineDeps,
) -> AppResult<UploadOutcome> {
    // 1. 大小上限
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::file_unreadable(path.display().to_string(), e))?;
    if metadata.len() > deps.config.max_upload_bytes {
        return Err(AppError::Parser(ParserError::UnsupportedFormat {
            detail: format!(
                "文件 {} 字节，超过上限 {} 字节",
                metadata.len(),
                deps.config.max_upload_bytes
            ),
        }));
    }

    // 2. 魔数校验 + 类型识别
    let kind = parser::detect_kind(path).await.map_err(AppError::Parser)?;

    // 3. 内容哈希去重
    let file_hash = hash::hash_file(path)
        .await
        .map_err(|e| AppError::Other(format!("内容哈希失败: {}", e)))?;

    if let Some(existing) = deps.quiz_store.find_by_hash(&file_hash).await? {
        info!(
            "📎 重复上传: 哈希 {} 已对应测验 {}",
            file_hash, existing.id
        );
        return Ok(UploadOutcome::Duplicate {
            quiz_id: existing.id,
        });
    }

    // 4. 创建 Pending 测验并入队
    let document_url = format!("file://{}", path.display());
    let quiz = Quiz::new(title, document_url.clone(), kind, file_hash, owner);
    deps.quiz_store.save(&quiz).await?;

    let job = QuizJob::new(&quiz.id, document_url, kind);
    deps.queue.enqueue(job).await?;

    info!("📥 新测验 {} 已创建并入队 ({})", quiz.id, kind.as_str());
    Ok(UploadOutcome::New(quiz))
}
