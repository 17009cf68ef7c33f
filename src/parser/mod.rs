//! 文档解析模块
//!
//! ## 职责
//!
//! 把上传的文档（PDF / DOCX / 纯文本）解析为有序的结构化题目列表：
//!
//! 1. **格式识别**：按文件魔数识别真实格式，扩展名兜底
//! 2. **文本提取**：PDF 走 pdftotext，DOCX 走 LibreOffice 转 HTML
//!    （HTML 路径保留视觉标记），纯文本直接读取
//! 3. **题目切分**：多选一锚点切块，粘性章节继承
//! 4. **视觉标记**：DOCX HTML 路径检测加粗 / 高亮 / 下划线 / "✓"
//!
//! ## 输出
//!
//! `ParsedDocument`，题目按文档出现顺序编号（从 1 开始），
//! 序号贯穿后续缓存、解答与持久化全流程

pub mod extract;
pub mod html;
pub mod section;
pub mod splitter;

use std::path::Path;
use tracing::{info, warn};

use crate::error::ParserError;
use crate::models::quiz::DocumentKind;
use crate::models::ParsedDocument;

pub use section::{sanitize_section, SectionTracker, DEFAULT_SECTION};
pub use splitter::split_text;

/// 按魔数识别文档类型，扩展名兜底
///
/// 识别失败（未知魔数且未知扩展名）报不支持的格式
pub async fn detect_kind(path: &Path) -> Result<DocumentKind, ParserError> {
    let mut magic = [0u8; 8];
    let n = {
        use tokio::io::AsyncReadExt;
        let mut file =
            tokio::fs::File::open(path)
                .await
                .map_err(|e| ParserError::FileUnreadable {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })?;
        file.read(&mut magic)
            .await
            .map_err(|e| ParserError::FileUnreadable {
                path: path.display().to_string(),
                source: Box::new(e),
            })?
    };
    let magic = &magic[..n];

    if magic.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    // DOCX / ODT 实际是 ZIP 容器
    if magic.starts_with(b"PK\x03\x04") {
        return Ok(DocumentKind::Docx);
    }
    // 旧版 .doc 的 OLE 容器
    if magic.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Ok(DocumentKind::Docx);
    }
    if magic.starts_with(b"{\\rtf") {
        return Ok(DocumentKind::Text);
    }

    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("pdf") => Ok(DocumentKind::Pdf),
        Some("docx") | Some("doc") => Ok(DocumentKind::Docx),
        Some("txt") | Some("rtf") | Some("odt") => Ok(DocumentKind::Text),
        other => Err(ParserError::UnsupportedFormat {
            detail: format!("未知魔数且扩展名无法识别: {:?}", other),
        }),
    }
}

/// 解析文档为结构化题目列表
///
/// # 参数
/// - `path`: 文档路径
/// - `kind`: 文档类型（由上传入口识别）
///
/// # 返回
/// 提取到 0 个题目视为解析失败（NoQuestions）
pub async fn parse_document(
    path: &Path,
    kind: DocumentKind,
) -> Result<ParsedDocument, ParserError> {
    let questions = match kind {
        DocumentKind::Pdf => {
            let text = extract::pdf_to_text(path).await?;
            split_text(&text)
        }
        DocumentKind::Docx => {
            let html = extract::docx_to_html(path).await?;
            let questions = html::parse_html(&html);
            if questions.is_empty() {
                // HTML 路径颗粒无收：回退到纯文本提取
                warn!("⚠️ HTML 路径未提取到题目，回退纯文本提取: {}", path.display());
                let text = extract::docx_to_text(path).await?;
                split_text(&text)
            } else {
                questions
            }
        }
        DocumentKind::Text => {
            let text = extract::read_text(path).await?;
            split_text(&text)
        }
    };

    if questions.is_empty() {
        return Err(ParserError::NoQuestions);
    }

    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    info!("✓ 解析完成: {} 个题目 ({})", questions.len(), path.display());

    Ok(ParsedDocument { title, questions })
}
