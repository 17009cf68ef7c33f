//! 各格式的文本 / HTML 提取
//!
//! PDF 走 poppler 的 pdftotext，DOCX 同类格式走 LibreOffice 无头转换，
//! 纯文本直接读取。外部工具在临时目录中产出，用完即清理。

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::ParserError;

/// 读取纯文本文件，统一行尾为 LF
pub async fn read_text(path: &Path) -> Result<String, ParserError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParserError::FileUnreadable {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(normalize_line_endings(&text))
}

/// 提取 PDF 的扁平文本流
///
/// pdftotext 按页输出，页间以换页符分隔；这里把换页符归一为换行，
/// 得到"页内条目以空格相连、页与页以换行相连"的单一文本流
pub async fn pdf_to_text(path: &Path) -> Result<String, ParserError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|e| ParserError::ConverterFailed {
            tool: "pdftotext".to_string(),
            detail: format!("无法启动: {}", e),
        })?;

    if !output.status.success() {
        return Err(ParserError::ConverterFailed {
            tool: "pdftotext".to_string(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok(normalize_line_endings(&text).replace('\u{000C}', "\n"))
}

/// DOCX 同类格式转 HTML（保留颜色 / 下划线 / 加粗等内联标记）
pub async fn docx_to_html(path: &Path) -> Result<String, ParserError> {
    convert_with_libreoffice(path, "html").await
}

/// DOCX 同类格式转纯文本（HTML 路径提不出题目时的回退）
pub async fn docx_to_text(path: &Path) -> Result<String, ParserError> {
    let text = convert_with_libreoffice(path, "txt").await?;
    Ok(normalize_line_endings(&text))
}

/// 通过无头 LibreOffice 转换到指定格式，读出产物后清理临时目录
async fn convert_with_libreoffice(path: &Path, target: &str) -> Result<String, ParserError> {
    let temp_dir =
        std::env::temp_dir().join(format!("quiz_convert_{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| ParserError::ConverterFailed {
            tool: "libreoffice".to_string(),
            detail: format!("无法创建临时目录: {}", e),
        })?;

    let result = run_libreoffice(path, target, &temp_dir).await;

    let _ = tokio::fs::remove_dir_all(&temp_dir).await;

    result
}

async fn run_libreoffice(
    path: &Path,
    target: &str,
    temp_dir: &Path,
) -> Result<String, ParserError> {
    let output = Command::new("libreoffice")
        .arg("--headless")
        .arg("--norestore")
        .arg("--convert-to")
        .arg(target)
        .arg("--outdir")
        .arg(temp_dir)
        .arg(path)
        .output()
        .await
        .map_err(|e| ParserError::ConverterFailed {
            tool: "libreoffice".to_string(),
            detail: format!("无法启动: {}", e),
        })?;

    if !output.status.success() {
        return Err(ParserError::ConverterFailed {
            tool: "libreoffice".to_string(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let produced = find_converted_file(temp_dir, target).await?;
    let bytes = tokio::fs::read(&produced)
        .await
        .map_err(|e| ParserError::FileUnreadable {
            path: produced.display().to_string(),
            source: Box::new(e),
        })?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 在临时目录中找到转换产物
async fn find_converted_file(dir: &Path, extension: &str) -> Result<PathBuf, ParserError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ParserError::ConverterFailed {
            tool: "libreoffice".to_string(),
            detail: format!("无法读取临时目录: {}", e),
        })?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let p = entry.path();
        if p.extension().and_then(|s| s.to_str()) == Some(extension) {
            return Ok(p);
        }
    }

    Err(ParserError::ConverterFailed {
        tool: "libreoffice".to_string(),
        detail: "未产出任何转换文件".to_string(),
    })
}

/// 统一行尾：CRLF / CR → LF
fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_read_text_normalizes() {
        let dir = std::env::temp_dir().join(format!("quiz_extract_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("sample.txt");
        tokio::fs::write(&path, "dòng một\r\ndòng hai").await.unwrap();

        let text = read_text(&path).await.unwrap();
        assert_eq!(text, "dòng một\ndòng hai");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_text_missing_file() {
        let path = std::env::temp_dir().join("quiz_extract_không_tồn_tại.txt");
        let err = read_text(&path).await.unwrap_err();
        assert!(matches!(err, ParserError::FileUnreadable { .. }));
    }
}
