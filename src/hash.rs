//! 内容哈希
//!
//! 流式计算文件 MD5（内存有界），以及字符串的一次性 MD5。
//! 用于上传去重和缓存键，不承担密码学职责。

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// 流式读取的块大小
const CHUNK_SIZE: usize = 64 * 1024;

/// 计算文件内容的 MD5（hex 小写）
///
/// # 参数
/// - `path`: 文件路径
///
/// # 返回
/// 返回 32 位 hex 字符串
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("无法打开文件: {}", path.display()))?;

    let mut context = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// 计算字符串的 MD5（hex 小写）
pub fn hash_str(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_str_stable() {
        // 经典测试向量
        assert_eq!(hash_str(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_str("abc"), "900150983cd24fb0d6963f7d28e17f72");
        // 同样输入必须得到同样的哈希
        assert_eq!(hash_str("Câu 1"), hash_str("Câu 1"));
    }

    #[tokio::test]
    async fn test_hash_file_matches_hash_str() {
        let dir = std::env::temp_dir().join(format!("quiz_hash_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("sample.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let file_hash = hash_file(&path).await.unwrap();
        assert_eq!(file_hash, hash_str("hello world"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
