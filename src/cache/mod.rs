//! 语义缓存
//!
//! ## 职责
//!
//! 按规范化内容哈希索引已解答的题目，解答前先查缓存，命中即免去
//! 供应商调用。键为 (题干哈希, 选项集哈希)，对措辞无关的空白、
//! 大小写、标点差异不敏感。
//!
//! ## 保证
//!
//! 缓存是尽力而为的：查询失败降级为未命中，写入失败只记日志，
//! 任何缓存故障都不会使任务失败。

pub mod file_cache;

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::hash::hash_str;
use crate::models::{CachedAnswer, ParsedChoice, ParsedQuestion};

pub use file_cache::FileAnswerCache;

/// 题干头部的编号装饰（规范化时剥离）
fn stem_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:c\s?âu\s*\d+\s*[.:]?|\d+\s*[.)]|\p{L}\s*[.)])\s*").expect("题干前缀正则无效")
    })
}

/// 规范化题干
///
/// 小写 → 剥离 "câu <n>." / "<n>." / "<字母>." 前缀 → 只保留字母和数字
/// （顺带去掉所有空白）。幂等，且对空白 / 大小写 / 标点不敏感。
pub fn normalize_stem(stem: &str) -> String {
    let lower = stem.trim().to_lowercase();
    let stripped = stem_prefix_regex().replace(&lower, "");
    stripped.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// 规范化选项集
///
/// 按键排序后取各选项文本，小写并去掉全部空白，以 "|" 相连。
/// 输入选项按键重排不改变结果。
pub fn normalize_choices(choices: &[ParsedChoice]) -> String {
    let mut sorted: Vec<&ParsedChoice> = choices.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    sorted
        .iter()
        .map(|c| {
            c.text
                .to_lowercase()
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// 计算题目的缓存键 (题干哈希, 选项集哈希)
pub fn question_cache_keys(question: &ParsedQuestion) -> (String, String) {
    (
        hash_str(&normalize_stem(&question.stem)),
        hash_str(&normalize_choices(&question.choices)),
    )
}

/// 答案缓存存储
///
/// 外部存储只需满足这两个操作；复合键唯一性由实现保证
#[async_trait]
pub trait AnswerCacheStore: Send + Sync {
    /// 查询缓存
    ///
    /// 命中时原子地累加命中计数并刷新最近命中时间；
    /// 任何内部错误都降级为未命中
    async fn lookup(&self, stem_hash: &str, choices_hash: &str) -> Option<CachedAnswer>;

    /// 批量写入（仅插入语义）
    ///
    /// 键已存在时不触碰 correct_key / explanation / provider，
    /// 首个权威答案永不被覆盖；写入失败只记日志
    async fn write_batch(&self, entries: Vec<CachedAnswer>);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(key: &str, text: &str) -> ParsedChoice {
        ParsedChoice {
            key: key.to_string(),
            text: text.to_string(),
            is_visually_marked: false,
        }
    }

    #[test]
    fn test_normalize_stem_invariance() {
        // 前缀、空白、大小写、标点都不影响结果
        assert_eq!(
            normalize_stem("Câu 1. What IS X?"),
            normalize_stem("what\nis  x")
        );
        assert_eq!(normalize_stem("1) What is X"), normalize_stem("A. what is x"));
    }

    #[test]
    fn test_normalize_stem_idempotent() {
        let once = normalize_stem("Câu 12: Thủ đô của Việt Nam?");
        assert_eq!(normalize_stem(&once), once);
    }

    #[test]
    fn test_normalize_stem_keeps_unicode_letters() {
        let normalized = normalize_stem("Câu 2. Thủ đô?");
        assert!(normalized.contains("thủđô"));
    }

    #[test]
    fn test_normalize_choices_permutation_invariant() {
        let a = vec![choice("A", "3"), choice("B", "4"), choice("C", "5")];
        let shuffled = vec![choice("C", "5"), choice("A", "3"), choice("B", "4")];
        assert_eq!(normalize_choices(&a), normalize_choices(&shuffled));
    }

    #[test]
    fn test_normalize_choices_whitespace_case() {
        let a = vec![choice("A", "Hà Nội"), choice("B", "Đà Nẵng")];
        let b = vec![choice("A", "hà  nội"), choice("B", "đà\nnẵng")];
        assert_eq!(normalize_choices(&a), normalize_choices(&b));
        assert_eq!(normalize_choices(&a), "hànội|đànẵng");
    }

    #[test]
    fn test_cache_keys_stable() {
        let q = ParsedQuestion {
            index: 1,
            stem: "What is 2+2?".to_string(),
            choices: vec![choice("A", "3"), choice("B", "4")],
            correct_answer_key: String::new(),
            section: "CLO 1".to_string(),
            source: crate::models::quiz::AnswerSource::AiGenerated,
        };
        let (h1, h2) = question_cache_keys(&q);
        let (h1b, h2b) = question_cache_keys(&q);
        assert_eq!(h1, h1b);
        assert_eq!(h2, h2b);
        assert_eq!(h1.len(), 32);
        assert_eq!(h2.len(), 32);
    }
}
