//! 题目块切分与题目提取
//!
//! 将纯文本切分为题目块，再从每个块中提取题干与选项。
//! 切分锚点（多选一）：
//! - `(CLO d.d)` 括号标记
//! - `Câu <n>:` / `Câu <n>.`（大小写不敏感，容忍 "C âu" 中的多余空格）
//! - 行首的 `<n>.` / `<n>)`

use regex::Regex;
use std::sync::OnceLock;

use crate::models::quiz::AnswerSource;
use crate::models::{ParsedChoice, ParsedQuestion};
use crate::parser::section::SectionTracker;

/// 短于该字符数的块被丢弃
const MIN_BLOCK_CHARS: usize = 10;

/// 题目块切分锚点
fn question_anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)\(\s*CLO\s*\d+\.\d+\s*\)|c\s?âu\s*\d+\s*[:.]|^[ \t]*\d+\s*[.)]")
            .expect("题目锚点正则无效")
    })
}

/// 选项区起点：第一个 " A."
fn choice_anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s[Aa]\.").expect("选项锚点正则无效"))
}

/// 选项键扫描：空白后跟单个 A-F 字母加点
fn choice_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)([A-Fa-f])\.").expect("选项键正则无效"))
}

/// 题干头部的编号装饰
fn stem_decoration_regexes() -> &'static [Regex; 4] {
    static RES: OnceLock<[Regex; 4]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?i)^\(\s*(?:CLO|Chương|Bài)[^)]*\)\s*[:.\-]?\s*").expect("装饰正则无效"),
            Regex::new(r"(?i)^(?:Chương|Bài|Phần|Mục|CLO|Chapter|Section|Part)\s*[\d.]+\s*[:.\-]?\s*")
                .expect("装饰正则无效"),
            Regex::new(r"(?i)^c\s?âu\s*\d+\s*[:.]?\s*").expect("装饰正则无效"),
            Regex::new(r"^\d+\s*[.)]\s*").expect("装饰正则无效"),
        ]
    })
}

/// 提取出的原始题目（尚未带章节与序号）
#[derive(Debug)]
pub(crate) struct RawQuestion {
    pub stem: String,
    /// (键, 文本)，键已大写且从 A 起连续
    pub choices: Vec<(char, String)>,
}

/// 将纯文本切分为题目列表
///
/// 章节以粘性方式继承：块首或块内的章节标题更新 current_section，
/// 其后的每个块都带上它，直到下一个标题出现
pub fn split_text(text: &str) -> Vec<ParsedQuestion> {
    let starts: Vec<usize> = question_anchor_regex()
        .find_iter(text)
        .map(|m| m.start())
        .collect();

    let mut tracker = SectionTracker::new();
    let mut questions: Vec<ParsedQuestion> = Vec::new();

    // 第一个锚点之前的导语逐行观察，标题行同样计入章节追踪
    let preamble_end = starts.first().copied().unwrap_or(text.len());
    for line in text[..preamble_end].lines() {
        tracker.observe(line);
    }

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];

        // 先观察章节再判断长度：过短的块产不出题目，但标记仍然生效
        let section = tracker.observe(block);

        if block.trim().chars().count() < MIN_BLOCK_CHARS {
            continue;
        }

        if let Some(raw) = extract_question_from_block(block) {
            let index = questions.len() + 1;
            questions.push(ParsedQuestion {
                index,
                stem: raw.stem,
                choices: raw
                    .choices
                    .into_iter()
                    .map(|(key, text)| ParsedChoice {
                        key: key.to_string(),
                        text,
                        is_visually_marked: false,
                    })
                    .collect(),
                correct_answer_key: String::new(),
                section: section.clone(),
                source: AnswerSource::AiGenerated,
            });
        }
    }

    questions
}

/// 从单个块中提取题干与选项
///
/// 要求至少 2 个选项且题干非空，否则返回 None
pub(crate) fn extract_question_from_block(block: &str) -> Option<RawQuestion> {
    let anchor = choice_anchor_regex().find(block)?;

    let stem = clean_stem(&block[..anchor.start()]);
    if stem.is_empty() {
        return None;
    }

    let choices = scan_choices(&block[anchor.start()..]);
    if choices.len() < 2 {
        return None;
    }

    Some(RawQuestion { stem, choices })
}

/// 从选项区扫描选项
///
/// 按期望字母顺序接受选项键（A、B、C...），乱序出现的字母视为正文，
/// 这样题干或选项文本里偶然出现的 "D." 不会切断选项
fn scan_choices(part: &str) -> Vec<(char, String)> {
    let mut boundaries: Vec<(char, usize, usize)> = Vec::new(); // (键, 文本起点, 匹配起点)
    let mut expected = 'A';

    for caps in choice_key_regex().captures_iter(part) {
        if expected > 'F' {
            break;
        }
        let m = caps.get(1).unwrap();
        let key = m.as_str().chars().next().unwrap().to_ascii_uppercase();
        if key == expected {
            boundaries.push((key, m.end() + 1, caps.get(0).unwrap().start()));
            expected = (expected as u8 + 1) as char;
        }
    }

    let mut choices = Vec::new();
    for (i, &(key, text_start, _)) in boundaries.iter().enumerate() {
        let text_end = boundaries
            .get(i + 1)
            .map(|&(_, _, next_start)| next_start)
            .unwrap_or(part.len());
        let text = collapse_whitespace(&part[text_start.min(text_end)..text_end]);
        choices.push((key, text));
    }
    choices
}

/// 清理题干：剥离头部的章节 / 编号装饰，折叠空白
pub(crate) fn clean_stem(raw: &str) -> String {
    let mut s = raw.trim();
    loop {
        let mut stripped = false;
        for re in stem_decoration_regexes().iter() {
            if let Some(m) = re.find(s) {
                if m.start() == 0 && m.end() > 0 {
                    s = s[m.end()..].trim_start();
                    stripped = true;
                }
            }
        }
        if !stripped {
            break;
        }
    }
    collapse_whitespace(s)
}

/// 折叠连续空白为单个空格
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let text = "Câu 1: Thủ đô của Việt Nam là gì?\n A. Hà Nội\n B. Đà Nẵng\n C. Huế\n\
                    Câu 2: 1 + 1 bằng mấy?\n A. 1\n B. 2";
        let questions = split_text(text);
        assert_eq!(questions.len(), 2);

        assert_eq!(questions[0].index, 1);
        assert_eq!(questions[0].stem, "Thủ đô của Việt Nam là gì?");
        assert_eq!(questions[0].choices.len(), 3);
        assert_eq!(questions[0].choices[0].key, "A");
        assert_eq!(questions[0].choices[0].text, "Hà Nội");
        assert_eq!(questions[0].choices[2].key, "C");

        assert_eq!(questions[1].index, 2);
        assert_eq!(questions[1].choices[1].text, "2");
    }

    #[test]
    fn test_split_numbered_anchors() {
        let text = "1. What is TCP?\n A. protocol\n B. program\n2) What is IP?\n A. address\n B. cable";
        let questions = split_text(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].stem, "What is TCP?");
        assert_eq!(questions[1].stem, "What is IP?");
    }

    #[test]
    fn test_stray_space_in_cau() {
        let text = "C âu 1: nội dung câu hỏi dài hơn mười ký tự\n A. một\n B. hai";
        let questions = split_text(text);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].stem, "nội dung câu hỏi dài hơn mười ký tự");
    }

    #[test]
    fn test_sticky_sections() {
        let text = "Chương 1. Mở đầu\n\
                    Câu 1: hỏi thứ nhất?\n A. x\n B. y\n\
                    Câu 2: hỏi thứ hai?\n A. x\n B. y\n\
                    Câu 3 (CLO 2.1): hỏi thứ ba?\n A. x\n B. y\n\
                    Câu 4: hỏi thứ tư?\n A. x\n B. y";
        let questions = split_text(text);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0].section, "CHƯƠNG 1");
        assert_eq!(questions[1].section, "CHƯƠNG 1");
        assert_eq!(questions[2].section, "CLO 2");
        assert_eq!(questions[3].section, "CLO 2");
    }

    #[test]
    fn test_default_section() {
        let text = "Câu 1: không có chương nào ở đây?\n A. x\n B. y";
        let questions = split_text(text);
        assert_eq!(questions[0].section, "Nội dung chung");
    }

    #[test]
    fn test_short_block_discarded() {
        // "9. ab" 不足 10 字符，应被丢弃
        let text = "9. ab\nCâu 1: một câu hỏi hợp lệ ở đây?\n A. x\n B. y";
        let questions = split_text(text);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].stem, "một câu hỏi hợp lệ ở đây?");
    }

    #[test]
    fn test_single_choice_discarded() {
        let text = "Câu 1: chỉ có một lựa chọn thôi\n A. duy nhất";
        assert!(split_text(text).is_empty());
    }

    #[test]
    fn test_out_of_order_key_treated_as_text() {
        // 正文中偶然出现的 "D." 不应切断选项序列
        let text = "Câu 1: chọn đáp án đúng nhất?\n A. vitamin D. rất tốt\n B. canxi\n C. sắt";
        let questions = split_text(text);
        assert_eq!(questions.len(), 1);
        let q = &questions[0];
        assert_eq!(q.choices.len(), 3);
        assert_eq!(q.choices[0].text, "vitamin D. rất tốt");
        assert_eq!(q.choices[1].text, "canxi");
    }

    #[test]
    fn test_stem_decoration_stripped() {
        let text = "Câu 12. (CLO 1.1) Chương trình là gì?\n A. phần mềm\n B. phần cứng";
        let questions = split_text(text);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].stem, "Chương trình là gì?");
        // 括号标记同时更新章节
        assert_eq!(questions[0].section, "CLO 1");
    }

    #[test]
    fn test_choices_capped_at_six() {
        let text = "Câu 1: nhiều lựa chọn quá?\n A. 1\n B. 2\n C. 3\n D. 4\n E. 5\n F. 6\n G. 7";
        let questions = split_text(text);
        assert_eq!(questions[0].choices.len(), 6);
        assert_eq!(questions[0].choices[5].key, "F");
        // G 之后的内容归入 F 的文本
        assert!(questions[0].choices[5].text.contains("6"));
    }
}
