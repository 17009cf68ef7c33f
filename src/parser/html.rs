//! DOCX HTML 路径：带视觉标记检测的题目提取
//!
//! DOCX 转出的 HTML 中，加粗 / 下划线 / 颜色 / 高亮 / 删除线以及 "✓"
//! 都视为作者标注的正确答案线索。恰好一个选项带标记时，
//! 该选项即为正确答案（来源 StyleDetected）。
//!
//! 实现方式：把 HTML 降解为带哨兵字符的纯文本（标记性标签换成
//! 私用区哨兵，块级标签换成换行，其余标签换成空格），之后复用
//! 文本路径的切分逻辑，并按选项切片检查哨兵是否存在。

use regex::Regex;
use std::sync::OnceLock;

use crate::models::quiz::AnswerSource;
use crate::models::{ParsedChoice, ParsedQuestion};
use crate::parser::section::SectionTracker;
use crate::parser::splitter::{clean_stem, collapse_whitespace};

/// 标记区间开始哨兵
const MARK_OPEN: char = '\u{E000}';
/// 标记区间结束哨兵
const MARK_CLOSE: char = '\u{E001}';

/// 短于该字符数的块被丢弃（与文本路径一致）
const MIN_BLOCK_CHARS: usize = 10;

fn head_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<head\b.*?</head\s*>").expect("head 正则无效"))
}

/// 语义即标记的标签（加粗 / 下划线 / 斜体 / 删除线）
fn mark_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(?:b|strong|u|i|em|ins|s|strike|del)\b[^>]*>").expect("标记标签正则无效")
    })
}

/// 可能携带内联样式的容器标签
fn styled_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(?:span|font)\b[^>]*>").expect("样式标签正则无效"))
}

/// 块级标签：换行处理
fn block_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(?:p|div|li|ul|ol|tr|td|th|table|h[1-6])\b[^>]*>|<br\s*/?>")
            .expect("块级标签正则无效")
    })
}

/// 其余所有标签
fn any_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("标签正则无效"))
}

/// 题目块锚点（哨兵文本版，与文本路径同构）
fn anchor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)\(\s*CLO\s*\d+\.\d+\s*\)|c\s?âu\s*\d+\s*[:.]|^[ \t]*\d+\s*[.)]")
            .expect("题目锚点正则无效")
    })
}

/// 选项键扫描（允许键前出现标记哨兵）
fn choice_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)[\u{E000}\u{E001}]?([A-Fa-f])\.").expect("选项键正则无效")
    })
}

/// 从 DOCX 转出的 HTML 中提取题目列表
pub fn parse_html(html: &str) -> Vec<ParsedQuestion> {
    let text = html_to_marked_text(html);

    let starts: Vec<usize> = anchor_regex().find_iter(&text).map(|m| m.start()).collect();

    let mut tracker = SectionTracker::new();
    let mut questions: Vec<ParsedQuestion> = Vec::new();

    let preamble_end = starts.first().copied().unwrap_or(text.len());
    for line in text[..preamble_end].lines() {
        tracker.observe(&strip_sentinels(line));
    }

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];
        let plain_block = strip_sentinels(block);

        let section = tracker.observe(&plain_block);

        if plain_block.trim().chars().count() < MIN_BLOCK_CHARS {
            continue;
        }

        if let Some(mut question) = extract_marked_question(block) {
            question.index = questions.len() + 1;
            question.section = section;
            questions.push(question);
        }
    }

    questions
}

/// 从单个哨兵文本块中提取题目并判定视觉标记
fn extract_marked_question(block: &str) -> Option<ParsedQuestion> {
    // 选项区起点：第一个 " A."（允许哨兵插在空白与键之间）
    let first_choice = choice_key_regex()
        .captures_iter(block)
        .find(|caps| caps[1].eq_ignore_ascii_case("a"))?;
    let anchor_start = first_choice.get(0).unwrap().start();

    let stem = clean_stem(&strip_sentinels(&block[..anchor_start]));
    if stem.is_empty() {
        return None;
    }

    // 与文本路径相同的期望字母扫描，额外记录整体匹配起点用于切片
    let part = &block[anchor_start..];
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
    if boundaries.len() < 2 {
        return None;
    }

    let mut choices = Vec::new();
    for (i, &(key, text_start, slice_start)) in boundaries.iter().enumerate() {
        let slice_end = boundaries
            .get(i + 1)
            .map(|&(_, _, next_start)| next_start)
            .unwrap_or(part.len());
        let slice = &part[slice_start..slice_end];
        let text_slice = &part[text_start.min(slice_end)..slice_end];
        choices.push(ParsedChoice {
            key: key.to_string(),
            text: collapse_whitespace(&strip_sentinels(text_slice)),
            is_visually_marked: slice_is_marked(slice),
        });
    }

    // 恰好一个标记选项 → 正确答案；零个或多个 → 留空交给 AI
    let marked: Vec<&ParsedChoice> = choices.iter().filter(|c| c.is_visually_marked).collect();
    let (correct_answer_key, source) = if marked.len() == 1 {
        (marked[0].key.clone(), AnswerSource::StyleDetected)
    } else {
        (String::new(), AnswerSource::AiGenerated)
    };

    Some(ParsedQuestion {
        index: 0, // 由调用方回填
        stem,
        choices,
        correct_answer_key,
        section: String::new(), // 由调用方回填
        source,
    })
}

/// 选项切片是否带视觉标记
fn slice_is_marked(slice: &str) -> bool {
    slice.contains(MARK_OPEN) || slice.contains(MARK_CLOSE) || slice.contains('✓')
}

/// 把 HTML 降解为带哨兵的纯文本
fn html_to_marked_text(html: &str) -> String {
    let mut s = head_regex().replace_all(html, " ").into_owned();

    // 标记性标签 → 哨兵
    s = mark_tag_regex()
        .replace_all(&s, MARK_OPEN.to_string().as_str())
        .into_owned();

    // 带标记样式的 span/font → 哨兵；普通的 → 空格
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in styled_tag_regex().find_iter(&s) {
        out.push_str(&s[last..m.start()]);
        if styled_tag_is_marked(m.as_str()) {
            out.push(MARK_OPEN);
        } else {
            out.push(' ');
        }
        last = m.end();
    }
    out.push_str(&s[last..]);
    s = out;

    // 块级标签 → 换行，其余标签 → 空格
    s = block_tag_regex().replace_all(&s, "\n").into_owned();
    s = any_tag_regex().replace_all(&s, " ").into_owned();

    decode_entities(&s)
}

/// span/font 的属性是否表达了标记意图
fn styled_tag_is_marked(tag: &str) -> bool {
    let lower = tag.to_lowercase();

    // 样式映射类名（颜色 / 高亮 / 下划线 / 删除线会被映射为这些类）
    if lower.contains("class=") && (lower.contains("marked") || lower.contains("highlight")) {
        return true;
    }

    if lower.contains("text-decoration")
        && (lower.contains("underline") || lower.contains("line-through"))
    {
        return true;
    }

    static BG: OnceLock<Regex> = OnceLock::new();
    let bg = BG.get_or_init(|| {
        Regex::new(r"background(?:-color)?\s*:\s*([#\w]+)").expect("背景色正则无效")
    });
    if let Some(caps) = bg.captures(&lower) {
        let value = &caps[1];
        if value != "transparent" && value != "white" && value != "#ffffff" && value != "#fff" {
            return true;
        }
    }

    static COLOR: OnceLock<Regex> = OnceLock::new();
    let color =
        COLOR.get_or_init(|| Regex::new(r"[^-\w]color\s*:\s*#([0-9a-f]{3,6})").expect("颜色正则无效"));
    if let Some(caps) = color.captures(&lower) {
        let hex = &caps[1];
        if hex != "000000" && hex != "000" && hex != "ffffff" && hex != "fff" {
            return true;
        }
    }

    false
}

/// 去掉哨兵字符
fn strip_sentinels(s: &str) -> String {
    s.chars().filter(|&c| c != MARK_OPEN && c != MARK_CLOSE).collect()
}

/// 解码常见 HTML 实体
fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_choice_detected() {
        let html = "<html><body>\
                    <p>Câu 1: Thủ đô của Việt Nam?</p>\
                    <p>A. Đà Nẵng</p>\
                    <p><strong>B. Hà Nội</strong></p>\
                    <p>C. Huế</p>\
                    </body></html>";
        let questions = parse_html(html);
        assert_eq!(questions.len(), 1);
        let q = &questions[0];
        assert_eq!(q.correct_answer_key, "B");
        assert_eq!(q.source, AnswerSource::StyleDetected);
        assert!(q.choices[1].is_visually_marked);
        assert!(!q.choices[0].is_visually_marked);
        assert_eq!(q.choices[1].text, "Hà Nội");
    }

    #[test]
    fn test_highlight_span_detected() {
        let html = "<p>Câu 1: 1 + 1 bằng mấy?</p>\
                    <p>A. 1</p>\
                    <p><span style=\"background-color:#ffff00\">B. 2</span></p>\
                    <p>C. 3</p>";
        let questions = parse_html(html);
        assert_eq!(questions[0].correct_answer_key, "B");
        assert_eq!(questions[0].source, AnswerSource::StyleDetected);
    }

    #[test]
    fn test_plain_span_not_marked() {
        let html = "<p>Câu 1: câu hỏi không có đánh dấu?</p>\
                    <p><span style=\"font-size:12pt\">A. một</span></p>\
                    <p><span style=\"font-size:12pt\">B. hai</span></p>";
        let questions = parse_html(html);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer_key, "");
        assert_eq!(questions[0].source, AnswerSource::AiGenerated);
    }

    #[test]
    fn test_multiple_marks_left_to_ai() {
        let html = "<p>Câu 1: hai lựa chọn đều in đậm?</p>\
                    <p><b>A. một</b></p>\
                    <p><b>B. hai</b></p>\
                    <p>C. ba</p>";
        let questions = parse_html(html);
        let q = &questions[0];
        assert_eq!(q.correct_answer_key, "");
        assert_eq!(q.source, AnswerSource::AiGenerated);
        assert!(q.choices[0].is_visually_marked);
        assert!(q.choices[1].is_visually_marked);
    }

    #[test]
    fn test_check_mark_character() {
        let html = "<p>Câu 1: ký tự đánh dấu thủ công?</p>\
                    <p>A. sai</p>\
                    <p>B. đúng ✓</p>";
        let questions = parse_html(html);
        assert_eq!(questions[0].correct_answer_key, "B");
        assert_eq!(questions[0].source, AnswerSource::StyleDetected);
        // 文本保留原样（含 ✓）
        assert!(questions[0].choices[1].text.contains('✓'));
    }

    #[test]
    fn test_section_from_html() {
        let html = "<p>Chương 3. Cơ sở dữ liệu</p>\
                    <p>Câu 1: SQL là gì?</p>\
                    <p>A. ngôn ngữ truy vấn</p>\
                    <p>B. hệ điều hành</p>";
        let questions = parse_html(html);
        assert_eq!(questions[0].section, "CHƯƠNG 3");
    }

    #[test]
    fn test_underline_style_detected() {
        let html = "<p>Câu 1: gạch chân là đáp án?</p>\
                    <p><span style=\"text-decoration: underline\">A. đáp án này</span></p>\
                    <p>B. không phải</p>";
        let questions = parse_html(html);
        assert_eq!(questions[0].correct_answer_key, "A");
    }
}
