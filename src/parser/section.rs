//! 章节追踪与规范化
//!
//! 章节标签具有"粘性"：一个标题引入的章节会附加到其后所有题目上，
//! 直到出现下一个标题

use regex::Regex;
use std::sync::OnceLock;

/// 默认章节名（未检测到任何标题时使用）
pub const DEFAULT_SECTION: &str = "Nội dung chung";

/// 块首的章节标题模式
fn leading_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[\s(]*((?:Chương|Bài|Phần|Mục|CLO|Chapter|Section|Part)\s*[\d.]+)")
            .expect("章节标题正则无效")
    })
}

/// 块首的罗马数字标题模式（如 "II. PHẦN TỰ LUẬN"）
fn roman_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([IVXLCDM]{1,5})\s*[.)]").expect("罗马数字正则无效"))
}

/// 块内任意位置的括号章节标记，如 "(CLO 1.2)"、"(Chương 3)"
fn embedded_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\(\s*((?:CLO|Chương|Bài)\s*[\d.]+)\s*\)").expect("章节标记正则无效")
    })
}

/// 章节主干提取：字母前缀 + 第一段整数
fn major_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\p{L}+)\s*(\d+)").expect("章节主干正则无效"))
}

/// 章节追踪器
///
/// 维护一个标量 current_section，对每个题目块：
/// 1. 块首匹配章节标题 → 更新
/// 2. 否则块内出现括号标记 → 更新
/// 3. 将当前章节赋给该块
#[derive(Debug)]
pub struct SectionTracker {
    current: String,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self {
            current: DEFAULT_SECTION.to_string(),
        }
    }

    /// 观察一个题目块，返回它所属的章节
    pub fn observe(&mut self, block: &str) -> String {
        if let Some(caps) = leading_heading_regex().captures(block) {
            self.current = sanitize_section(&caps[1]);
        } else if let Some(caps) = roman_heading_regex().captures(block) {
            self.current = sanitize_section(&caps[1]);
        } else if let Some(caps) = embedded_marker_regex().captures(block) {
            self.current = sanitize_section(&caps[1]);
        }
        self.current.clone()
    }

    /// 当前章节
    pub fn current(&self) -> &str {
        &self.current
    }
}

impl Default for SectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 章节名规范化
///
/// 1. 去空白并转大写
/// 2. 折叠重复前缀（"CLCLO"、"CLO CLO" → "CLO"）
/// 3. 提取主干（字母 + 第一段整数），统一空格："CLO1" → "CLO 1"
/// 4. 无数字的标题（罗马数字等）原样保留
/// 5. 结果为空则回退到默认章节
pub fn sanitize_section(raw: &str) -> String {
    let mut s = raw.trim().to_uppercase();
    if s.is_empty() {
        return DEFAULT_SECTION.to_string();
    }

    // 折叠 "CLCLO" 这类粘连重复
    while s.contains("CLCLO") {
        s = s.replace("CLCLO", "CLO");
    }

    // 折叠 "CLO CLO" 这类逐词重复
    static DOUBLED: OnceLock<Regex> = OnceLock::new();
    let doubled =
        DOUBLED.get_or_init(|| Regex::new(r"^(\p{L}+)\s+(\p{L}+)").expect("重复前缀正则无效"));
    let collapsed = doubled.captures(&s).and_then(|caps| {
        if caps[1] == caps[2] {
            Some(format!("{}{}", &caps[1], &s[caps.get(2).unwrap().end()..]))
        } else {
            None
        }
    });
    if let Some(collapsed) = collapsed {
        s = collapsed;
    }

    // 提取主干：字母 + 第一段整数
    if let Some(caps) = major_prefix_regex().captures(&s) {
        return format!("{} {}", &caps[1], &caps[2]);
    }

    // 无数字（如罗马数字标题）：原样保留
    let trimmed = s.trim().to_string();
    if trimmed.is_empty() {
        DEFAULT_SECTION.to_string()
    } else {
        trimmed
    }
}
