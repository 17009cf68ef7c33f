//! 解析器输出的中间记录
//!
//! 解析器只产出这三种封闭的数据类型，不向外泄露格式细节

use crate::models::quiz::AnswerSource;

/// 解析出的单个选项
#[derive(Debug, Clone)]
pub struct ParsedChoice {
    /// 选项键（单个大写字母）
    pub key: String,
    /// 选项文本
    pub text: String,
    /// 是否带有视觉标记（仅 DOCX HTML 路径会置位）
    pub is_visually_marked: bool,
}

/// 解析出的单个题目
#[derive(Debug, Clone)]
pub struct ParsedQuestion {
    /// 题目序号（从 1 开始，贯穿整条流水线）
    pub index: usize,
    /// 题干（已去除编号装饰）
    pub stem: String,
    /// 选项列表
    pub choices: Vec<ParsedChoice>,
    /// 正确答案键（视觉标记唯一时为该选项键，否则为空）
    pub correct_answer_key: String,
    /// 所属章节（粘性继承自最近的章节标题）
    pub section: String,
    /// 答案来源标记
    pub source: AnswerSource,
}

/// 解析出的整篇文档
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// 文档标题
    pub title: String,
    /// 题目列表（按出现顺序）
    pub questions: Vec<ParsedQuestion>,
}
