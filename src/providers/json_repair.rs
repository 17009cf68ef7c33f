//! JSON 修复
//!
//! 语言模型的输出经常在结尾处被截断。对截断的 JSON 对象做确定性的
//! 尽力补全：补上未闭合的引号、去掉悬挂的逗号、补齐缺失的右花括号。
//! 修复只追加或删尾，绝不改写中间内容。

/// 尝试修复截断 / 残缺的 JSON 对象文本
///
/// # 返回
/// 输入不以 `{` 开头时直接放弃（None）；否则返回修复后的字符串
/// （可能与输入相同）
pub fn repair_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let mut in_quotes = false;
    let mut escaped = false;
    let mut open_braces: i32 = 0;

    for c in trimmed.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => open_braces += 1,
            '}' if !in_quotes => open_braces -= 1,
            _ => {}
        }
    }

    let mut repaired = trimmed.to_string();

    // 闭合未完成的字符串
    if in_quotes {
        repaired.push('"');
    }

    // 去掉悬挂的逗号
    let end_trimmed = repaired.trim_end().to_string();
    repaired = if let Some(stripped) = end_trimmed.strip_suffix(',') {
        stripped.to_string()
    } else {
        end_trimmed
    };

    // 补齐缺失的右花括号
    for _ in 0..open_braces.max(0) {
        repaired.push('}');
    }

    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_value_repaired() {
        let repaired = repair_json(r#"{"1":"A","2":"B"#).unwrap();
        assert_eq!(repaired, r#"{"1":"A","2":"B"}"#);
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed["2"], "B");
    }

    #[test]
    fn test_trailing_comma_stripped() {
        let repaired = repair_json(r#"{"1":"A","2":"B","#).unwrap();
        assert_eq!(repaired, r#"{"1":"A","2":"B"}"#);
    }

    #[test]
    fn test_already_valid_unchanged() {
        let input = r#"{"1":"A"}"#;
        assert_eq!(repair_json(input).unwrap(), input);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        // 值内的转义引号不应干扰引号配对
        let repaired = repair_json(r#"{"1":"nói \"xin chào\"","2":"B"#).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed["2"], "B");
    }

    #[test]
    fn test_nested_braces() {
        let repaired = repair_json(r#"{"a":{"b":"c"#).unwrap();
        assert_eq!(repaired, r#"{"a":{"b":"c"}}"#);
    }

    #[test]
    fn test_not_an_object_rejected() {
        assert!(repair_json("chắc chắn rồi, đáp án là A").is_none());
        assert!(repair_json(r#"["A","B"]"#).is_none());
    }
}
