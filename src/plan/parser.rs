//! 计划解析：把 Agent 的自由文本输出转成有序任务列表
//!
//! 三级策略：内嵌 JSON 数组 → 序号行（`1. 标题: 描述`）→ 单个兜底任务。
//! 解析永不失败，也永不返回空列表。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 兜底任务标题
pub const FALLBACK_TASK_TITLE: &str = "Execute requirements";

/// 解析出的任务（尚未分配 ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// 解析计划文本；任何格式错误都在内部回退，不向调用方抛出
pub fn parse_plan(raw: &str) -> Vec<ParsedTask> {
    if let Some(tasks) = parse_json_tasks(raw) {
        tracing::debug!(count = tasks.len(), "plan parsed from JSON array");
        return tasks;
    }

    let tasks = parse_numbered_lines(raw);
    if !tasks.is_empty() {
        tracing::debug!(count = tasks.len(), "plan parsed from numbered list");
        return tasks;
    }

    tracing::debug!("plan text has no recognisable structure, using single fallback task");
    vec![ParsedTask {
        title: FALLBACK_TASK_TITLE.to_string(),
        description: raw.trim().to_string(),
    }]
}

fn parse_json_tasks(raw: &str) -> Option<Vec<ParsedTask>> {
    find_literal(raw, '[', ']', |literal| {
        let tasks: Vec<ParsedTask> = serde_json::from_str(literal).ok()?;
        let tasks: Vec<ParsedTask> = tasks
            .into_iter()
            .filter(|t| !t.title.trim().is_empty())
            .collect();
        (!tasks.is_empty()).then_some(tasks)
    })
}

/// 依次尝试文本中每个以 `open` 开头的配对字面量，返回第一个被 `accept` 接受的结果
///
/// 正文里的 `[staging]`、`{placeholder}` 之类不会挡住后面真正的 JSON。
pub(crate) fn find_literal<T>(
    raw: &str,
    open: char,
    close: char,
    mut accept: impl FnMut(&str) -> Option<T>,
) -> Option<T> {
    raw.match_indices(open)
        .filter_map(|(start, _)| balanced_literal_at(raw, start, open, close))
        .find_map(|literal| accept(literal))
}

/// 从 `start` 处的 `open` 开始做括号配对（忽略字符串内的括号），返回完整字面量
fn balanced_literal_at(raw: &str, start: usize, open: char, close: char) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn ordinal_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.(\s*)(.+)$").expect("valid ordinal regex"))
}

fn heading_separator() -> &'static Regex {
    // 冒号后须为空白或行尾，避免把 URL 中的 `https:` 当作分隔
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(?:\*\*|__)?(?:\s|$)").expect("valid separator regex"))
}

fn strip_emphasis(s: &str) -> &str {
    s.trim()
        .trim_start_matches("**")
        .trim_start_matches("__")
        .trim_end_matches("**")
        .trim_end_matches("__")
        .trim()
}

/// 拆分序号行：返回（标题，行内描述）
///
/// 序号点后紧跟数字（`1.5 seconds`）视为小数而非序号；`1. 2FA login` 仍是标题。
fn split_heading(gap: &str, rest: &str) -> Option<(String, String)> {
    if gap.is_empty() && rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let (title, description) = match heading_separator().find(rest) {
        Some(m) => (&rest[..m.start()], rest[m.end()..].trim()),
        None => (rest, ""),
    };
    let title = strip_emphasis(title).trim_end_matches(':').trim();
    if title.is_empty() {
        return None;
    }
    Some((title.to_string(), description.to_string()))
}

fn parse_numbered_lines(raw: &str) -> Vec<ParsedTask> {
    let mut tasks: Vec<ParsedTask> = Vec::new();

    for line in raw.lines() {
        let heading = ordinal_line()
            .captures(line)
            .and_then(|caps| match (caps.get(1), caps.get(2)) {
                (Some(gap), Some(rest)) => split_heading(gap.as_str(), rest.as_str()),
                _ => None,
            });

        match heading {
            Some((title, description)) => tasks.push(ParsedTask { title, description }),
            None => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Some(current) = tasks.last_mut() {
                    if !current.description.is_empty() {
                        current.description.push(' ');
                    }
                    current.description.push_str(text);
                }
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array_in_prose() {
        let raw = r#"Here is the plan:
```json
[{"title": "Open site", "description": "Go to [home]"}, {"title": "Login", "description": "Use creds"}]
```
Good luck."#;
        let tasks = parse_plan(raw);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Open site");
        assert_eq!(tasks[0].description, "Go to [home]");
        assert_eq!(tasks[1].title, "Login");
    }

    #[test]
    fn test_numbered_list_with_colon() {
        let raw = "1. Open page: navigate to the site\n   wait for load\n2. **Click login**: press the button\n";
        let tasks = parse_plan(raw);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Open page");
        assert_eq!(tasks[0].description, "navigate to the site wait for load");
        assert_eq!(tasks[1].title, "Click login");
        assert_eq!(tasks[1].description, "press the button");
    }

    #[test]
    fn test_numbered_list_keeps_urls_in_title() {
        let tasks = parse_plan("1. Open https://x.com\n2. Click login");
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Open https://x.com", "Click login"]);
    }

    #[test]
    fn test_bold_heading_with_inner_colon() {
        let tasks = parse_plan("1. **Setup:** prepare data");
        assert_eq!(tasks[0].title, "Setup");
        assert_eq!(tasks[0].description, "prepare data");
    }

    #[test]
    fn test_malformed_json_falls_back_to_lines() {
        let raw = "[{\"title\": broken\n1. First: a\n2. Second: b";
        let tasks = parse_plan(raw);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].title, "Second");
    }

    #[test]
    fn test_unstructured_text_yields_single_task() {
        let tasks = parse_plan("just test the checkout page please");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, FALLBACK_TASK_TITLE);
        assert_eq!(tasks[0].description, "just test the checkout page please");
    }

    #[test]
    fn test_empty_input_never_empty() {
        assert_eq!(parse_plan("").len(), 1);
        assert_eq!(parse_plan("[]").len(), 1);
    }

    #[test]
    fn test_literal_ignores_brackets_in_strings() {
        let raw = r#"x ["a]", ["b"]] y"#;
        let literal = find_literal(raw, '[', ']', |l| Some(l.to_string()));
        assert_eq!(literal.as_deref(), Some(r#"["a]", ["b"]]"#));
    }

    #[test]
    fn test_titles_starting_with_digits() {
        let tasks = parse_plan("1. 2FA login: enter the code\n2. 404 page: open a missing url\n3. Logout");
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["2FA login", "404 page", "Logout"]);
        assert_eq!(tasks[0].description, "enter the code");
    }

    #[test]
    fn test_decimal_line_is_not_a_heading() {
        let tasks = parse_plan("1. Wait for load\n1.5 seconds at most\n2. 3D Secure checkout");
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Wait for load", "3D Secure checkout"]);
        assert_eq!(tasks[0].description, "1.5 seconds at most");
    }

    #[test]
    fn test_bracketed_prose_before_json_array() {
        let raw = "Plan for [staging]:\n[{\"title\":\"Open\",\"description\":\"home\"},{\"title\":\"Login\",\"description\":\"creds\"}]";
        let tasks = parse_plan(raw);
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Open", "Login"]);
    }
}
