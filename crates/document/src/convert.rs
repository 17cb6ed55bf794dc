//! Format normalisation: HTML and JSON become Markdown
//!
//! The HTML rewrite is deliberately regex-based rather than a full HTML
//! parse: inputs here are document-shaped exports (blog posts, rendered
//! docs), not arbitrary markup, and a fixed rewrite set keeps the
//! conversion total and dependency-free. Tag soup degrades to stripped
//! text instead of failing.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// Source format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Html,
    Json,
    Markdown,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Html => "html",
            DocumentFormat::Json => "json",
            DocumentFormat::Markdown => "markdown",
        }
    }
}

static HTML_TAG_PROBE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"<(?:!doctype\s+html|html|head|body|div|p|h[1-6])[\s>]")
        .case_insensitive(true)
        .build()
        .expect("static regex")
});

/// Detect the source format. Pure and total: any input maps to exactly one
/// format, with Markdown/plain as the fallback.
pub fn detect_format(content: &str) -> DocumentFormat {
    let trimmed = content.trim_start();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(content).is_ok()
    {
        return DocumentFormat::Json;
    }

    let mut probe_end = content.len().min(512);
    while !content.is_char_boundary(probe_end) {
        probe_end -= 1;
    }
    if HTML_TAG_PROBE.is_match(&content[..probe_end]) {
        return DocumentFormat::Html;
    }

    DocumentFormat::Markdown
}

/// Normalise any supported input to Markdown. Markdown and plain text pass
/// through unchanged.
pub fn to_markdown(content: &str, format: DocumentFormat) -> String {
    match format {
        DocumentFormat::Html => html_to_markdown(content),
        DocumentFormat::Json => json_to_markdown(content),
        DocumentFormat::Markdown => content.to_string(),
    }
}

struct Rewrite {
    pattern: Lazy<Regex>,
    replacement: &'static str,
}

macro_rules! rewrite {
    ($pattern:literal => $replacement:literal) => {
        Rewrite {
            pattern: Lazy::new(|| {
                RegexBuilder::new($pattern)
                    .case_insensitive(true)
                    .dot_matches_new_line(true)
                    .build()
                    .expect("static regex")
            }),
            replacement: $replacement,
        }
    };
}

static HTML_REWRITES: [Rewrite; 12] = [
    rewrite!(r"<h1[^>]*>(.*?)</h1>" => "\n# $1\n"),
    rewrite!(r"<h2[^>]*>(.*?)</h2>" => "\n## $1\n"),
    rewrite!(r"<h3[^>]*>(.*?)</h3>" => "\n### $1\n"),
    rewrite!(r"<h4[^>]*>(.*?)</h4>" => "\n#### $1\n"),
    rewrite!(r"<h5[^>]*>(.*?)</h5>" => "\n##### $1\n"),
    rewrite!(r"<h6[^>]*>(.*?)</h6>" => "\n###### $1\n"),
    rewrite!(r"<(?:strong|b)[^>]*>(.*?)</(?:strong|b)>" => "**$1**"),
    rewrite!(r"<(?:em|i)[^>]*>(.*?)</(?:em|i)>" => "*$1*"),
    rewrite!(r#"<a[^>]*href=["']([^"']*)["'][^>]*>(.*?)</a>"# => "[$2]($1)"),
    rewrite!(r"<li[^>]*>(.*?)</li>" => "\n- $1"),
    rewrite!(r"<pre[^>]*>(.*?)</pre>" => "\n```\n$1\n```\n"),
    rewrite!(r"<code[^>]*>(.*?)</code>" => "`$1`"),
];

static PARAGRAPH_OPEN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"</?p[^>]*>")
        .case_insensitive(true)
        .build()
        .expect("static regex")
});
static REMAINING_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static EXCESS_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n[ \t]*(\n[ \t]*)+").expect("static regex"));

fn html_to_markdown(html: &str) -> String {
    let mut text = html.to_string();
    for rewrite in &HTML_REWRITES {
        text = rewrite.pattern.replace_all(&text, rewrite.replacement).into_owned();
    }
    text = PARAGRAPH_OPEN.replace_all(&text, "\n").into_owned();
    text = REMAINING_TAGS.replace_all(&text, " ").into_owned();
    text = EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}

fn json_to_markdown(json: &str) -> String {
    match serde_json::from_str::<Value>(json) {
        Ok(value) => format_json_value(&value, 0),
        // Unparseable input reaches speech as a verbatim code block.
        Err(_) => format!("```json\n{json}\n```"),
    }
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Recursive JSON-to-Markdown rendering. Source insertion order is
/// preserved (serde_json is built with `preserve_order`).
fn format_json_value(value: &Value, level: usize) -> String {
    match value {
        Value::Object(map) => {
            let mut lines = Vec::new();
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        if level == 0 {
                            lines.push(format!("## {}", title_case(key)));
                        } else {
                            lines.push(format!("{}- **{}**:", "  ".repeat(level), key));
                        }
                        lines.push(format_json_value(val, level + 1));
                    }
                    scalar => {
                        if level == 0 {
                            lines.push(format!("**{}**: {}", title_case(key), scalar_text(scalar)));
                        } else {
                            lines.push(format!(
                                "{}- **{}**: {}",
                                "  ".repeat(level),
                                key,
                                scalar_text(scalar)
                            ));
                        }
                    }
                }
            }
            lines.join("\n")
        }
        Value::Array(items) => {
            let mut lines = Vec::new();
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        lines.push(format_json_value(item, level));
                    }
                    scalar => {
                        lines.push(format!("{}- {}", "  ".repeat(level), scalar_text(scalar)));
                    }
                }
            }
            lines.join("\n")
        }
        scalar => scalar_text(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_json() {
        assert_eq!(detect_format(r#"{"a": 1}"#), DocumentFormat::Json);
        assert_eq!(detect_format("[1, 2, 3]"), DocumentFormat::Json);
        // Braces that do not parse are not JSON.
        assert_eq!(detect_format("{not json"), DocumentFormat::Markdown);
    }

    #[test]
    fn test_detect_html() {
        assert_eq!(detect_format("<!DOCTYPE html>\n<html>"), DocumentFormat::Html);
        assert_eq!(detect_format("<p>Hello</p>"), DocumentFormat::Html);
        assert_eq!(detect_format("<div class=\"x\">y</div>"), DocumentFormat::Html);
    }

    #[test]
    fn test_detect_markdown_fallback() {
        assert_eq!(detect_format("# Title\n\nBody"), DocumentFormat::Markdown);
        assert_eq!(detect_format("just plain text"), DocumentFormat::Markdown);
        // HTML tags past the probe window do not flip detection.
        let long_prefix = "a".repeat(600) + "<html>";
        assert_eq!(detect_format(&long_prefix), DocumentFormat::Markdown);
        // Multibyte content straddling the probe boundary must not panic.
        let unicode = "é".repeat(400) + "<p>tail</p>";
        assert_eq!(detect_format(&unicode), DocumentFormat::Markdown);
    }

    #[test]
    fn test_detect_is_deterministic() {
        for input in ["{}", "<p>x</p>", "plain", "# md"] {
            assert_eq!(detect_format(input), detect_format(input));
        }
    }

    #[test]
    fn test_html_headings_and_emphasis() {
        let html = "<h1>Title</h1><p>Some <strong>bold</strong> and <em>soft</em> text.</p>";
        let md = to_markdown(html, DocumentFormat::Html);
        assert!(md.contains("# Title"));
        assert!(md.contains("**bold**"));
        assert!(md.contains("*soft*"));
        assert!(!md.contains('<'));
    }

    #[test]
    fn test_html_links_lists_code() {
        let html = r#"<ul><li>one</li><li>two</li></ul><a href="https://x.io">site</a><code>let x</code>"#;
        let md = to_markdown(html, DocumentFormat::Html);
        assert!(md.contains("- one"));
        assert!(md.contains("- two"));
        assert!(md.contains("[site](https://x.io)"));
        assert!(md.contains("`let x`"));
    }

    #[test]
    fn test_html_whitespace_collapse() {
        let html = "<p>a</p>\n\n\n\n<p>b</p>";
        let md = to_markdown(html, DocumentFormat::Html);
        assert!(!md.contains("\n\n\n"));
    }

    #[test]
    fn test_json_top_level_keys_become_headings() {
        let json = r#"{"intro": {"body": "hello"}, "count": 3}"#;
        let md = to_markdown(json, DocumentFormat::Json);
        assert!(md.contains("## Intro"));
        assert!(md.contains("**Count**: 3"));
        assert!(md.contains("- **body**: hello"));
    }

    #[test]
    fn test_json_preserves_insertion_order() {
        let json = r#"{"zebra": 1, "apple": 2, "mango": 3}"#;
        let md = to_markdown(json, DocumentFormat::Json);
        let zebra = md.find("Zebra").unwrap();
        let apple = md.find("Apple").unwrap();
        let mango = md.find("Mango").unwrap();
        assert!(zebra < apple && apple < mango);
    }

    #[test]
    fn test_json_array_items() {
        let json = r#"{"steps": ["first", "second"]}"#;
        let md = to_markdown(json, DocumentFormat::Json);
        assert!(md.contains("- first"));
        assert!(md.contains("- second"));
    }

    #[test]
    fn test_markdown_passes_through() {
        let md = "# Title\n\n**bold**";
        assert_eq!(to_markdown(md, DocumentFormat::Markdown), md);
    }
}
