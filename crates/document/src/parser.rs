//! Markdown to semantic elements
//!
//! Line-oriented block parse (headings, fences, list items) with inline
//! bold/italic/code/link recognition inside paragraphs. Reparsing the same
//! input always yields an identical sequence, and output order matches
//! input order.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::element::SemanticElement;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n?(.*?)```").expect("static regex"));
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("static regex"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*+]\s+(.+)$").expect("static regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("static regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("static regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("static regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("static regex"));

// Anchored variants for the left-to-right inline scan. Bold must be tried
// before italic so `**` never reads as an empty emphasis pair.
static BOLD_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*([^*]+)\*\*").expect("static regex"));
static ITALIC_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*([^*]+)\*").expect("static regex"));
static CODE_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^`([^`]+)`").expect("static regex"));
static LINK_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\(([^)]+)\)").expect("static regex"));

/// Parse Markdown into an ordered sequence of semantic elements.
pub fn parse_markdown(input: &str) -> Vec<SemanticElement> {
    let mut elements = Vec::new();
    let mut cursor = 0;

    for fence in CODE_FENCE.captures_iter(input) {
        let whole = fence.get(0).expect("match 0");
        if cursor < whole.start() {
            parse_text_segment(&input[cursor..whole.start()], &mut elements);
        }
        let code = fence.get(1).map(|m| m.as_str()).unwrap_or("").trim();
        elements.push(SemanticElement::CodeBlock { text: code.to_string() });
        cursor = whole.end();
    }
    if cursor < input.len() {
        parse_text_segment(&input[cursor..], &mut elements);
    }

    // A trailing break carries no content.
    while elements.last() == Some(&SemanticElement::Break) {
        elements.pop();
    }
    elements
}

fn parse_text_segment(segment: &str, elements: &mut Vec<SemanticElement>) {
    for line in segment.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !elements.is_empty() && elements.last() != Some(&SemanticElement::Break) {
                elements.push(SemanticElement::Break);
            }
            continue;
        }

        if let Some(caps) = HEADING.captures(line) {
            let level = caps[1].len() as u8;
            elements.push(SemanticElement::Heading {
                level,
                text: strip_inline_markup(&caps[2]),
            });
            continue;
        }

        if let Some(caps) = LIST_ITEM.captures(line) {
            elements.push(SemanticElement::ListItem {
                text: strip_inline_markup(&caps[1]),
            });
            continue;
        }

        parse_inline(line, elements);
    }
}

/// Split a paragraph line into plain runs and inline formatting elements.
///
/// A single left-to-right scan tries the markers in a fixed priority at
/// each position, so emphasis can never match across another marker's
/// boundary.
fn parse_inline(line: &str, elements: &mut Vec<SemanticElement>) {
    let mut plain = String::new();
    let mut idx = 0;
    while idx < line.len() {
        let rest = &line[idx..];
        if let Some((len, element)) = match_marker(rest) {
            push_plain(&plain, elements);
            plain.clear();
            elements.push(element);
            idx += len;
        } else {
            let ch = rest.chars().next().expect("non-empty rest");
            plain.push(ch);
            idx += ch.len_utf8();
        }
    }
    push_plain(&plain, elements);
}

fn match_marker(rest: &str) -> Option<(usize, SemanticElement)> {
    match rest.as_bytes().first()? {
        b'*' => {
            if let Some(caps) = BOLD_AT.captures(rest) {
                let whole = caps.get(0).expect("match 0");
                return Some((
                    whole.end(),
                    SemanticElement::Bold { text: caps[1].trim().to_string() },
                ));
            }
            ITALIC_AT.captures(rest).map(|caps| {
                let whole = caps.get(0).expect("match 0");
                (
                    whole.end(),
                    SemanticElement::Italic { text: caps[1].trim().to_string() },
                )
            })
        }
        b'`' => CODE_AT.captures(rest).map(|caps| {
            let whole = caps.get(0).expect("match 0");
            (
                whole.end(),
                SemanticElement::Code { text: caps[1].to_string() },
            )
        }),
        b'[' => LINK_AT.captures(rest).map(|caps| {
            let whole = caps.get(0).expect("match 0");
            (
                whole.end(),
                SemanticElement::Link {
                    text: caps[1].trim().to_string(),
                    target: caps[2].to_string(),
                },
            )
        }),
        _ => None,
    }
}

fn push_plain(text: &str, elements: &mut Vec<SemanticElement>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        elements.push(SemanticElement::Paragraph { text: trimmed.to_string() });
    }
}

/// Reduce inline markup to its text content, for contexts (headings, list
/// items) where the element already carries the structural meaning.
fn strip_inline_markup(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    text.trim().to_string()
}
