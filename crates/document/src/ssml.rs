//! Speech markup emission
//!
//! Renders annotated elements either as plain concatenated text or as a
//! single well-formed `<speak>` document in a platform dialect: prosody
//! rate and pitch, emphasis, breaks, and say-as for dates and version
//! strings. All platform differences live here; upstream components never
//! branch on the target platform.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use std::str::FromStr;

use tts_core::TtsError;

use crate::element::{AnnotatedElement, EmotionProfile, SemanticElement};

/// Target speech markup dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SsmlPlatform {
    Azure,
    Google,
    Amazon,
    /// No markup: plain concatenated text.
    #[default]
    Generic,
}

impl SsmlPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SsmlPlatform::Azure => "azure",
            SsmlPlatform::Google => "google",
            SsmlPlatform::Amazon => "amazon",
            SsmlPlatform::Generic => "generic",
        }
    }
}

impl FromStr for SsmlPlatform {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(SsmlPlatform::Azure),
            "google" => Ok(SsmlPlatform::Google),
            "amazon" => Ok(SsmlPlatform::Amazon),
            "generic" => Ok(SsmlPlatform::Generic),
            other => Err(TtsError::BadOption {
                field: "ssml_platform".into(),
                message: format!("unknown platform '{other}'"),
                suggestions: tts_core::suggest(
                    other,
                    &["azure", "google", "amazon", "generic"],
                    3,
                ),
            }),
        }
    }
}

/// Render annotated elements for the given platform.
///
/// `Generic` yields the plain text concatenation; the other platforms
/// yield one well-formed `<speak>` document whose stripped text content
/// equals the element text concatenation up to whitespace normalisation.
pub fn emit(elements: &[AnnotatedElement], platform: SsmlPlatform) -> String {
    match platform {
        SsmlPlatform::Generic => emit_plain(elements),
        _ => emit_ssml(elements, platform),
    }
}

fn emit_plain(elements: &[AnnotatedElement]) -> String {
    let mut parts = Vec::new();
    for annotated in elements {
        let text = annotated.element.text();
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n")
}

fn emit_ssml(elements: &[AnnotatedElement], platform: SsmlPlatform) -> String {
    let mut out = String::new();
    match platform {
        SsmlPlatform::Azure => out.push_str(
            "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" \
             xmlns:mstts=\"https://www.w3.org/2001/mstts\" xml:lang=\"en-US\">",
        ),
        _ => out.push_str("<speak>"),
    }
    out.push('\n');

    for annotated in elements {
        if annotated.pause_before_ms > 0 {
            let _ = writeln!(out, "<break time=\"{}ms\"/>", annotated.pause_before_ms);
        }
        let body = render_element(annotated, platform);
        if !body.is_empty() {
            out.push_str(&body);
            out.push('\n');
        }
        if annotated.pause_after_ms > 0 {
            let _ = writeln!(out, "<break time=\"{}ms\"/>", annotated.pause_after_ms);
        }
    }

    out.push_str("</speak>");
    out
}

fn render_element(annotated: &AnnotatedElement, platform: SsmlPlatform) -> String {
    let text = escape_xml(annotated.element.text());
    if text.is_empty() {
        return String::new();
    }

    match &annotated.element {
        SemanticElement::Heading { .. } => {
            let body = wrap_prosody(
                &wrap_emphasis(&apply_say_as(&text), annotated.emphasis),
                Some("95%"),
                annotated.pitch_pct,
            );
            match platform {
                SsmlPlatform::Azure => format!(
                    "<mstts:express-as style=\"{}\">{}</mstts:express-as>",
                    azure_style(annotated.profile),
                    body
                ),
                SsmlPlatform::Amazon if annotated.profile == EmotionProfile::Marketing => {
                    format!(
                        "<amazon:emotion name=\"excited\" intensity=\"medium\">{body}</amazon:emotion>"
                    )
                }
                _ => body,
            }
        }
        SemanticElement::Code { .. } | SemanticElement::CodeBlock { .. } => {
            // Monotone delivery: slow, flat, no emphasis, read verbatim.
            wrap_prosody(&text, Some("slow"), annotated.pitch_pct)
        }
        SemanticElement::Bold { .. } | SemanticElement::Italic { .. } => wrap_prosody(
            &wrap_emphasis(&apply_say_as(&text), annotated.emphasis),
            None,
            annotated.pitch_pct,
        ),
        SemanticElement::Link { .. }
        | SemanticElement::ListItem { .. }
        | SemanticElement::Paragraph { .. } => apply_say_as(&text),
        SemanticElement::Break => String::new(),
    }
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("static regex"));
static VERSION_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+){2,}\b").expect("static regex"));

/// Wrap number runs that synthesizers garble: ISO dates are read as dates,
/// dotted version strings are spelled out character by character. Plain
/// decimals are left alone.
fn apply_say_as(text: &str) -> String {
    let text = ISO_DATE.replace_all(
        text,
        "<say-as interpret-as=\"date\" format=\"ymd\">${0}</say-as>",
    );
    VERSION_STRING
        .replace_all(&text, "<say-as interpret-as=\"characters\">${0}</say-as>")
        .into_owned()
}

fn wrap_prosody(text: &str, rate: Option<&str>, pitch_pct: i16) -> String {
    let mut attrs = String::new();
    if let Some(rate) = rate {
        let _ = write!(attrs, " rate=\"{rate}\"");
    }
    if pitch_pct != 0 {
        let _ = write!(attrs, " pitch=\"{pitch_pct:+}%\"");
    }
    if attrs.is_empty() {
        return text.to_string();
    }
    format!("<prosody{attrs}>{text}</prosody>")
}

fn wrap_emphasis(text: &str, emphasis: f32) -> String {
    let level = if emphasis >= 0.7 {
        "strong"
    } else if emphasis >= 0.4 {
        "moderate"
    } else {
        "reduced"
    };
    format!("<emphasis level=\"{level}\">{text}</emphasis>")
}

fn azure_style(profile: EmotionProfile) -> &'static str {
    match profile {
        EmotionProfile::Technical => "newscast",
        EmotionProfile::Marketing => "excited",
        EmotionProfile::Narrative => "narration-professional",
        EmotionProfile::Tutorial | EmotionProfile::Auto => "friendly",
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::annotate;
    use crate::parser::parse_markdown;
    use tts_core::text::{normalize_whitespace, strip_ssml_tags};

    fn annotated(markdown: &str) -> Vec<AnnotatedElement> {
        annotate(parse_markdown(markdown), EmotionProfile::Technical)
    }

    #[test]
    fn test_generic_is_plain_text() {
        let out = emit(&annotated("# Intro\n\nHello **world**"), SsmlPlatform::Generic);
        assert!(!out.contains('<'));
        assert_eq!(normalize_whitespace(&out), "Intro Hello world");
    }

    #[test]
    fn test_azure_document_shape() {
        let out = emit(&annotated("# Intro\n\nHello **world**"), SsmlPlatform::Azure);
        assert!(out.starts_with("<speak "));
        assert!(out.ends_with("</speak>"));
        assert!(out.contains("xmlns:mstts"));
        assert!(out.contains("<mstts:express-as"));
        assert!(out.contains("<emphasis"));
        assert_eq!(out.matches("<speak").count(), 1);
    }

    #[test]
    fn test_google_has_no_azure_namespace() {
        let out = emit(&annotated("# Intro\n\nHello"), SsmlPlatform::Google);
        assert!(out.starts_with("<speak>"));
        assert!(!out.contains("mstts"));
        assert!(out.contains("<prosody"));
    }

    #[test]
    fn test_amazon_marketing_heading_uses_emotion() {
        let elements = annotate(parse_markdown("# Wow"), EmotionProfile::Marketing);
        let out = emit(&elements, SsmlPlatform::Amazon);
        assert!(out.contains("amazon:emotion"));
    }

    #[test]
    fn test_breaks_are_emitted_for_pauses() {
        let out = emit(&annotated("# Intro\n\nBody"), SsmlPlatform::Google);
        assert!(out.contains("<break time=\""));
    }

    #[test]
    fn test_code_is_monotone_and_lowered() {
        let out = emit(&annotated("Use `cargo build` here"), SsmlPlatform::Azure);
        assert!(out.contains("<prosody rate=\"slow\" pitch=\"-4%\">cargo build</prosody>"));
    }

    #[test]
    fn test_heading_carries_pitch() {
        let out = emit(&annotated("# Intro"), SsmlPlatform::Google);
        assert!(out.contains("pitch=\"+2%\""));
        // Plain paragraphs stay at the baseline, no prosody wrapper.
        let body = emit(&annotated("just prose"), SsmlPlatform::Google);
        assert!(!body.contains("pitch="));
    }

    #[test]
    fn test_version_strings_are_spelled_out() {
        let out = emit(&annotated("Install release 1.2.3 today"), SsmlPlatform::Google);
        assert!(out.contains("<say-as interpret-as=\"characters\">1.2.3</say-as>"));
        // Plain decimals are not versions.
        let out = emit(&annotated("pi is 3.14 roughly"), SsmlPlatform::Google);
        assert!(!out.contains("say-as"));
        // Generic output carries no markup at all.
        let plain = emit(&annotated("Install release 1.2.3 today"), SsmlPlatform::Generic);
        assert!(!plain.contains('<'));
    }

    #[test]
    fn test_dates_are_read_as_dates() {
        let out = emit(&annotated("Shipped on 2024-03-15 quietly"), SsmlPlatform::Azure);
        assert!(out.contains("<say-as interpret-as=\"date\" format=\"ymd\">2024-03-15</say-as>"));
    }

    #[test]
    fn test_xml_escaping() {
        let out = emit(&annotated("a < b & c > d"), SsmlPlatform::Google);
        assert!(out.contains("&lt;"));
        assert!(out.contains("&amp;"));
        assert!(!out.contains("a < b"));
    }

    #[test]
    fn test_round_trip_text_content() {
        let markdown = "# Title\n\nVersion 1.2.3 shipped 2024-03-15 with **world** and `code`\n\n- item one\n- item two\n\n```\nlet x = 1;\n```";
        let elements = annotated(markdown);
        let expected: String = normalize_whitespace(
            &elements
                .iter()
                .map(|a| a.element.text())
                .collect::<Vec<_>>()
                .join(" "),
        );
        for platform in [
            SsmlPlatform::Azure,
            SsmlPlatform::Google,
            SsmlPlatform::Amazon,
            SsmlPlatform::Generic,
        ] {
            let out = emit(&elements, platform);
            let stripped = normalize_whitespace(&strip_ssml_tags(&out));
            assert_eq!(stripped, expected, "platform {platform:?}");
        }
    }
}
