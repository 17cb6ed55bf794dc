//! Semantic elements and their emotion annotations.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use tts_core::TtsError;

/// A typed fragment of document structure, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticElement {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    Bold { text: String },
    Italic { text: String },
    Code { text: String },
    CodeBlock { text: String },
    ListItem { text: String },
    Link { text: String, target: String },
    Break,
}

impl SemanticElement {
    /// The spoken text content; empty for breaks.
    pub fn text(&self) -> &str {
        match self {
            SemanticElement::Heading { text, .. }
            | SemanticElement::Paragraph { text }
            | SemanticElement::Bold { text }
            | SemanticElement::Italic { text }
            | SemanticElement::Code { text }
            | SemanticElement::CodeBlock { text }
            | SemanticElement::ListItem { text }
            | SemanticElement::Link { text, .. } => text,
            SemanticElement::Break => "",
        }
    }
}

/// Document-level prosody preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmotionProfile {
    /// Classify the document and pick one of the concrete profiles.
    #[default]
    Auto,
    Technical,
    Marketing,
    Narrative,
    Tutorial,
}

impl EmotionProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionProfile::Auto => "auto",
            EmotionProfile::Technical => "technical",
            EmotionProfile::Marketing => "marketing",
            EmotionProfile::Narrative => "narrative",
            EmotionProfile::Tutorial => "tutorial",
        }
    }
}

impl FromStr for EmotionProfile {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EmotionProfile::Auto),
            "technical" => Ok(EmotionProfile::Technical),
            "marketing" => Ok(EmotionProfile::Marketing),
            "narrative" => Ok(EmotionProfile::Narrative),
            "tutorial" => Ok(EmotionProfile::Tutorial),
            other => Err(TtsError::BadOption {
                field: "emotion_profile".into(),
                message: format!("unknown profile '{other}'"),
                suggestions: tts_core::suggest(
                    other,
                    &["auto", "technical", "marketing", "narrative", "tutorial"],
                    3,
                ),
            }),
        }
    }
}

/// A semantic element plus its prosody annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedElement {
    pub element: SemanticElement,
    /// The resolved (never `Auto`) profile this document was annotated with.
    pub profile: EmotionProfile,
    /// Emphasis strength in 0..=1; 0 means neutral/monotone.
    pub emphasis: f32,
    /// Pitch delta from the voice baseline in percent; 0 means omitted.
    pub pitch_pct: i16,
    pub pause_before_ms: u32,
    pub pause_after_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content() {
        let heading = SemanticElement::Heading { level: 1, text: "Intro".into() };
        assert_eq!(heading.text(), "Intro");
        assert_eq!(SemanticElement::Break.text(), "");
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("technical".parse::<EmotionProfile>().unwrap(), EmotionProfile::Technical);
        assert_eq!("AUTO".parse::<EmotionProfile>().unwrap(), EmotionProfile::Auto);
        assert!("dramatic".parse::<EmotionProfile>().is_err());
    }

    #[test]
    fn test_element_serde_round_trip() {
        let elements = vec![
            SemanticElement::Heading { level: 2, text: "Title".into() },
            SemanticElement::Link { text: "here".into(), target: "https://example.com".into() },
            SemanticElement::Break,
        ];
        let json = serde_json::to_string(&elements).unwrap();
        let back: Vec<SemanticElement> = serde_json::from_str(&json).unwrap();
        assert_eq!(elements, back);
    }
}
