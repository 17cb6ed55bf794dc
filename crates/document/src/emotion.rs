//! Emotion classification and per-element prosody annotation
//!
//! In `auto` mode a fixed scoring function classifies the whole document
//! into one concrete profile; annotation then applies a small fixed table
//! of emphasis and pause values per element kind.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::element::{AnnotatedElement, EmotionProfile, SemanticElement};

static TECHNICAL_LEXICON: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "api",
        "function",
        "method",
        "class",
        "endpoint",
        "configuration",
        "implementation",
        "algorithm",
        "parameter",
        "variable",
        "debugging",
        "compilation",
        "runtime",
        "framework",
        "library",
        "protocol",
        "authentication",
        "authorization",
        "database",
        "query",
        "schema",
    ]
    .into_iter()
    .collect()
});

static MARKETING_LEXICON: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "best",
        "amazing",
        "revolutionary",
        "save",
        "boost",
        "transform",
        "incredible",
        "outstanding",
        "perfect",
        "ultimate",
        "premium",
        "exclusive",
        "limited",
        "offer",
        "deal",
        "discount",
        "free",
        "guarantee",
        "proven",
        "results",
        "benefits",
        "advantage",
    ]
    .into_iter()
    .collect()
});

static NARRATIVE_LEXICON: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "story",
        "journey",
        "experience",
        "adventure",
        "chapter",
        "character",
        "plot",
        "scene",
        "dialogue",
        "narrative",
        "tale",
        "memoir",
        "biography",
        "personal",
        "emotional",
        "feeling",
        "thought",
        "memory",
        "dream",
        "hope",
    ]
    .into_iter()
    .collect()
});

static TUTORIAL_LEXICON: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "step",
        "guide",
        "tutorial",
        "instructions",
        "follow",
        "how to",
        "procedure",
        "process",
        "walkthrough",
        "example",
        "demonstration",
        "practice",
        "exercise",
        "lesson",
        "learning",
        "first",
        "next",
        "then",
        "finally",
        "complete",
        "finish",
    ]
    .into_iter()
    .collect()
});

static TECHNICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b\w+\(\)",          // function calls
        r"\b[A-Z_]{3,}\b",     // constants
        r"https?://\S+",       // URLs
        r"\b\d+\.\d+\.\d+\b",  // version numbers
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static MARKETING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"!{2,}", r"\b\d+%\s+off\b", r"\$\d+", r"(?i)call.{0,10}action"]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
});

static NARRATIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r#""[^"]*""#, r"(?i)\bi\s+\w+", r"(?i)\bonce\s+upon", r"(?i)\bsuddenly\b"]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
});

static TUTORIAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)\bstep\s+\d+", r"\b\d+\.\s", r"(?i)\blet's\s+\w+", r"(?i)\bmake\s+sure"]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
});

/// Concrete profiles in tie-break order.
const TIE_ORDER: [EmotionProfile; 4] = [
    EmotionProfile::Technical,
    EmotionProfile::Marketing,
    EmotionProfile::Narrative,
    EmotionProfile::Tutorial,
];

/// Deterministic document-level classification.
///
/// Tallies lexicon hits, content patterns, and structural signals per
/// profile; the highest score wins, with ties (including the all-zero
/// case) resolved in the fixed order technical, marketing, narrative,
/// tutorial.
pub fn classify_document(elements: &[SemanticElement]) -> EmotionProfile {
    let full_text: String = elements
        .iter()
        .map(SemanticElement::text)
        .collect::<Vec<_>>()
        .join(" ");
    let lower = full_text.to_lowercase();

    let mut scores = [0usize; 4]; // technical, marketing, narrative, tutorial

    for element in elements {
        match element {
            SemanticElement::Code { .. } | SemanticElement::CodeBlock { .. } => scores[0] += 3,
            SemanticElement::Heading { text, .. } => {
                let heading = text.to_lowercase();
                if TUTORIAL_LEXICON.iter().any(|kw| heading.contains(kw)) {
                    scores[3] += 2;
                } else if MARKETING_LEXICON.iter().any(|kw| heading.contains(kw)) {
                    scores[1] += 2;
                } else if TECHNICAL_LEXICON.iter().any(|kw| heading.contains(kw)) {
                    scores[0] += 2;
                }
            }
            _ => {}
        }
    }

    let lexicons = [
        &*TECHNICAL_LEXICON,
        &*MARKETING_LEXICON,
        &*NARRATIVE_LEXICON,
        &*TUTORIAL_LEXICON,
    ];
    for (score, lexicon) in scores.iter_mut().zip(lexicons) {
        *score += lexicon.iter().filter(|kw| lower.contains(*kw)).count();
    }

    let patterns = [
        &*TECHNICAL_PATTERNS,
        &*MARKETING_PATTERNS,
        &*NARRATIVE_PATTERNS,
        &*TUTORIAL_PATTERNS,
    ];
    for (score, set) in scores.iter_mut().zip(patterns) {
        *score += set.iter().map(|re| re.find_iter(&full_text).count()).sum::<usize>();
    }

    let list_items = elements
        .iter()
        .filter(|e| matches!(e, SemanticElement::ListItem { .. }))
        .count();
    if list_items > 3 {
        scores[3] += 2;
    }
    scores[1] += full_text.matches('!').count();

    let mut winner = TIE_ORDER[0];
    let mut best = scores[0];
    for (profile, score) in TIE_ORDER.into_iter().zip(scores).skip(1) {
        if score > best {
            winner = profile;
            best = score;
        }
    }
    debug!(?scores, profile = winner.as_str(), "document classified");
    winner
}

struct ProfileTable {
    base_emphasis: f32,
    heading_emphasis: f32,
    heading_pitch_pct: i16,
    heading_pause_after_ms: u32,
    bold_emphasis: f32,
    bold_pitch_pct: i16,
    italic_emphasis: f32,
    code_pitch_pct: i16,
    code_pause_before_ms: u32,
    code_pause_after_ms: u32,
    list_pause_before_ms: u32,
    paragraph_pause_after_ms: u32,
}

static TECHNICAL_TABLE: ProfileTable = ProfileTable {
    base_emphasis: 0.4,
    heading_emphasis: 0.6,
    heading_pitch_pct: 2,
    heading_pause_after_ms: 1200,
    bold_emphasis: 0.6,
    bold_pitch_pct: 2,
    italic_emphasis: 0.3,
    code_pitch_pct: -4,
    code_pause_before_ms: 400,
    code_pause_after_ms: 1000,
    list_pause_before_ms: 300,
    paragraph_pause_after_ms: 250,
};

static MARKETING_TABLE: ProfileTable = ProfileTable {
    base_emphasis: 0.7,
    heading_emphasis: 1.0,
    heading_pitch_pct: 10,
    heading_pause_after_ms: 800,
    bold_emphasis: 0.9,
    bold_pitch_pct: 6,
    italic_emphasis: 0.5,
    code_pitch_pct: -2,
    code_pause_before_ms: 300,
    code_pause_after_ms: 800,
    list_pause_before_ms: 250,
    paragraph_pause_after_ms: 200,
};

static NARRATIVE_TABLE: ProfileTable = ProfileTable {
    base_emphasis: 0.6,
    heading_emphasis: 0.8,
    heading_pitch_pct: 5,
    heading_pause_after_ms: 1000,
    bold_emphasis: 0.8,
    bold_pitch_pct: 4,
    italic_emphasis: 0.4,
    code_pitch_pct: -4,
    code_pause_before_ms: 400,
    code_pause_after_ms: 1000,
    list_pause_before_ms: 300,
    paragraph_pause_after_ms: 300,
};

static TUTORIAL_TABLE: ProfileTable = ProfileTable {
    base_emphasis: 0.5,
    heading_emphasis: 0.75,
    heading_pitch_pct: 4,
    heading_pause_after_ms: 1000,
    bold_emphasis: 0.75,
    bold_pitch_pct: 3,
    italic_emphasis: 0.4,
    code_pitch_pct: -4,
    code_pause_before_ms: 400,
    code_pause_after_ms: 1000,
    list_pause_before_ms: 300,
    paragraph_pause_after_ms: 250,
};

fn table(profile: EmotionProfile) -> &'static ProfileTable {
    match profile {
        EmotionProfile::Technical => &TECHNICAL_TABLE,
        EmotionProfile::Marketing => &MARKETING_TABLE,
        EmotionProfile::Narrative => &NARRATIVE_TABLE,
        // Auto never reaches annotation; fall back to tutorial's table to
        // keep the function total.
        EmotionProfile::Tutorial | EmotionProfile::Auto => &TUTORIAL_TABLE,
    }
}

/// Annotate elements with the given profile, resolving `Auto` through
/// [`classify_document`] first.
pub fn annotate(elements: Vec<SemanticElement>, profile: EmotionProfile) -> Vec<AnnotatedElement> {
    let resolved = match profile {
        EmotionProfile::Auto => classify_document(&elements),
        explicit => explicit,
    };
    let t = table(resolved);

    elements
        .into_iter()
        .map(|element| {
            let (emphasis, pitch_pct, pause_before_ms, pause_after_ms) = match &element {
                SemanticElement::Heading { level, .. } => {
                    let pause = if *level == 1 {
                        t.heading_pause_after_ms
                    } else {
                        t.heading_pause_after_ms * 4 / 5
                    };
                    (t.heading_emphasis, t.heading_pitch_pct, 0, pause)
                }
                SemanticElement::Bold { .. } => (t.bold_emphasis, t.bold_pitch_pct, 0, 0),
                SemanticElement::Italic { .. } => (t.italic_emphasis, 0, 0, 0),
                SemanticElement::Code { .. } => (0.0, t.code_pitch_pct, 0, 0),
                SemanticElement::CodeBlock { .. } => {
                    (0.0, t.code_pitch_pct, t.code_pause_before_ms, t.code_pause_after_ms)
                }
                SemanticElement::ListItem { .. } => {
                    (t.base_emphasis, 0, t.list_pause_before_ms, 0)
                }
                SemanticElement::Link { .. } => (t.base_emphasis, 0, 0, 250),
                SemanticElement::Paragraph { .. } => (t.base_emphasis, 0, 0, 0),
                SemanticElement::Break => (0.0, 0, 0, t.paragraph_pause_after_ms * 2),
            };
            AnnotatedElement {
                element,
                profile: resolved,
                emphasis,
                pitch_pct,
                pause_before_ms,
                pause_after_ms,
            }
        })
        .collect()
}
