//! Synthesis request and prosody adjustment types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::TtsError;
use crate::format::AudioFormat;
use crate::provider::ProviderOptions;
use crate::voice::VoiceRef;

/// Speaking-rate delta as a percentage from the voice baseline.
///
/// Valid range is −50% to +200%; `None` means unset, which providers must
/// omit rather than send a zero adjustment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateAdjust(Option<i16>);

impl RateAdjust {
    pub const MIN: i16 = -50;
    pub const MAX: i16 = 200;

    pub fn new(percent: i16) -> Result<Self, TtsError> {
        if !(Self::MIN..=Self::MAX).contains(&percent) {
            return Err(TtsError::BadOption {
                field: "rate".into(),
                message: format!(
                    "rate {percent}% outside range [{}%, +{}%]",
                    Self::MIN,
                    Self::MAX
                ),
                suggestions: Vec::new(),
            });
        }
        Ok(Self(Some(percent)))
    }

    pub fn unset() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<i16> {
        self.0
    }

    /// Render in the edge service's signed-percent syntax, e.g. `+20%`.
    pub fn render(&self) -> Option<String> {
        self.0.map(|v| format!("{v:+}%"))
    }
}

impl FromStr for RateAdjust {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%');
        if trimmed.is_empty() {
            return Ok(Self::unset());
        }
        let value: i16 = trimmed.parse().map_err(|_| TtsError::BadOption {
            field: "rate".into(),
            message: format!("could not parse rate '{s}', expected e.g. +20% or -10"),
            suggestions: Vec::new(),
        })?;
        Self::new(value)
    }
}

/// Pitch delta in Hz from the voice baseline, valid −50 Hz to +50 Hz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchAdjust(Option<i16>);

impl PitchAdjust {
    pub const MIN: i16 = -50;
    pub const MAX: i16 = 50;

    pub fn new(hz: i16) -> Result<Self, TtsError> {
        if !(Self::MIN..=Self::MAX).contains(&hz) {
            return Err(TtsError::BadOption {
                field: "pitch".into(),
                message: format!(
                    "pitch {hz}Hz outside range [{}Hz, +{}Hz]",
                    Self::MIN,
                    Self::MAX
                ),
                suggestions: Vec::new(),
            });
        }
        Ok(Self(Some(hz)))
    }

    pub fn unset() -> Self {
        Self(None)
    }

    pub fn value(&self) -> Option<i16> {
        self.0
    }

    /// Render in the edge service's signed-Hz syntax, e.g. `-5Hz`.
    pub fn render(&self) -> Option<String> {
        self.0.map(|v| format!("{v:+}Hz"))
    }
}

impl FromStr for PitchAdjust {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_suffix("Hz")
            .or_else(|| trimmed.strip_suffix("hz"))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::unset());
        }
        let value: i16 = trimmed.parse().map_err(|_| TtsError::BadOption {
            field: "pitch".into(),
            message: format!("could not parse pitch '{s}', expected e.g. +5Hz or -10"),
            suggestions: Vec::new(),
        })?;
        Self::new(value)
    }
}

/// An immutable synthesis request, consumed by exactly one provider call.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub text: String,
    pub voice: VoiceRef,
    pub rate: RateAdjust,
    pub pitch: PitchAdjust,
    pub format: AudioFormat,
    pub stream: bool,
    pub options: ProviderOptions,
}

impl TextRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: VoiceRef::Default,
            rate: RateAdjust::unset(),
            pitch: PitchAdjust::unset(),
            format: AudioFormat::default(),
            stream: true,
            options: ProviderOptions::new(),
        }
    }

    /// Whether the text is already speech markup (starts with `<speak`,
    /// whitespace-insensitive).
    pub fn is_ssml(&self) -> bool {
        self.text.trim_start().to_ascii_lowercase().starts_with("<speak")
    }
}
