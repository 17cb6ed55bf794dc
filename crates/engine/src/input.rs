//! Text input helpers for callers of the engine.
//!
//! Two conveniences the CLI layer relies on: reading piped text from
//! standard input, and the JSON envelope form `{"text": ..., "voice": ...}`
//! that lets one pipeline stage hand parameters to the next.

use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use tts_core::{Result, TtsError};

/// Parameters carried by a JSON input envelope.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InputParams {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub rate: Option<String>,
    #[serde(default)]
    pub pitch: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    text: String,
    #[serde(flatten)]
    params: InputParams,
}

/// Parse input as a JSON envelope or plain text.
///
/// Input whose first non-space byte is `{` and that parses as an object
/// with a string `text` field yields the text plus the remaining
/// parameters; everything else passes through as plain text.
pub fn parse_input(input: &str) -> (String, InputParams) {
    if input.trim_start().starts_with('{') {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(input) {
            return (envelope.text, envelope.params);
        }
    }
    (input.to_string(), InputParams::default())
}

/// Read all of standard input as text. Empty input is an error; callers
/// show usage instead of synthesising silence.
pub async fn read_stdin_text() -> Result<String> {
    let mut buffer = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buffer)
        .await
        .map_err(|e| TtsError::Internal(format!("could not read stdin: {e}")))?;
    let text = buffer.trim().to_string();
    if text.is_empty() {
        return Err(TtsError::BadOption {
            field: "text".into(),
            message: "no text provided on stdin".into(),
            suggestions: Vec::new(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        let (text, params) = parse_input("Hello world");
        assert_eq!(text, "Hello world");
        assert_eq!(params, InputParams::default());
    }

    #[test]
    fn test_envelope_extracts_text_and_params() {
        let (text, params) =
            parse_input(r#"{"text": "Hi", "voice": "openai:nova", "format": "wav"}"#);
        assert_eq!(text, "Hi");
        assert_eq!(params.voice.as_deref(), Some("openai:nova"));
        assert_eq!(params.format.as_deref(), Some("wav"));
        assert_eq!(params.output_path, None);
    }

    #[test]
    fn test_malformed_json_is_plain_text() {
        let (text, params) = parse_input("{not json");
        assert_eq!(text, "{not json");
        assert_eq!(params, InputParams::default());
    }

    #[test]
    fn test_json_without_text_field_is_plain() {
        let input = r#"{"voice": "nova"}"#;
        let (text, params) = parse_input(input);
        assert_eq!(text, input);
        assert_eq!(params, InputParams::default());
    }
}
