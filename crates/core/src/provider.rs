//! The provider contract
//!
//! Every synthesis back-end implements [`TtsProvider`]. Static capabilities
//! live in a [`ProviderDescriptor`]; per-request options are validated
//! against the descriptor's schema before they reach the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cancel::CancelToken;
use crate::error::{suggest, Result, TtsError};
use crate::format::AudioFormat;
use crate::request::TextRequest;
use crate::sink::AudioSink;

/// Identifiers for the built-in providers.
///
/// The declaration order is the fixed catalogue scan order used when
/// resolving a bare voice name; it is part of the dispatch contract and
/// must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Edge,
    OpenAi,
    ElevenLabs,
    Google,
    Local,
}

impl ProviderId {
    /// Fixed scan order for ambiguous voice resolution.
    pub const SCAN_ORDER: [ProviderId; 5] = [
        ProviderId::Edge,
        ProviderId::OpenAi,
        ProviderId::ElevenLabs,
        ProviderId::Google,
        ProviderId::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Edge => "edge",
            ProviderId::OpenAi => "openai",
            ProviderId::ElevenLabs => "elevenlabs",
            ProviderId::Google => "google",
            ProviderId::Local => "local",
        }
    }

    /// Resolve a short alias or legacy provider name.
    pub fn from_alias(alias: &str) -> Option<ProviderId> {
        match alias.to_ascii_lowercase().as_str() {
            "edge" | "edge_tts" => Some(ProviderId::Edge),
            "openai" | "openai_tts" => Some(ProviderId::OpenAi),
            "elevenlabs" | "eleven" => Some(ProviderId::ElevenLabs),
            "google" | "google_tts" => Some(ProviderId::Google),
            "local" | "chatterbox" | "coqui" => Some(ProviderId::Local),
            _ => None,
        }
    }

    /// Aliases accepted by [`ProviderId::from_alias`], for error messages.
    pub fn known_aliases() -> &'static [&'static str] {
        &["edge", "openai", "elevenlabs", "google", "local"]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema entry for one provider option.
#[derive(Debug, Clone, Copy)]
pub enum OptionSpec {
    Float { min: f64, max: f64, default: f64 },
    Int { min: i64, max: i64, default: i64 },
    Bool { default: bool },
    Choice { values: &'static [&'static str], default: &'static str },
    Text,
}

/// A validated option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

/// Validated, typed option map carried by a [`TextRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOptions(BTreeMap<String, OptionValue>);

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: OptionValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            OptionValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }
}

/// Static metadata describing a provider's capabilities.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub requires_network: bool,
    pub requires_api_key: bool,
    pub supported_formats: &'static [AudioFormat],
    pub supports_streaming: bool,
    pub supports_cloning: bool,
    pub supports_ssml: bool,
    /// Accepted `key=value` options and their schemas.
    pub options: &'static [(&'static str, OptionSpec)],
}

impl ProviderDescriptor {
    pub fn supports_format(&self, format: AudioFormat) -> bool {
        self.supported_formats.contains(&format)
    }

    fn option_spec(&self, key: &str) -> Option<&OptionSpec> {
        self.options
            .iter()
            .find_map(|(name, spec)| (*name == key).then_some(spec))
    }

    /// Validate a raw `key=value` map against this descriptor's schema.
    ///
    /// Unknown keys and out-of-range values are rejected with `BadOption`;
    /// the normalised, typed map is returned on success.
    pub fn validate_options(&self, raw: &BTreeMap<String, String>) -> Result<ProviderOptions> {
        let mut validated = ProviderOptions::new();
        let known: Vec<&str> = self.options.iter().map(|(name, _)| *name).collect();

        for (key, value) in raw {
            let spec = self.option_spec(key).ok_or_else(|| TtsError::BadOption {
                field: key.clone(),
                message: format!("unknown option for provider '{}'", self.id),
                suggestions: suggest(key, &known, 3),
            })?;

            let parsed = match spec {
                OptionSpec::Float { min, max, .. } => {
                    let v: f64 = value.parse().map_err(|_| bad_option(key, "expected a number"))?;
                    if v < *min || v > *max {
                        return Err(bad_option(
                            key,
                            &format!("value {v} outside range [{min}, {max}]"),
                        ));
                    }
                    OptionValue::Float(v)
                }
                OptionSpec::Int { min, max, .. } => {
                    let v: i64 = value.parse().map_err(|_| bad_option(key, "expected an integer"))?;
                    if v < *min || v > *max {
                        return Err(bad_option(
                            key,
                            &format!("value {v} outside range [{min}, {max}]"),
                        ));
                    }
                    OptionValue::Int(v)
                }
                OptionSpec::Bool { .. } => {
                    let v = match value.to_ascii_lowercase().as_str() {
                        "true" | "1" | "yes" => true,
                        "false" | "0" | "no" => false,
                        _ => return Err(bad_option(key, "expected true or false")),
                    };
                    OptionValue::Bool(v)
                }
                OptionSpec::Choice { values, .. } => {
                    if !values.contains(&value.as_str()) {
                        return Err(TtsError::BadOption {
                            field: key.clone(),
                            message: format!("expected one of: {}", values.join(", ")),
                            suggestions: suggest(value, values, 3),
                        });
                    }
                    OptionValue::Text(value.clone())
                }
                OptionSpec::Text => OptionValue::Text(value.clone()),
            };
            validated.insert(key.clone(), parsed);
        }
        Ok(validated)
    }
}

fn bad_option(field: &str, message: &str) -> TtsError {
    TtsError::BadOption {
        field: field.to_string(),
        message: message.to_string(),
        suggestions: Vec::new(),
    }
}

/// One entry of a provider's voice catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Provider-internal identifier (may equal the name)
    pub id: String,
    /// Human-facing voice name
    pub name: String,
    pub language: Option<String>,
    pub description: Option<String>,
}

impl VoiceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            language: None,
            description: None,
        }
    }
}

/// The synthesis back-end contract.
///
/// `synthesize` is the only side-effecting operation. When the request asks
/// for streaming and the descriptor advertises it, chunks must be written
/// to the sink in production order as soon as each is available; when not
/// streaming, a complete, valid audio container must exist at the sink path
/// before the call returns `Ok`.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Static capability descriptor.
    fn describe(&self) -> &'static ProviderDescriptor;

    /// Synthesize `request.text` into the sink, observing `cancel` at every
    /// suspension point.
    async fn synthesize(
        &self,
        request: &TextRequest,
        sink: AudioSink<'_>,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// The provider's live voice catalogue.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>>;

    /// Voices known without network access, used for offline dispatch.
    fn known_voices(&self) -> &'static [&'static str] {
        &[]
    }

    /// Validate raw `key=value` options against this provider's schema.
    fn validate_options(&self, raw: &BTreeMap<String, String>) -> Result<ProviderOptions> {
        self.describe().validate_options(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
        id: ProviderId::ElevenLabs,
        display_name: "Test",
        requires_network: true,
        requires_api_key: true,
        supported_formats: &[AudioFormat::Mp3],
        supports_streaming: true,
        supports_cloning: false,
        supports_ssml: false,
        options: &[
            ("stability", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.5 }),
            ("stream", OptionSpec::Bool { default: false }),
            ("model", OptionSpec::Choice { values: &["a", "b"], default: "a" }),
        ],
    };

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_scan_order_is_stable() {
        assert_eq!(
            ProviderId::SCAN_ORDER,
            [
                ProviderId::Edge,
                ProviderId::OpenAi,
                ProviderId::ElevenLabs,
                ProviderId::Google,
                ProviderId::Local,
            ]
        );
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(ProviderId::from_alias("edge_tts"), Some(ProviderId::Edge));
        assert_eq!(ProviderId::from_alias("ELEVENLABS"), Some(ProviderId::ElevenLabs));
        assert_eq!(ProviderId::from_alias("chatterbox"), Some(ProviderId::Local));
        assert_eq!(ProviderId::from_alias("unknown"), None);
    }

    #[test]
    fn test_validate_accepts_in_range_values() {
        let opts = TEST_DESCRIPTOR
            .validate_options(&raw(&[("stability", "0.7"), ("stream", "yes"), ("model", "b")]))
            .unwrap();
        assert_eq!(opts.get_f64("stability"), Some(0.7));
        assert_eq!(opts.get_bool("stream"), Some(true));
        assert_eq!(opts.get_str("model"), Some("b"));
    }

    #[test]
    fn test_validate_rejects_unknown_key() {
        let err = TEST_DESCRIPTOR
            .validate_options(&raw(&[("stabilty", "0.7")]))
            .unwrap_err();
        match err {
            TtsError::BadOption { field, suggestions, .. } => {
                assert_eq!(field, "stabilty");
                assert_eq!(suggestions.first().map(String::as_str), Some("stability"));
            }
            other => panic!("expected BadOption, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(TEST_DESCRIPTOR
            .validate_options(&raw(&[("stability", "1.5")]))
            .is_err());
        assert!(TEST_DESCRIPTOR
            .validate_options(&raw(&[("model", "z")]))
            .is_err());
    }
}
