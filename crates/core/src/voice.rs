//! Voice references and their string syntax.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::provider::ProviderId;

/// Extensions accepted as reference audio for voice cloning.
pub const CLONE_AUDIO_EXTENSIONS: [&str; 4] = ["wav", "mp3", "flac", "ogg"];

/// A reference to a voice, parsed from user input.
///
/// String syntax: `"<provider>:<voice>"`, a bare `"<voice>"` (provider
/// resolved by the registry's catalogue scan), or a filesystem path to a
/// reference audio sample (implies cloning on the local provider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceRef {
    /// Use the provider's configured default voice.
    Default,
    /// A named voice, optionally pinned to a provider.
    Named {
        provider: Option<ProviderId>,
        voice: String,
    },
    /// Clone from a reference audio sample. Only valid on providers that
    /// advertise the cloning capability.
    CloneFrom(PathBuf),
}

impl VoiceRef {
    /// Whether `path` looks like clone reference audio: readable file with
    /// one of the supported audio extensions.
    pub fn is_clone_path(path: &Path) -> bool {
        let has_audio_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                CLONE_AUDIO_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        has_audio_ext && path.is_file()
    }

    /// Syntactic parse of a voice spec. Does not consult any catalogue:
    /// a bare name comes back as `Named { provider: None, .. }` for the
    /// registry to resolve.
    ///
    /// A spec containing `:` with an unknown prefix is returned as
    /// `Named { provider: None, voice: spec }` so the registry can produce
    /// the `VoiceError` with suggestions; splitting is total here.
    pub fn parse_spec(spec: &str) -> VoiceRef {
        let spec = spec.trim();
        if spec.is_empty() {
            return VoiceRef::Default;
        }
        if let Some((prefix, rest)) = spec.split_once(':') {
            if let Some(provider) = ProviderId::from_alias(prefix) {
                return VoiceRef::Named {
                    provider: Some(provider),
                    voice: rest.to_string(),
                };
            }
        }
        let as_path = Path::new(spec);
        if Self::is_clone_path(as_path) {
            return VoiceRef::CloneFrom(as_path.to_path_buf());
        }
        VoiceRef::Named {
            provider: None,
            voice: spec.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_provider_qualified() {
        assert_eq!(
            VoiceRef::parse_spec("edge:en-GB-SoniaNeural"),
            VoiceRef::Named {
                provider: Some(ProviderId::Edge),
                voice: "en-GB-SoniaNeural".into()
            }
        );
        assert_eq!(
            VoiceRef::parse_spec("openai:nova"),
            VoiceRef::Named {
                provider: Some(ProviderId::OpenAi),
                voice: "nova".into()
            }
        );
    }

    #[test]
    fn test_parse_bare_name() {
        assert_eq!(
            VoiceRef::parse_spec("nova"),
            VoiceRef::Named {
                provider: None,
                voice: "nova".into()
            }
        );
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(VoiceRef::parse_spec(""), VoiceRef::Default);
        assert_eq!(VoiceRef::parse_spec("   "), VoiceRef::Default);
    }

    #[test]
    fn test_parse_clone_path() {
        let dir = std::env::temp_dir();
        let path = dir.join("voice_ref_parse_test.wav");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"RIFF").unwrap();

        let parsed = VoiceRef::parse_spec(path.to_str().unwrap());
        assert_eq!(parsed, VoiceRef::CloneFrom(path.clone()));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_clone() {
        let parsed = VoiceRef::parse_spec("/definitely/not/here.wav");
        assert!(matches!(parsed, VoiceRef::Named { provider: None, .. }));
    }

    #[test]
    fn test_parse_is_deterministic() {
        for spec in ["edge:x", "nova", "", "weird:thing", "a b c"] {
            assert_eq!(VoiceRef::parse_spec(spec), VoiceRef::parse_spec(spec));
        }
    }
}
