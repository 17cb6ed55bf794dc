//! OpenAI speech provider
//!
//! Single POST to the speech endpoint; the response body is chunked audio
//! piped straight through to the sink.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use tts_config::Settings;
use tts_core::{
    text::strip_ssml_tags, AudioFormat, AudioSink, CancelToken, OptionSpec, ProviderDescriptor,
    ProviderId, Result, TextRequest, TtsError, TtsProvider, VoiceInfo, VoiceRef,
};

use crate::http::{build_client, check_status, net_err, response_to_file, stream_response};

const KEY_HINT: &str = "openai_api_key";
const DEFAULT_VOICE: &str = "nova";
const DEFAULT_MODEL: &str = "tts-1";

/// The fixed voice allow-list.
pub static OPENAI_KNOWN_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::OpenAi,
    display_name: "OpenAI TTS",
    requires_network: true,
    requires_api_key: true,
    supported_formats: &[AudioFormat::Mp3, AudioFormat::Wav, AudioFormat::Flac],
    supports_streaming: true,
    supports_cloning: false,
    supports_ssml: false,
    options: &[(
        "model",
        OptionSpec::Choice {
            values: &["tts-1", "tts-1-hd"],
            default: DEFAULT_MODEL,
        },
    )],
};

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiProvider {
    settings: Arc<Settings>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self { settings, client })
    }

    fn api_key(&self) -> Result<String> {
        self.settings
            .api_key("openai")
            .ok_or_else(|| TtsError::Authentication {
                message: "OpenAI API key not configured".into(),
                hint: Some(KEY_HINT.into()),
            })
    }

    /// Unknown voices fall back to the default with a warning rather than
    /// failing the request.
    fn voice_name(&self, request: &TextRequest) -> Result<String> {
        match &request.voice {
            VoiceRef::Default => Ok(DEFAULT_VOICE.to_string()),
            VoiceRef::Named { voice, .. } => {
                if OPENAI_KNOWN_VOICES.contains(&voice.as_str()) {
                    Ok(voice.clone())
                } else {
                    warn!(voice, "unknown OpenAI voice, using '{DEFAULT_VOICE}'");
                    Ok(DEFAULT_VOICE.to_string())
                }
            }
            VoiceRef::CloneFrom(_) => Err(TtsError::voice(
                "openai does not support voice cloning; use the local provider",
                OPENAI_KNOWN_VOICES.iter().map(|v| v.to_string()).collect(),
            )),
        }
    }
}

#[async_trait]
impl TtsProvider for OpenAiProvider {
    fn describe(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    async fn synthesize(
        &self,
        request: &TextRequest,
        sink: AudioSink<'_>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        let api_key = self.api_key()?;
        let voice = self.voice_name(request)?;

        let input = if request.is_ssml() {
            warn!("OpenAI TTS does not support SSML, stripping markup");
            strip_ssml_tags(&request.text)
        } else {
            request.text.clone()
        };

        if !DESCRIPTOR.supports_format(request.format) {
            return Err(TtsError::Format(format!(
                "openai cannot produce {}",
                request.format
            )));
        }

        let model = request.options.get_str("model").unwrap_or(DEFAULT_MODEL);
        let body = SpeechBody {
            model,
            voice: &voice,
            input: &input,
            response_format: request.format.extension(),
        };

        let url = format!("{}/audio/speech", self.settings.endpoints.openai);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| net_err("openai", e))?;
        let resp = check_status(resp, "openai", KEY_HINT).await?;

        match sink {
            AudioSink::Stream(writer) => {
                stream_response(resp, writer, cancel, "openai").await?;
                Ok(())
            }
            AudioSink::File(path) => response_to_file(resp, &path, cancel, "openai").await,
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(OPENAI_KNOWN_VOICES.iter().copied().map(VoiceInfo::named).collect())
    }

    fn known_voices(&self) -> &'static [&'static str] {
        OPENAI_KNOWN_VOICES
    }
}
