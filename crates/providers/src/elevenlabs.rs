//! ElevenLabs speech provider
//!
//! Voice names resolve to opaque voice ids through a `/voices` catalogue
//! call cached for the process lifetime, with a table of well-known
//! default ids as the offline fallback. Streaming uses the dedicated
//! stream endpoint.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use tts_config::Settings;
use tts_core::{
    suggest, text::strip_ssml_tags, AudioFormat, AudioSink, CancelToken, OptionSpec,
    ProviderDescriptor, ProviderId, Result, TextRequest, TtsError, TtsProvider, VoiceInfo,
    VoiceRef,
};

use crate::http::{build_client, check_status, net_err, response_to_file, stream_response};

const KEY_HINT: &str = "elevenlabs_api_key";
const API_KEY_HEADER: &str = "xi-api-key";
const DEFAULT_VOICE: &str = "rachel";
const MODEL_ID: &str = "eleven_monolingual_v1";

/// Always-available premade voices.
pub static ELEVENLABS_KNOWN_VOICES: &[&str] = &[
    "rachel", "domi", "bella", "antoni", "elli", "josh", "arnold", "adam", "sam",
];

/// Well-known ids for the premade voices, used when the catalogue is
/// unreachable.
static DEFAULT_VOICE_IDS: &[(&str, &str)] = &[
    ("rachel", "21m00Tcm4TlvDq8ikWAM"),
    ("domi", "AZnzlk1XvdvUeBnXmlld"),
    ("bella", "EXAVITQu4vr4xnSDxMaL"),
    ("antoni", "ErXwobaYiN019PkySvjV"),
    ("elli", "MF3mGyEYCl7XYWbV9V6O"),
    ("josh", "TxGEqnHWrfWFMLpVQ3VQ"),
    ("arnold", "VR6AewLTigWG4xSOukaG"),
    ("adam", "pNInz6obpgDQGcFmaJgB"),
    ("sam", "yoZ06aMxZJJ28mfd3POQ"),
];

static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::ElevenLabs,
    display_name: "ElevenLabs",
    requires_network: true,
    requires_api_key: true,
    supported_formats: &[AudioFormat::Mp3],
    supports_streaming: true,
    supports_cloning: false,
    supports_ssml: false,
    options: &[
        ("stability", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.5 }),
        ("similarity_boost", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.5 }),
        ("style", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.0 }),
    ],
};

#[derive(Debug, Clone, Deserialize)]
struct CatalogueVoice {
    voice_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogueResponse {
    #[serde(default)]
    voices: Vec<CatalogueVoice>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub struct ElevenLabsProvider {
    settings: Arc<Settings>,
    client: reqwest::Client,
    catalogue: Mutex<Option<Vec<CatalogueVoice>>>,
}

impl ElevenLabsProvider {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
            catalogue: Mutex::new(None),
        })
    }

    fn api_key(&self) -> Result<String> {
        self.settings
            .api_key("elevenlabs")
            .ok_or_else(|| TtsError::Authentication {
                message: "ElevenLabs API key not configured".into(),
                hint: Some(KEY_HINT.into()),
            })
    }

    async fn catalogue(&self, api_key: &str) -> Vec<CatalogueVoice> {
        if let Some(cached) = self.catalogue.lock().as_ref() {
            return cached.clone();
        }

        let url = format!("{}/voices", self.settings.endpoints.elevenlabs);
        let fetched = async {
            let resp = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, api_key)
                .send()
                .await
                .map_err(|e| net_err("elevenlabs", e))?;
            let resp = check_status(resp, "elevenlabs", KEY_HINT).await?;
            resp.json::<CatalogueResponse>()
                .await
                .map_err(|e| net_err("elevenlabs", e))
        }
        .await;

        match fetched {
            Ok(body) => {
                let voices = body.voices;
                *self.catalogue.lock() = Some(voices.clone());
                voices
            }
            Err(e) => {
                warn!("could not fetch ElevenLabs voice catalogue: {e}");
                Vec::new()
            }
        }
    }

    async fn resolve_voice_id(&self, api_key: &str, name: &str) -> Result<String> {
        // A 32-hex string already is a voice id.
        if name.len() == 32 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(name.to_lowercase());
        }

        let catalogue = self.catalogue(api_key).await;
        if let Some(voice) = catalogue
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
        {
            return Ok(voice.voice_id.clone());
        }

        if let Some((_, id)) = DEFAULT_VOICE_IDS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
        {
            return Ok((*id).to_string());
        }

        let mut candidates: Vec<&str> = catalogue.iter().map(|v| v.name.as_str()).collect();
        candidates.extend(ELEVENLABS_KNOWN_VOICES.iter().copied());
        Err(TtsError::voice(
            format!("ElevenLabs voice '{name}' not found"),
            suggest(name, &candidates, 3),
        ))
    }

    fn voice_settings(&self, request: &TextRequest) -> VoiceSettings {
        // Contract: these are clamped, not rejected, so defaults coming
        // from config files can never fail a synthesis.
        VoiceSettings {
            stability: request.options.get_f64("stability").unwrap_or(0.5).clamp(0.0, 1.0),
            similarity_boost: request
                .options
                .get_f64("similarity_boost")
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
            style: request.options.get_f64("style").unwrap_or(0.0).clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
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

        let name = match &request.voice {
            VoiceRef::Default => DEFAULT_VOICE.to_string(),
            VoiceRef::Named { voice, .. } => voice.clone(),
            VoiceRef::CloneFrom(_) => {
                return Err(TtsError::voice(
                    "elevenlabs clone-from-file is not supported; use the local provider",
                    ELEVENLABS_KNOWN_VOICES.iter().map(|v| v.to_string()).collect(),
                ))
            }
        };
        let voice_id = self.resolve_voice_id(&api_key, &name).await?;
        cancel.check()?;

        let text = if request.is_ssml() {
            warn!("ElevenLabs does not support SSML, stripping markup");
            strip_ssml_tags(&request.text)
        } else {
            request.text.clone()
        };

        let body = SynthesisBody {
            text: &text,
            model_id: MODEL_ID,
            voice_settings: self.voice_settings(request),
        };

        let streaming = matches!(sink, AudioSink::Stream(_));
        let url = if streaming {
            format!(
                "{}/text-to-speech/{voice_id}/stream",
                self.settings.endpoints.elevenlabs
            )
        } else {
            format!(
                "{}/text-to-speech/{voice_id}",
                self.settings.endpoints.elevenlabs
            )
        };

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| net_err("elevenlabs", e))?;
        let resp = check_status(resp, "elevenlabs", KEY_HINT).await?;

        match sink {
            AudioSink::Stream(writer) => {
                stream_response(resp, writer, cancel, "elevenlabs").await?;
                Ok(())
            }
            AudioSink::File(path) => response_to_file(resp, &path, cancel, "elevenlabs").await,
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let api_key = self.api_key()?;
        let catalogue = self.catalogue(&api_key).await;
        if catalogue.is_empty() {
            return Ok(ELEVENLABS_KNOWN_VOICES.iter().copied().map(VoiceInfo::named).collect());
        }
        Ok(catalogue
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.voice_id,
                name: v.name,
                language: None,
                description: v.category,
            })
            .collect())
    }

    fn known_voices(&self) -> &'static [&'static str] {
        ELEVENLABS_KNOWN_VOICES
    }
}
