//! Google Cloud speech provider
//!
//! Request/response API, non-streaming: the response carries base64 audio
//! which is decoded and written out. Two auth paths: an API key as a query
//! parameter, or a service account whose JWT assertion is exchanged for an
//! OAuth token once per handle lifetime (cached until expiry with a five
//! minute skew). The service account wins when both are configured.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use tts_config::Settings;
use tts_core::{
    AudioFormat, AudioSink, CancelToken, OptionSpec, ProviderDescriptor, ProviderId, Result,
    TextRequest, TtsError, TtsProvider, VoiceInfo, VoiceRef,
};

use crate::http::{build_client, bytes_to_file, check_status, net_err};

const KEY_HINT: &str = "google_api_key";
const DEFAULT_VOICE: &str = "en-US-Neural2-A";
const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_SKEW: Duration = Duration::from_secs(300);

/// Representative voices known without a catalogue fetch.
pub static GOOGLE_KNOWN_VOICES: &[&str] = &[
    "en-US-Neural2-A",
    "en-US-Neural2-C",
    "en-US-Neural2-D",
    "en-US-Neural2-F",
    "en-GB-Neural2-A",
    "en-GB-Neural2-B",
    "en-AU-Neural2-A",
];

static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Google,
    display_name: "Google Cloud TTS",
    requires_network: true,
    requires_api_key: true,
    supported_formats: &[AudioFormat::Mp3, AudioFormat::Wav, AudioFormat::Ogg],
    supports_streaming: false,
    supports_cloning: false,
    supports_ssml: true,
    options: &[
        ("speaking_rate", OptionSpec::Float { min: 0.25, max: 4.0, default: 1.0 }),
        ("pitch", OptionSpec::Float { min: -20.0, max: 20.0, default: 0.0 }),
    ],
};

enum Auth {
    ApiKey(String),
    Bearer(String),
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

pub struct GoogleProvider {
    settings: Arc<Settings>,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleProvider {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
            token: Mutex::new(None),
        })
    }

    async fn auth(&self) -> Result<Auth> {
        if let Some(path) = &self.settings.keys.google_service_account {
            let token = self.service_account_token(path).await?;
            return Ok(Auth::Bearer(token));
        }
        if let Some(key) = self.settings.api_key("google") {
            return Ok(Auth::ApiKey(key));
        }
        Err(TtsError::Authentication {
            message: "Google credentials not configured".into(),
            hint: Some(KEY_HINT.into()),
        })
    }

    /// Exchange a service-account JWT assertion for an access token, reusing
    /// the cached token until five minutes before expiry.
    async fn service_account_token(&self, key_path: &Path) -> Result<String> {
        if let Some(cached) = self.token.lock().as_ref() {
            if cached.expires_at.saturating_duration_since(Instant::now()) > TOKEN_SKEW {
                return Ok(cached.token.clone());
            }
        }

        let raw = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            TtsError::Authentication {
                message: format!("could not read service account file: {e}"),
                hint: Some("google_service_account".into()),
            }
        })?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).map_err(|e| TtsError::Authentication {
                message: format!("malformed service account file: {e}"),
                hint: Some("google_service_account".into()),
            })?;

        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            iss: &key.client_email,
            scope: TOKEN_SCOPE,
            aud: &self.settings.endpoints.google_token,
            iat: now,
            exp: now + 3600,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            TtsError::Authentication {
                message: format!("invalid service account private key: {e}"),
                hint: Some("google_service_account".into()),
            }
        })?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| TtsError::Authentication {
                message: format!("could not sign token assertion: {e}"),
                hint: Some("google_service_account".into()),
            })?;

        let resp = self
            .client
            .post(&self.settings.endpoints.google_token)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| net_err("google", e))?;
        let resp = check_status(resp, "google", "google_service_account").await?;
        let body: TokenResponse = resp.json().await.map_err(|e| net_err("google", e))?;

        debug!("service account token refreshed");
        *self.token.lock() = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(body.access_token)
    }

    fn voice_name(&self, request: &TextRequest) -> Result<String> {
        match &request.voice {
            VoiceRef::Default => Ok(DEFAULT_VOICE.to_string()),
            VoiceRef::Named { voice, .. } => Ok(voice.clone()),
            VoiceRef::CloneFrom(_) => Err(TtsError::voice(
                "google does not support voice cloning; use the local provider",
                GOOGLE_KNOWN_VOICES.iter().map(|v| v.to_string()).collect(),
            )),
        }
    }
}

/// `en-US-Neural2-A` carries its language code in the first two segments.
fn language_code(voice: &str) -> String {
    let mut parts = voice.split('-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) if !lang.is_empty() && !region.is_empty() => {
            format!("{lang}-{region}")
        }
        _ => {
            warn!(voice, "could not parse language from voice, using en-US");
            "en-US".to_string()
        }
    }
}

fn audio_encoding(format: AudioFormat) -> Result<&'static str> {
    match format {
        AudioFormat::Mp3 => Ok("MP3"),
        AudioFormat::Wav => Ok("LINEAR16"),
        AudioFormat::Ogg => Ok("OGG_OPUS"),
        AudioFormat::Flac => Err(TtsError::Format("google cannot produce flac".into())),
    }
}

#[async_trait]
impl TtsProvider for GoogleProvider {
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
        let voice = self.voice_name(request)?;
        let encoding = audio_encoding(request.format)?;
        let auth = self.auth().await?;
        cancel.check()?;

        // Rate arrives as a percent delta; the API wants a multiplier.
        let speaking_rate = request
            .options
            .get_f64("speaking_rate")
            .or_else(|| request.rate.value().map(|pct| 1.0 + f64::from(pct) / 100.0))
            .map(|v| v.clamp(0.25, 4.0));
        // Pitch arrives in Hz (±50); the API wants semitones (±20).
        let pitch = request
            .options
            .get_f64("pitch")
            .or_else(|| request.pitch.value().map(|hz| f64::from(hz) * 20.0 / 50.0))
            .map(|v| v.clamp(-20.0, 20.0));

        let input = if request.is_ssml() {
            json!({ "ssml": request.text })
        } else {
            json!({ "text": request.text })
        };
        let mut audio_config = json!({ "audioEncoding": encoding });
        if let Some(rate) = speaking_rate {
            audio_config["speakingRate"] = json!(rate);
        }
        if let Some(pitch) = pitch {
            audio_config["pitch"] = json!(pitch);
        }
        let body = json!({
            "input": input,
            "voice": { "languageCode": language_code(&voice), "name": voice },
            "audioConfig": audio_config,
        });

        let url = format!("{}/text:synthesize", self.settings.endpoints.google);
        let mut builder = self.client.post(&url).json(&body);
        builder = match &auth {
            Auth::ApiKey(key) => builder.query(&[("key", key)]),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            resp = builder.send() => resp.map_err(|e| net_err("google", e))?,
        };
        let resp = check_status(resp, "google", KEY_HINT).await?;
        let body: SynthesizeResponse = resp.json().await.map_err(|e| net_err("google", e))?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(body.audio_content.as_bytes())
            .map_err(|e| TtsError::provider(format!("google: undecodable audio content: {e}")))?;
        cancel.check()?;

        match sink {
            AudioSink::File(path) => bytes_to_file(&audio, &path).await,
            AudioSink::Stream(writer) => {
                // Non-streaming API; the whole payload is one chunk.
                writer.write_chunk(&audio).await
            }
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let auth = self.auth().await?;
        let url = format!("{}/voices", self.settings.endpoints.google);
        let mut builder = self.client.get(&url);
        builder = match &auth {
            Auth::ApiKey(key) => builder.query(&[("key", key)]),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };
        let resp = builder.send().await.map_err(|e| net_err("google", e))?;
        let resp = check_status(resp, "google", KEY_HINT).await?;

        #[derive(Deserialize)]
        struct VoicesResponse {
            #[serde(default)]
            voices: Vec<GoogleVoice>,
        }
        #[derive(Deserialize)]
        struct GoogleVoice {
            name: String,
            #[serde(rename = "languageCodes", default)]
            language_codes: Vec<String>,
        }

        let body: VoicesResponse = resp.json().await.map_err(|e| net_err("google", e))?;
        Ok(body
            .voices
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.name.clone(),
                name: v.name,
                language: v.language_codes.into_iter().next(),
                description: None,
            })
            .collect())
    }

    fn known_voices(&self) -> &'static [&'static str] {
        GOOGLE_KNOWN_VOICES
    }
}
