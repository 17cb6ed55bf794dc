//! Microsoft edge speech provider
//!
//! Free websocket service, no API key. One connection per synthesis: a
//! `speech.config` message negotiates the output encoding, an SSML message
//! carries the request, and the service answers with interleaved text
//! events and binary audio frames until `turn.end`.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use tts_config::Settings;
use tts_core::{
    AudioFormat, AudioSink, ByteSink, CancelToken, ProviderDescriptor, ProviderId, Result,
    TextRequest, TtsError, TtsProvider, VoiceInfo, VoiceRef,
};

use crate::http::{build_client, check_status, net_err, FileCollector};

const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";
const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";
const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Voices known without a catalogue fetch.
pub static EDGE_KNOWN_VOICES: &[&str] = &[
    "en-US-JennyNeural",
    "en-US-GuyNeural",
    "en-GB-SoniaNeural",
    "en-IE-EmilyNeural",
];

static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Edge,
    display_name: "Edge TTS",
    requires_network: true,
    requires_api_key: false,
    supported_formats: &[AudioFormat::Mp3],
    supports_streaming: true,
    supports_cloning: false,
    supports_ssml: true,
    options: &[],
};

pub struct EdgeProvider {
    settings: Arc<Settings>,
    client: reqwest::Client,
    voices: Mutex<Option<Vec<VoiceInfo>>>,
}

impl EdgeProvider {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self {
            settings,
            client,
            voices: Mutex::new(None),
        })
    }

    fn connection_url(&self) -> String {
        format!(
            "{}?TrustedClientToken={}&ConnectionId={}",
            self.settings.endpoints.edge_wss,
            TRUSTED_CLIENT_TOKEN,
            Uuid::new_v4().simple()
        )
    }

    fn voice_name(&self, request: &TextRequest) -> Result<String> {
        match &request.voice {
            VoiceRef::Named { voice, .. } => Ok(voice.clone()),
            VoiceRef::Default => Ok(DEFAULT_VOICE.to_string()),
            VoiceRef::CloneFrom(_) => Err(TtsError::voice(
                "edge does not support voice cloning; use the local provider",
                vec![DEFAULT_VOICE.to_string()],
            )),
        }
    }

    /// Run one synthesis turn, delivering audio frames to `sink` in arrival
    /// order. Returns the total audio byte count.
    async fn run_turn(
        &self,
        ssml: &str,
        sink: &mut dyn ByteSink,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let url = self.connection_url();
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| TtsError::Network(format!("edge: websocket connect failed: {e}")))?;

        let timestamp = Utc::now().to_rfc2822();
        let config = format!(
            "X-Timestamp:{timestamp}\r\n\
             Content-Type:application/json; charset=utf-8\r\n\
             Path:speech.config\r\n\r\n\
             {{\"context\":{{\"synthesis\":{{\"audio\":{{\"metadataoptions\":{{\
             \"sentenceBoundaryEnabled\":\"false\",\"wordBoundaryEnabled\":\"false\"}},\
             \"outputFormat\":\"{OUTPUT_FORMAT}\"}}}}}}}}"
        );
        ws.send(Message::Text(config))
            .await
            .map_err(|e| TtsError::Network(format!("edge: could not send config: {e}")))?;

        let request_id = Uuid::new_v4().simple().to_string();
        let speech = format!(
            "X-RequestId:{request_id}\r\n\
             Content-Type:application/ssml+xml\r\n\
             X-Timestamp:{timestamp}\r\n\
             Path:ssml\r\n\r\n{ssml}"
        );
        ws.send(Message::Text(speech))
            .await
            .map_err(|e| TtsError::Network(format!("edge: could not send request: {e}")))?;

        let mut total = 0u64;
        let mut chunks = 0u64;
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return Err(TtsError::Cancelled);
                }
                message = ws.next() => message,
            };
            match message {
                Some(Ok(Message::Binary(payload))) => {
                    if let Some(audio) = audio_payload(&payload) {
                        sink.write_chunk(audio).await?;
                        total += audio.len() as u64;
                        chunks += 1;
                    }
                }
                Some(Ok(Message::Text(event))) => {
                    if event.contains("Path:turn.end") {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(TtsError::Network(format!("edge: stream failed: {e}")));
                }
            }
        }
        let _ = ws.close(None).await;

        if total == 0 {
            return Err(TtsError::provider(
                "edge: service returned no audio for the request",
            ));
        }
        debug!(chunks, bytes = total, "edge turn completed");
        Ok(total)
    }
}

/// Binary frames carry a big-endian u16 header length, the header text,
/// then the payload. Only `Path:audio` frames hold audio.
fn audio_payload(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 2 {
        return None;
    }
    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let body_start = 2 + header_len;
    if frame.len() < body_start {
        return None;
    }
    let header = std::str::from_utf8(&frame[2..body_start]).ok()?;
    header.contains("Path:audio").then(|| &frame[body_start..])
}

/// Wrap plain text in the service's SSML envelope, attaching rate/pitch
/// prosody only when set.
fn build_ssml(voice: &str, request: &TextRequest) -> String {
    let text = escape_text(&request.text);
    let mut prosody_attrs = String::new();
    if let Some(rate) = request.rate.render() {
        prosody_attrs.push_str(&format!(" rate='{rate}'"));
    }
    if let Some(pitch) = request.pitch.render() {
        prosody_attrs.push_str(&format!(" pitch='{pitch}'"));
    }

    let body = if prosody_attrs.is_empty() {
        text
    } else {
        format!("<prosody{prosody_attrs}>{text}</prosody>")
    };
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{voice}'>{body}</voice></speak>"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Deserialize)]
struct EdgeVoice {
    #[serde(rename = "ShortName")]
    short_name: String,
    #[serde(rename = "Locale")]
    locale: Option<String>,
    #[serde(rename = "FriendlyName")]
    friendly_name: Option<String>,
}

#[async_trait]
impl TtsProvider for EdgeProvider {
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

        // SSML auto-detect: pre-marked input is forwarded verbatim.
        let ssml = if request.is_ssml() {
            request.text.clone()
        } else {
            build_ssml(&voice, request)
        };

        match sink {
            AudioSink::Stream(writer) => {
                self.run_turn(&ssml, writer, cancel).await?;
                Ok(())
            }
            AudioSink::File(path) => {
                let mut collector = FileCollector::create(&path).await?;
                match self.run_turn(&ssml, &mut collector, cancel).await {
                    Ok(_) => collector.finalize().await,
                    Err(e) => {
                        collector.discard().await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        if let Some(cached) = self.voices.lock().as_ref() {
            return Ok(cached.clone());
        }

        let url = format!(
            "{}?trustedclienttoken={}",
            self.settings.endpoints.edge_voices, TRUSTED_CLIENT_TOKEN
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| net_err("edge", e))?;
        let resp = check_status(resp, "edge", "none required").await?;
        let raw: Vec<EdgeVoice> = resp.json().await.map_err(|e| net_err("edge", e))?;

        let voices: Vec<VoiceInfo> = raw
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.short_name.clone(),
                name: v.short_name,
                language: v.locale,
                description: v.friendly_name,
            })
            .collect();
        if voices.is_empty() {
            warn!("edge voice catalogue came back empty, using fallback list");
            return Ok(EDGE_KNOWN_VOICES.iter().copied().map(VoiceInfo::named).collect());
        }
        *self.voices.lock() = Some(voices.clone());
        Ok(voices)
    }

    fn known_voices(&self) -> &'static [&'static str] {
        EDGE_KNOWN_VOICES
    }
}
