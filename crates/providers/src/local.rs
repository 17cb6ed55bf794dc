//! Local neural synthesis provider
//!
//! Synthesis runs in a persistent out-of-process server (see
//! [`crate::server`]); this provider owns request construction, voice
//! cloning via the voice cache, and recovery from a server restart that
//! invalidated cached reference tokens.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use tts_core::{
    AudioFormat, AudioSink, ByteSink, CancelToken, OptionSpec, ProviderDescriptor, ProviderId,
    Result, TextRequest, TtsError, TtsProvider, VoiceInfo, VoiceRef,
};

use crate::http::FileCollector;
use crate::server::ServerHandle;
use crate::voice_cache::VoiceCacheManager;

const DEFAULT_VOICE: &str = "default";

pub static LOCAL_KNOWN_VOICES: &[&str] = &[DEFAULT_VOICE];

static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Local,
    display_name: "Local Neural TTS",
    requires_network: false,
    requires_api_key: false,
    supported_formats: &[AudioFormat::Wav],
    supports_streaming: true,
    supports_cloning: true,
    supports_ssml: false,
    options: &[
        ("exaggeration", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.5 }),
        ("cfg_weight", OptionSpec::Float { min: 0.1, max: 1.0, default: 0.5 }),
        ("temperature", OptionSpec::Float { min: 0.05, max: 5.0, default: 0.8 }),
        ("min_p", OptionSpec::Float { min: 0.0, max: 1.0, default: 0.05 }),
    ],
};

pub struct LocalNeuralProvider {
    server: Arc<ServerHandle>,
    voices: Arc<VoiceCacheManager>,
}

impl LocalNeuralProvider {
    pub fn new(server: Arc<ServerHandle>, voices: Arc<VoiceCacheManager>) -> Self {
        Self { server, voices }
    }

    pub fn voice_cache(&self) -> &Arc<VoiceCacheManager> {
        &self.voices
    }

    pub fn server(&self) -> &Arc<ServerHandle> {
        &self.server
    }

    async fn build_command(
        &self,
        request: &TextRequest,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let mut command = json!({
            "op": "synthesize",
            "text": request.text,
            "options": {
                "exaggeration": request.options.get_f64("exaggeration").unwrap_or(0.5),
                "cfg_weight": request.options.get_f64("cfg_weight").unwrap_or(0.5),
                "temperature": request.options.get_f64("temperature").unwrap_or(0.8),
                "min_p": request.options.get_f64("min_p").unwrap_or(0.05),
            },
        });

        match &request.voice {
            VoiceRef::Default => {
                command["voice"] = json!(DEFAULT_VOICE);
            }
            VoiceRef::Named { voice, .. } => {
                command["voice"] = json!(voice);
            }
            VoiceRef::CloneFrom(path) => {
                let token = self.voices.token_for(path, &self.server, cancel).await?;
                command["token"] = json!(token);
            }
        }
        Ok(command)
    }

    async fn run(
        &self,
        request: &TextRequest,
        sink: &mut dyn ByteSink,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let command = self.build_command(request, cancel).await?;
        match self.server.request_stream(&command, sink, cancel).await {
            Ok(total) => Ok(total),
            // A restarted server forgets its reference tokens; re-establish
            // once and retry.
            Err(TtsError::Provider { message, .. })
                if message.contains("token") && matches!(request.voice, VoiceRef::CloneFrom(_)) =>
            {
                if let VoiceRef::CloneFrom(path) = &request.voice {
                    debug!("reference token stale, reloading voice");
                    self.voices.invalidate_token(path);
                }
                let command = self.build_command(request, cancel).await?;
                self.server.request_stream(&command, sink, cancel).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TtsProvider for LocalNeuralProvider {
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
        self.server.ensure_running(cancel).await?;

        match sink {
            AudioSink::Stream(writer) => {
                self.run(request, writer, cancel).await?;
                Ok(())
            }
            AudioSink::File(path) => {
                let mut collector = FileCollector::create(&path).await?;
                match self.run(request, &mut collector, cancel).await {
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
        let mut voices = vec![VoiceInfo::named(DEFAULT_VOICE)];
        for entry in self.voices.status() {
            voices.push(VoiceInfo {
                id: entry.identity.chars().take(12).collect(),
                name: entry
                    .source_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| entry.identity.clone()),
                language: None,
                description: Some(entry.source_path.display().to_string()),
            });
        }
        Ok(voices)
    }

    fn known_voices(&self) -> &'static [&'static str] {
        LOCAL_KNOWN_VOICES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::{handle_for, spawn_fake_server, Script};
    use tts_core::BufferSink;

    fn provider_for(addr: std::net::SocketAddr, dir: &std::path::Path) -> LocalNeuralProvider {
        let server = Arc::new(handle_for(addr));
        let voices = Arc::new(VoiceCacheManager::new(dir.join("journal.json")));
        LocalNeuralProvider::new(server, voices)
    }

    #[tokio::test]
    async fn test_named_voice_synthesis_streams() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, task) = spawn_fake_server(vec![Script::Audio(vec![
            b"RIFFwav-head".to_vec(),
            b"pcm-tail".to_vec(),
        ])])
        .await;
        let provider = provider_for(addr, dir.path());

        let mut request = TextRequest::new("hello");
        request.voice = VoiceRef::Named {
            provider: Some(ProviderId::Local),
            voice: "default".into(),
        };
        let mut sink = BufferSink::new();
        provider
            .synthesize(&request, AudioSink::Stream(&mut sink), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(sink.bytes(), b"RIFFwav-headpcm-tail");

        let received = task.await.unwrap();
        assert!(received[0].contains("\"voice\":\"default\""));
        assert!(received[0].contains("\"op\":\"synthesize\""));
    }

    #[tokio::test]
    async fn test_clone_from_path_loads_then_synthesizes() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("me.wav");
        std::fs::write(&sample, b"RIFF-me").unwrap();

        let (addr, task) = spawn_fake_server(vec![
            Script::Json(r#"{"status":"ok","token":"tok-xyz"}"#.to_string()),
            Script::Audio(vec![b"RIFFcloned".to_vec()]),
        ])
        .await;
        let provider = provider_for(addr, dir.path());

        let mut request = TextRequest::new("cloned");
        request.voice = VoiceRef::CloneFrom(sample.clone());
        let mut sink = BufferSink::new();
        provider
            .synthesize(&request, AudioSink::Stream(&mut sink), &CancelToken::new())
            .await
            .unwrap();

        assert!(provider.voice_cache().contains(&sample));
        let received = task.await.unwrap();
        assert!(received[0].contains("load_voice"));
        assert!(received[1].contains("\"token\":\"tok-xyz\""));
    }

    #[tokio::test]
    async fn test_second_clone_invocation_reuses_token() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("me.wav");
        std::fs::write(&sample, b"RIFF-me").unwrap();

        let (addr, task) = spawn_fake_server(vec![
            Script::Json(r#"{"status":"ok","token":"tok-1"}"#.to_string()),
            Script::Audio(vec![b"RIFFone".to_vec()]),
            // Second synthesis: no load_voice round trip scripted.
            Script::Audio(vec![b"RIFFtwo".to_vec()]),
        ])
        .await;
        let provider = provider_for(addr, dir.path());

        let mut request = TextRequest::new("again");
        request.voice = VoiceRef::CloneFrom(sample);
        for _ in 0..2 {
            let mut sink = BufferSink::new();
            provider
                .synthesize(&request, AudioSink::Stream(&mut sink), &CancelToken::new())
                .await
                .unwrap();
        }

        let received = task.await.unwrap();
        let loads = received.iter().filter(|r| r.contains("load_voice")).count();
        assert_eq!(loads, 1, "same content must not be re-loaded");
    }

    #[tokio::test]
    async fn test_file_output_writes_container() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _task) =
            spawn_fake_server(vec![Script::Audio(vec![b"RIFFfilewav".to_vec()])]).await;
        let provider = provider_for(addr, dir.path());

        let target = dir.path().join("out.wav");
        let mut request = TextRequest::new("to file");
        request.voice = VoiceRef::Default;
        provider
            .synthesize(
                &request,
                AudioSink::File(target.clone()),
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"RIFFfilewav");
    }

    #[test]
    fn test_descriptor_advertises_cloning() {
        assert!(DESCRIPTOR.supports_cloning);
        assert!(!DESCRIPTOR.requires_network);
        assert!(!DESCRIPTOR.requires_api_key);
        assert_eq!(DESCRIPTOR.supported_formats, &[AudioFormat::Wav]);
    }
}
