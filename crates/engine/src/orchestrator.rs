//! Synthesis orchestrator
//!
//! Resolves the provider, applies stream/format downgrades against the
//! provider descriptor, retries retriable failures with a short backoff,
//! and routes audio to the playback manager or the filesystem. Documents
//! run through the conversion/parse/emotion/markup pipeline (with the
//! content-addressed cache) before synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use tts_audio::{PlaybackConfig, PlaybackManager, TranscodeConfig, Transcoder};
use tts_config::Settings;
use tts_core::{
    AudioFormat, AudioSink, CancelToken, ProviderDescriptor, ProviderId, Result, TextRequest,
    TtsError, TtsProvider, VoiceRef,
};
use tts_document::{
    annotate, detect_format, emit, parse_markdown, to_markdown, DocumentCache, DocumentFormat,
    EmotionProfile, SsmlPlatform,
};
use tts_providers::{ProviderRegistry, VoiceCacheEntry};

/// Backoff schedule for retriable failures.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(250), Duration::from_secs(1)];

/// Where synthesised audio goes.
#[derive(Debug, Clone)]
pub enum Destination {
    /// Play on the default audio device.
    Speakers,
    /// Write a complete container to this path.
    File(PathBuf),
}

/// Options for the document-to-speech pipeline.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Source format; auto-detected when unset.
    pub format: Option<DocumentFormat>,
    pub ssml_platform: SsmlPlatform,
    pub emotion_profile: EmotionProfile,
    pub use_cache: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            format: None,
            ssml_platform: SsmlPlatform::Generic,
            emotion_profile: EmotionProfile::Auto,
            use_cache: true,
        }
    }
}

/// The end-to-end driver. One synthesis in progress per call; instances
/// are cheap to share behind an `Arc`.
pub struct TtsEngine {
    settings: Arc<Settings>,
    registry: ProviderRegistry,
    playback: PlaybackManager,
    transcoder: Transcoder,
    document_cache: DocumentCache,
}

impl TtsEngine {
    pub fn new(settings: Arc<Settings>) -> Self {
        let playback = PlaybackManager::new(PlaybackConfig::from_settings(&settings));
        let transcoder = Transcoder::new(TranscodeConfig::from_settings(&settings));
        let document_cache = DocumentCache::new(settings.document_cache_dir());
        let registry = ProviderRegistry::new(settings.clone());
        Self {
            settings,
            registry,
            playback,
            transcoder,
            document_cache,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve the request's voice reference to a concrete provider.
    fn resolve(&self, request: &TextRequest) -> Result<(ProviderId, VoiceRef)> {
        match &request.voice {
            VoiceRef::Default => self.registry.resolve_voice(&self.settings.defaults.voice),
            VoiceRef::Named {
                provider: Some(id), ..
            } => Ok((*id, request.voice.clone())),
            VoiceRef::Named {
                provider: None,
                voice,
            } => self.registry.resolve_voice(voice),
            VoiceRef::CloneFrom(_) => Ok((ProviderId::Local, request.voice.clone())),
        }
    }

    /// Configured default rate/pitch apply only where the request left
    /// them unset; unparseable configured values stay unset.
    fn apply_prosody_defaults(&self, request: &mut TextRequest) {
        if request.rate.value().is_none() {
            if let Some(rate) = &self.settings.defaults.rate {
                request.rate = rate.parse().unwrap_or_default();
            }
        }
        if request.pitch.value().is_none() {
            if let Some(pitch) = &self.settings.defaults.pitch {
                request.pitch = pitch.parse().unwrap_or_default();
            }
        }
    }

    /// Validate raw `key=value` provider options against the provider's
    /// schema, returning the typed map carried by a request.
    pub fn validate_provider_options(
        &self,
        provider: ProviderId,
        raw: &std::collections::BTreeMap<String, String>,
    ) -> Result<tts_core::ProviderOptions> {
        self.registry.get(provider)?.validate_options(raw)
    }

    /// Synthesize a request to the destination. Returns the output path
    /// for file destinations (including the streaming fallback), `None`
    /// for pure device playback.
    pub async fn synthesize(
        &self,
        request: TextRequest,
        destination: Destination,
        cancel: &CancelToken,
    ) -> Result<Option<PathBuf>> {
        cancel.check()?;
        let (provider_id, voice) = self.resolve(&request)?;
        let provider = self.registry.get(provider_id)?;
        let descriptor = provider.describe();

        if matches!(voice, VoiceRef::CloneFrom(_)) && !descriptor.supports_cloning {
            return Err(TtsError::voice(
                format!("provider '{provider_id}' cannot clone voices"),
                vec!["local".to_string()],
            ));
        }

        let mut request = request;
        request.voice = voice;
        self.apply_prosody_defaults(&mut request);
        debug!(provider = %provider_id, stream = request.stream, format = %request.format, "dispatching synthesis");

        match destination {
            Destination::File(path) => self
                .synthesize_to_file(provider.as_ref(), descriptor, &request, path, cancel)
                .await
                .map(Some),
            Destination::Speakers => {
                if request.stream && descriptor.supports_streaming {
                    match self
                        .stream_to_speakers(provider.as_ref(), descriptor, &request, cancel)
                        .await
                    {
                        Err(TtsError::Dependency(reason)) => {
                            warn!("{reason}; falling back to file output");
                            let path = self.default_output_path(request.format);
                            self.synthesize_to_file(
                                provider.as_ref(),
                                descriptor,
                                &request,
                                path,
                                cancel,
                            )
                            .await
                            .map(Some)
                        }
                        other => other.map(|_| None),
                    }
                } else {
                    self.play_via_file(provider.as_ref(), descriptor, &request, cancel)
                        .await
                        .map(|_| None)
                }
            }
        }
    }

    /// Stream provider chunks straight into a decoder process.
    async fn stream_to_speakers(
        &self,
        provider: &dyn TtsProvider,
        descriptor: &ProviderDescriptor,
        request: &TextRequest,
        cancel: &CancelToken,
    ) -> Result<()> {
        let synth_format = negotiate_format(descriptor, request.format);
        let mut effective = request.clone();
        effective.format = synth_format;

        let mut attempt = 0;
        loop {
            let mut writer = self.playback.open_stream(synth_format).await?;
            match provider
                .synthesize(&effective, AudioSink::Stream(&mut writer), cancel)
                .await
            {
                Ok(()) => return writer.finish().await,
                Err(e) => {
                    let written = writer.bytes_written();
                    writer.abort().await;
                    // Audio already played cannot be replayed; only clean
                    // failures before the first chunk are retried.
                    if e.retriable() && written == 0 && attempt < RETRY_DELAYS.len() {
                        debug!(attempt, "retriable failure before first chunk: {e}");
                        tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Downgrade path for non-streaming providers: synthesize to a temp
    /// file, then play and clean it up.
    async fn play_via_file(
        &self,
        provider: &dyn TtsProvider,
        descriptor: &ProviderDescriptor,
        request: &TextRequest,
        cancel: &CancelToken,
    ) -> Result<()> {
        let synth_format = negotiate_format(descriptor, request.format);
        let mut effective = request.clone();
        effective.format = synth_format;

        let temp = std::env::temp_dir().join(format!(
            "tts-{}.{}",
            Uuid::new_v4().simple(),
            synth_format.extension()
        ));
        if let Err(e) = self
            .provider_to_file(provider, &effective, &temp, cancel)
            .await
        {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(TtsError::Cancelled);
        }
        self.playback.play_file(&temp, true, None).await
    }

    /// File destination, transcoding when the provider cannot produce the
    /// requested container.
    async fn synthesize_to_file(
        &self,
        provider: &dyn TtsProvider,
        descriptor: &ProviderDescriptor,
        request: &TextRequest,
        target: PathBuf,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        if descriptor.supports_format(request.format) {
            self.provider_to_file(provider, request, &target, cancel)
                .await?;
            return Ok(target);
        }

        let synth_format = negotiate_format(descriptor, request.format);
        debug!(
            requested = %request.format,
            synthesized = %synth_format,
            "provider cannot produce requested format, converting"
        );
        let mut effective = request.clone();
        effective.format = synth_format;
        let temp = std::env::temp_dir().join(format!(
            "tts-{}.{}",
            Uuid::new_v4().simple(),
            synth_format.extension()
        ));

        if let Err(e) = self
            .provider_to_file(provider, &effective, &temp, cancel)
            .await
        {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        if let Err(e) = self
            .transcoder
            .convert_with_cleanup(&temp, &target, request.format)
            .await
        {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(e);
        }
        Ok(target)
    }

    /// One provider call with the retry schedule. Providers write files
    /// atomically, so a failed attempt leaves nothing at `path`.
    async fn provider_to_file(
        &self,
        provider: &dyn TtsProvider,
        request: &TextRequest,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            match provider
                .synthesize(request, AudioSink::File(path.to_path_buf()), cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.retriable() && attempt < RETRY_DELAYS.len() => {
                    debug!(attempt, "retriable synthesis failure: {e}");
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                    attempt += 1;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(path).await;
                    return Err(e);
                }
            }
        }
    }

    fn default_output_path(&self, format: AudioFormat) -> PathBuf {
        let dir = self
            .settings
            .defaults
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("tts-{}.{}", Uuid::new_v4().simple(), format.extension()))
    }

    /// Run the document pipeline: normalise, parse, annotate, and render
    /// either plain text or platform speech markup. Results are served
    /// from the content-addressed cache when enabled.
    pub fn process_document(&self, content: &str, options: &DocumentOptions) -> Result<String> {
        let format = options.format.unwrap_or_else(|| detect_format(content));
        let caching = options.use_cache && self.settings.document.cache_enabled;
        let key = DocumentCache::key(
            content,
            format.as_str(),
            options.ssml_platform.as_str(),
            options.emotion_profile.as_str(),
        );

        let annotated = caching.then(|| self.document_cache.get(&key)).flatten();
        let annotated = match annotated {
            Some(cached) => cached,
            None => {
                let markdown = to_markdown(content, format);
                let elements = parse_markdown(&markdown);
                let annotated = annotate(elements, options.emotion_profile);
                if caching {
                    if let Err(e) = self.document_cache.put(&key, &annotated) {
                        warn!("could not cache document parse: {e}");
                    }
                }
                annotated
            }
        };

        Ok(emit(&annotated, options.ssml_platform))
    }

    /// Document in, audio out: the full pipeline plus synthesis.
    pub async fn synthesize_document(
        &self,
        content: &str,
        options: &DocumentOptions,
        mut request: TextRequest,
        destination: Destination,
        cancel: &CancelToken,
    ) -> Result<Option<PathBuf>> {
        let text = self.process_document(content, options)?;
        if tts_core::text::normalize_whitespace(&tts_core::text::strip_ssml_tags(&text)).is_empty()
        {
            return Err(TtsError::BadOption {
                field: "document".into(),
                message: "no speakable content extracted from document".into(),
                suggestions: Vec::new(),
            });
        }
        request.text = text;
        self.synthesize(request, destination, cancel).await
    }

    /// Remove every document cache entry.
    pub fn clear_document_cache(&self) -> Result<usize> {
        self.document_cache.clear()
    }

    /// Preload voice reference samples into the local synthesis server.
    pub async fn load_voices(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        self.registry
            .voice_cache()
            .load(paths, self.registry.server(), cancel)
            .await
    }

    /// Release voice reference samples.
    pub async fn unload_voices(&self, paths: &[PathBuf], cancel: &CancelToken) -> Result<usize> {
        self.registry
            .voice_cache()
            .unload(paths, self.registry.server(), cancel)
            .await
    }

    /// Release every loaded voice reference.
    pub async fn unload_all_voices(&self, cancel: &CancelToken) -> Result<usize> {
        self.registry
            .voice_cache()
            .unload_all(self.registry.server(), cancel)
            .await
    }

    /// The live voice registry, oldest first.
    pub fn voice_status(&self) -> Vec<VoiceCacheEntry> {
        self.registry.voice_cache().status()
    }
}

/// Pick the format to ask the provider for: the requested one when
/// supported, otherwise mp3 when available, otherwise the provider's
/// first listed format.
fn negotiate_format(descriptor: &ProviderDescriptor, requested: AudioFormat) -> AudioFormat {
    if descriptor.supports_format(requested) {
        requested
    } else if descriptor.supports_format(AudioFormat::Mp3) {
        AudioFormat::Mp3
    } else {
        descriptor
            .supported_formats
            .first()
            .copied()
            .unwrap_or(AudioFormat::Mp3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tts_core::{OptionSpec, ProviderId};

    static FIXTURE: ProviderDescriptor = ProviderDescriptor {
        id: ProviderId::Google,
        display_name: "Fixture",
        requires_network: true,
        requires_api_key: false,
        supported_formats: &[AudioFormat::Wav, AudioFormat::Ogg],
        supports_streaming: false,
        supports_cloning: false,
        supports_ssml: false,
        options: &[("x", OptionSpec::Bool { default: false })],
    };

    #[test]
    fn test_negotiate_format_prefers_requested() {
        assert_eq!(negotiate_format(&FIXTURE, AudioFormat::Ogg), AudioFormat::Ogg);
    }

    #[test]
    fn test_negotiate_format_falls_back() {
        // mp3 unsupported here, so the first listed format wins.
        assert_eq!(negotiate_format(&FIXTURE, AudioFormat::Flac), AudioFormat::Wav);
    }

    #[test]
    fn test_default_destination_paths_are_unique() {
        let engine = TtsEngine::new(Arc::new(Settings::default()));
        let a = engine.default_output_path(AudioFormat::Mp3);
        let b = engine.default_output_path(AudioFormat::Mp3);
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "mp3");
    }
}
