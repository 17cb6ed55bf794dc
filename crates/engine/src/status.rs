//! Provider summaries and system health reporting
//!
//! Read-only surface behind the CLI's `providers` and `status` views:
//! which backends exist, what they can do, whether their credentials and
//! external tools are in place. Nothing here performs synthesis or spends
//! quota.

use tts_audio::AudioEnvironment;
use tts_core::{AudioFormat, ProviderId, Result};

use crate::orchestrator::TtsEngine;

/// Static capabilities plus configuration state for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSummary {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub requires_network: bool,
    pub requires_api_key: bool,
    /// Whether credentials for this provider are configured (trivially
    /// true for keyless providers).
    pub configured: bool,
    pub supports_streaming: bool,
    pub supports_cloning: bool,
    pub supports_ssml: bool,
    pub formats: Vec<AudioFormat>,
    pub sample_voices: Vec<&'static str>,
}

/// One-shot system health snapshot.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub decoder_available: bool,
    pub transcoder_available: bool,
    pub audio: AudioEnvironment,
    pub local_server_running: bool,
    pub loaded_voices: usize,
    pub providers: Vec<ProviderSummary>,
}

impl TtsEngine {
    /// Capability and configuration summaries for every provider, in
    /// scan order.
    pub fn provider_summaries(&self) -> Result<Vec<ProviderSummary>> {
        let mut summaries = Vec::with_capacity(ProviderId::SCAN_ORDER.len());
        for id in ProviderId::SCAN_ORDER {
            let provider = self.registry().get(id)?;
            let descriptor = provider.describe();
            summaries.push(ProviderSummary {
                id,
                display_name: descriptor.display_name,
                requires_network: descriptor.requires_network,
                requires_api_key: descriptor.requires_api_key,
                configured: self.provider_configured(id, descriptor.requires_api_key),
                supports_streaming: descriptor.supports_streaming,
                supports_cloning: descriptor.supports_cloning,
                supports_ssml: descriptor.supports_ssml,
                formats: descriptor.supported_formats.to_vec(),
                sample_voices: provider.known_voices().to_vec(),
            });
        }
        Ok(summaries)
    }

    fn provider_configured(&self, id: ProviderId, requires_api_key: bool) -> bool {
        if !requires_api_key {
            return true;
        }
        match id {
            ProviderId::OpenAi => self.settings().api_key("openai").is_some(),
            ProviderId::ElevenLabs => self.settings().api_key("elevenlabs").is_some(),
            ProviderId::Google => {
                self.settings().api_key("google").is_some()
                    || self.settings().keys.google_service_account.is_some()
            }
            ProviderId::Edge | ProviderId::Local => true,
        }
    }

    /// Probe external tools, the audio environment, and the local server.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let decoder_available = self.playback().probe_decoder().await.is_ok();
        let transcoder_available = self.transcoder().probe().await.is_ok();
        let audio = tts_audio::check_audio_environment();
        let local_server_running = self.registry().server().is_running().await;
        let loaded_voices = self.voice_status().len();
        let providers = self.provider_summaries()?;

        Ok(Diagnostics {
            decoder_available,
            transcoder_available,
            audio,
            local_server_running,
            loaded_voices,
            providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tts_config::Settings;

    #[test]
    fn test_summaries_cover_all_providers_in_scan_order() {
        let engine = TtsEngine::new(Arc::new(Settings::default()));
        let summaries = engine.provider_summaries().unwrap();
        let ids: Vec<ProviderId> = summaries.iter().map(|s| s.id).collect();
        assert_eq!(ids, ProviderId::SCAN_ORDER.to_vec());
    }

    #[test]
    fn test_keyless_providers_report_configured() {
        let engine = TtsEngine::new(Arc::new(Settings::default()));
        let summaries = engine.provider_summaries().unwrap();
        let edge = summaries.iter().find(|s| s.id == ProviderId::Edge).unwrap();
        assert!(edge.configured);
        assert!(!edge.requires_api_key);
        let local = summaries.iter().find(|s| s.id == ProviderId::Local).unwrap();
        assert!(local.configured);
        assert!(local.supports_cloning);
    }

    #[test]
    fn test_key_presence_flips_configured() {
        std::env::remove_var("ELEVENLABS_API_KEY");
        std::env::remove_var("ELEVEN_API_KEY");
        let mut settings = Settings::default();
        settings.keys.elevenlabs = None;
        let engine = TtsEngine::new(Arc::new(settings));
        let summary = engine
            .provider_summaries()
            .unwrap()
            .into_iter()
            .find(|s| s.id == ProviderId::ElevenLabs)
            .unwrap();
        assert!(!summary.configured);

        let mut settings = Settings::default();
        settings.keys.elevenlabs = Some("key".into());
        let engine = TtsEngine::new(Arc::new(settings));
        let summary = engine
            .provider_summaries()
            .unwrap()
            .into_iter()
            .find(|s| s.id == ProviderId::ElevenLabs)
            .unwrap();
        assert!(summary.configured);
    }
}
