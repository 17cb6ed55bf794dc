//! Provider registry and voice dispatch
//!
//! Providers are constructed lazily on first use so unused heavy backends
//! cost nothing at startup. Voice-string resolution is a pure function of
//! the string and the fixed provider scan order.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use tts_config::Settings;
use tts_core::{suggest, ProviderId, Result, TtsError, TtsProvider, VoiceRef};

use crate::edge::{EdgeProvider, EDGE_KNOWN_VOICES};
use crate::elevenlabs::{ElevenLabsProvider, ELEVENLABS_KNOWN_VOICES};
use crate::google::{GoogleProvider, GOOGLE_KNOWN_VOICES};
use crate::local::{LocalNeuralProvider, LOCAL_KNOWN_VOICES};
use crate::openai::{OpenAiProvider, OPENAI_KNOWN_VOICES};
use crate::server::ServerHandle;
use crate::voice_cache::VoiceCacheManager;

/// Offline voice catalogue per provider, in the contract's scan order.
fn known_voices(id: ProviderId) -> &'static [&'static str] {
    match id {
        ProviderId::Edge => EDGE_KNOWN_VOICES,
        ProviderId::OpenAi => OPENAI_KNOWN_VOICES,
        ProviderId::ElevenLabs => ELEVENLABS_KNOWN_VOICES,
        ProviderId::Google => GOOGLE_KNOWN_VOICES,
        ProviderId::Local => LOCAL_KNOWN_VOICES,
    }
}

/// Owns provider handles and the shared local-server state.
pub struct ProviderRegistry {
    settings: Arc<Settings>,
    loaded: Mutex<HashMap<ProviderId, Arc<dyn TtsProvider>>>,
    server: Arc<ServerHandle>,
    voice_cache: Arc<VoiceCacheManager>,
}

impl ProviderRegistry {
    pub fn new(settings: Arc<Settings>) -> Self {
        let server = Arc::new(ServerHandle::from_settings(&settings));
        let voice_cache = Arc::new(VoiceCacheManager::new(settings.voice_journal_path()));
        Self {
            settings,
            loaded: Mutex::new(HashMap::new()),
            server,
            voice_cache,
        }
    }

    /// The voice cache shared with the local provider.
    pub fn voice_cache(&self) -> &Arc<VoiceCacheManager> {
        &self.voice_cache
    }

    /// The local synthesis server handle.
    pub fn server(&self) -> &Arc<ServerHandle> {
        &self.server
    }

    /// Fetch a provider, constructing it on first use.
    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn TtsProvider>> {
        let mut loaded = self.loaded.lock();
        if let Some(provider) = loaded.get(&id) {
            return Ok(provider.clone());
        }

        debug!(provider = %id, "loading provider");
        let provider: Arc<dyn TtsProvider> = match id {
            ProviderId::Edge => Arc::new(EdgeProvider::new(self.settings.clone())?),
            ProviderId::OpenAi => Arc::new(OpenAiProvider::new(self.settings.clone())?),
            ProviderId::ElevenLabs => Arc::new(ElevenLabsProvider::new(self.settings.clone())?),
            ProviderId::Google => Arc::new(GoogleProvider::new(self.settings.clone())?),
            ProviderId::Local => Arc::new(LocalNeuralProvider::new(
                self.server.clone(),
                self.voice_cache.clone(),
            )),
        };
        loaded.insert(id, provider.clone());
        Ok(provider)
    }

    /// Resolve a voice string to a provider and voice reference.
    ///
    /// 1. `provider:voice` pins the provider; an unknown prefix fails.
    /// 2. A readable path with an audio extension clones on the local
    ///    provider.
    /// 3. A bare name scans the offline catalogues in the fixed order
    ///    edge, openai, elevenlabs, google, local; first exact match wins.
    /// 4. Anything else fails with nearest-match suggestions.
    pub fn resolve_voice(&self, spec: &str) -> Result<(ProviderId, VoiceRef)> {
        resolve_voice_spec(spec)
    }
}

/// The dispatch algorithm behind [`ProviderRegistry::resolve_voice`], kept
/// free-standing so its determinism is testable without a registry.
pub fn resolve_voice_spec(spec: &str) -> Result<(ProviderId, VoiceRef)> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(TtsError::voice("empty voice specification", Vec::new()));
    }

    if let Some((prefix, rest)) = spec.split_once(':') {
        return match ProviderId::from_alias(prefix) {
            Some(id) => Ok((
                id,
                VoiceRef::Named {
                    provider: Some(id),
                    voice: rest.to_string(),
                },
            )),
            None => Err(TtsError::voice(
                format!("unknown provider '{prefix}'"),
                suggest(prefix, ProviderId::known_aliases(), 3),
            )),
        };
    }

    if VoiceRef::is_clone_path(Path::new(spec)) {
        return Ok((ProviderId::Local, VoiceRef::CloneFrom(spec.into())));
    }

    for id in ProviderId::SCAN_ORDER {
        if known_voices(id).contains(&spec) {
            return Ok((
                id,
                VoiceRef::Named {
                    provider: Some(id),
                    voice: spec.to_string(),
                },
            ));
        }
    }

    let all: Vec<&str> = ProviderId::SCAN_ORDER
        .iter()
        .flat_map(|id| known_voices(*id).iter().copied())
        .collect();
    Err(TtsError::voice(
        format!("voice '{spec}' not found in any provider catalogue"),
        suggest(spec, &all, 3),
    ))
}

/// Parse a leading `@provider` shortcut, returning the provider and the
/// remaining arguments.
pub fn parse_shortcut<'a>(args: &'a [String]) -> Result<(Option<ProviderId>, &'a [String])> {
    let Some(first) = args.first() else {
        return Ok((None, args));
    };
    let Some(alias) = first.strip_prefix('@') else {
        return Ok((None, args));
    };
    match ProviderId::from_alias(alias) {
        Some(id) => Ok((Some(id), &args[1..])),
        None => Err(TtsError::voice(
            format!("unknown provider shortcut '@{alias}'"),
            suggest(alias, ProviderId::known_aliases(), 3),
        )),
    }
}
