//! Synthesis back-ends
//!
//! Five providers behind the [`tts_core::TtsProvider`] contract: the free
//! edge websocket service, three authenticated HTTP APIs, and a local
//! neural synthesis server with voice cloning. The registry constructs
//! providers lazily and owns voice-string dispatch.

pub mod edge;
pub mod elevenlabs;
pub mod google;
mod http;
pub mod local;
pub mod openai;
pub mod registry;
pub mod server;
pub mod voice_cache;

pub use edge::EdgeProvider;
pub use elevenlabs::ElevenLabsProvider;
pub use google::GoogleProvider;
pub use local::LocalNeuralProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use server::ServerHandle;
pub use voice_cache::{VoiceCacheEntry, VoiceCacheManager};
