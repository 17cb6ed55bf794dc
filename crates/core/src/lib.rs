//! Core traits and types for the TTS engine
//!
//! This crate provides foundational types used across all other crates:
//! - The provider contract and descriptor model
//! - Error taxonomy
//! - Request, voice, and audio format types
//! - Synthesis sinks and cancellation

pub mod cancel;
pub mod error;
pub mod format;
pub mod provider;
pub mod request;
pub mod sink;
pub mod text;
pub mod voice;

pub use cancel::CancelToken;
pub use error::{suggest, Result, TtsError};
pub use format::AudioFormat;
pub use provider::{
    OptionSpec, OptionValue, ProviderDescriptor, ProviderId, ProviderOptions, TtsProvider,
    VoiceInfo,
};
pub use request::{PitchAdjust, RateAdjust, TextRequest};
pub use sink::{AudioChunk, AudioSink, BufferSink, ByteSink};
pub use voice::VoiceRef;
