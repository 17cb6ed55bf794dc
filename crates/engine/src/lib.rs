//! End-to-end synthesis orchestration
//!
//! The engine ties the pieces together: text or documents in, audio out,
//! streamed to the default device or written to a file. The CLI is a thin
//! caller of this crate; nothing here prints or exits.

pub mod input;
pub mod orchestrator;
pub mod status;

pub use input::{parse_input, read_stdin_text, InputParams};
pub use orchestrator::{Destination, DocumentOptions, TtsEngine};
pub use status::{Diagnostics, ProviderSummary};

pub use tts_core::{
    AudioFormat, CancelToken, PitchAdjust, ProviderId, RateAdjust, Result, TextRequest, TtsError,
    VoiceRef,
};
pub use tts_document::{DocumentFormat, EmotionProfile, SsmlPlatform};
