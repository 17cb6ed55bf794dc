//! External audio process management
//!
//! All decoder and transcoder subprocess handling lives here; no other
//! crate spawns audio tooling. The playback manager owns decoder process
//! lifetimes end to end: spawn, feed, drain, reap, kill.

pub mod playback;
pub mod probe;
pub mod transcode;

pub use playback::{play_audio_file, playback_manager, PlaybackConfig, PlaybackManager, StreamWriter};
pub use probe::{check_audio_environment, AudioEnvironment, MediaProber};
pub use transcode::{TranscodeConfig, Transcoder};
