//! Audio environment and media probing
//!
//! Diagnostics helpers behind the `status` surface: whether the host has a
//! usable audio output path, and whether a file is readable audio. Probing
//! uses the external prober (`ffprobe`) so no decoding happens in-process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use tts_core::{Result, TtsError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of the host audio environment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEnvironment {
    pub available: bool,
    pub reason: &'static str,
    pub pulse: bool,
    pub alsa: bool,
}

/// Check whether audio playback is likely to work on this host.
///
/// Heuristic, not authoritative: a PulseAudio socket or ALSA card listing
/// is taken as a yes; otherwise playback may still work through another
/// path. Used for diagnostics, never to veto a playback attempt.
pub fn check_audio_environment() -> AudioEnvironment {
    if std::env::var_os("PULSE_SERVER").is_some() {
        return AudioEnvironment {
            available: true,
            reason: "PulseAudio server configured",
            pulse: true,
            alsa: false,
        };
    }

    let alsa = std::fs::metadata("/proc/asound/cards")
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if alsa {
        return AudioEnvironment {
            available: true,
            reason: "ALSA devices present",
            pulse: false,
            alsa: true,
        };
    }

    AudioEnvironment {
        available: false,
        reason: "no audio devices detected",
        pulse: false,
        alsa: false,
    }
}

/// Media prober wrapper.
#[derive(Debug, Clone)]
pub struct MediaProber {
    command: String,
}

impl Default for MediaProber {
    fn default() -> Self {
        Self {
            command: "ffprobe".to_string(),
        }
    }
}

impl MediaProber {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Whether `path` is a readable media file. `false` covers both
    /// invalid files and an unreachable prober.
    pub async fn validate(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        let status = Command::new(&self.command)
            .args(["-v", "quiet", "-show_entries", "format=format_name"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(PROBE_TIMEOUT, status).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        }
    }

    /// Duration of an audio file in seconds.
    pub async fn duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.command)
            .args([
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        let output = tokio::time::timeout(PROBE_TIMEOUT, output)
            .await
            .map_err(|_| TtsError::provider("media probe timed out"))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TtsError::Dependency(format!("prober '{}' not found", self.command))
                } else {
                    TtsError::provider(format!("could not run prober: {e}"))
                }
            })?;

        if !output.status.success() {
            return Err(TtsError::provider(format!(
                "could not probe '{}'",
                path.display()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text.trim().parse().map_err(|_| {
            TtsError::provider(format!("unparseable duration '{}'", text.trim()))
        })?;
        debug!(path = %path.display(), seconds, "probed duration");
        Ok(seconds)
    }
}
