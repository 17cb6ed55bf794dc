//! Audio playback via an external decoder-player process
//!
//! One decoder process per active playback, invoked as
//! `decoder -nodisp -autoexit -i <source>` with either a file path or
//! `pipe:0` as the source. Streamed playback hands the caller an exclusive
//! [`StreamWriter`]; closing it signals end-of-stream and the manager reaps
//! the process.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tts_config::Settings;
use tts_core::{AudioFormat, ByteSink, Result, TtsError};

/// How long a freshly spawned decoder gets to crash before it is treated
/// as started.
const STARTUP_POLL: Duration = Duration::from_millis(50);

/// Playback manager configuration.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Decoder command name or path.
    pub decoder: String,
    /// Grace period for a decoder that received no input after writer close.
    pub drain_timeout: Duration,
    /// Startup window in which an immediate decoder exit is an error.
    pub startup_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            decoder: "ffplay".to_string(),
            drain_timeout: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(2),
        }
    }
}

impl PlaybackConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            decoder: settings.audio.decoder.clone(),
            drain_timeout: Duration::from_secs(settings.timeouts.decoder_drain_s),
            startup_timeout: Duration::from_secs(settings.timeouts.decoder_startup_s),
        }
    }
}

/// Spawns and owns decoder-player processes.
///
/// A process-wide instance is available through [`playback_manager`] for
/// convenience, but callers may own their own instance; tests construct one
/// with a stub decoder command.
#[derive(Debug, Clone)]
pub struct PlaybackManager {
    config: PlaybackConfig,
}

impl PlaybackManager {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }

    /// Check that the decoder executable is reachable.
    pub async fn probe_decoder(&self) -> Result<()> {
        let status = Command::new(&self.config.decoder)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(decoder_missing(&self.config.decoder))
            }
            Err(e) => Err(TtsError::Playback(format!(
                "could not probe decoder '{}': {e}",
                self.config.decoder
            ))),
        }
    }

    /// Fork a decoder reading `format` audio from its stdin and playing it
    /// on the default device. The returned writer is exclusively owned by
    /// the caller; closing it (via `finish`) signals end-of-stream.
    ///
    /// Startup is bounded: a decoder that exits before accepting any input
    /// fails here, and one that never consumes its first chunk is killed by
    /// the writer once the startup window elapses.
    pub async fn open_stream(&self, format: AudioFormat) -> Result<StreamWriter> {
        let mut child = Command::new(&self.config.decoder)
            .args(["-nodisp", "-autoexit", "-loglevel", "error"])
            .args(["-f", format.demuxer()])
            .args(["-i", "pipe:0"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.config.decoder, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TtsError::Internal("decoder stdin was not piped".into()))?;

        // One poll tick for the decoder to fail on unusable flags or a
        // missing audio device before the writer is handed out as healthy.
        tokio::time::sleep(STARTUP_POLL.min(self.config.startup_timeout)).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(TtsError::Playback(format!(
                "decoder exited during startup ({status})"
            )));
        }

        debug!(decoder = %self.config.decoder, %format, "decoder stream opened");
        Ok(StreamWriter {
            child,
            stdin: Some(stdin),
            drain_timeout: self.config.drain_timeout,
            startup_timeout: self.config.startup_timeout,
            bytes_written: 0,
        })
    }

    /// Fork a decoder on `path` and wait for playback to complete, up to
    /// `timeout` (indefinitely when unset). The file is removed afterwards
    /// when `cleanup` is set, on success and on failure alike.
    ///
    /// A missing decoder is fatal (`Dependency`); a decoder that exits
    /// non-zero or overruns the timeout is logged and swallowed.
    pub async fn play_file(
        &self,
        path: &Path,
        cleanup: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let result = self.run_file_playback(path, timeout).await;
        if cleanup {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), "could not clean up audio file: {e}");
            }
        }
        result
    }

    async fn run_file_playback(&self, path: &Path, timeout: Option<Duration>) -> Result<()> {
        let mut child = Command::new(&self.config.decoder)
            .args(["-nodisp", "-autoexit", "-loglevel", "error"])
            .arg("-i")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.config.decoder, e))?;

        // Same startup tick as the stream path. Very short clips may finish
        // inside it; a decoder that cannot start at all is reported here
        // instead of being waited on.
        tokio::time::sleep(STARTUP_POLL.min(self.config.startup_timeout)).await;
        if let Ok(Some(status)) = child.try_wait() {
            if status.success() {
                debug!(path = %path.display(), "playback completed");
            } else {
                warn!(path = %path.display(), ?status, "decoder failed during startup");
            }
            return Ok(());
        }

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        path = %path.display(),
                        "playback exceeded {}s, terminating decoder",
                        limit.as_secs()
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Ok(());
                }
            },
            None => child.wait().await,
        };

        match waited {
            Ok(status) if status.success() => {
                debug!(path = %path.display(), "playback completed");
                Ok(())
            }
            Ok(status) => {
                warn!(path = %path.display(), ?status, "decoder exited non-zero");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), "decoder wait failed: {e}");
                Ok(())
            }
        }
    }

    /// Like [`play_file`], but returns immediately; the decoder is reaped
    /// by a background task. Safe to call concurrently: every call spawns
    /// a disjoint subprocess.
    ///
    /// [`play_file`]: PlaybackManager::play_file
    pub fn play_and_forget(
        &self,
        path: PathBuf,
        cleanup: bool,
        timeout: Option<Duration>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.play_file(&path, cleanup, timeout).await {
                warn!(path = %path.display(), "background playback failed: {e}");
            }
        })
    }
}

fn spawn_error(decoder: &str, e: std::io::Error) -> TtsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        decoder_missing(decoder)
    } else {
        TtsError::Playback(format!("could not start decoder '{decoder}': {e}"))
    }
}

fn decoder_missing(decoder: &str) -> TtsError {
    TtsError::Dependency(format!(
        "decoder '{decoder}' not found; install ffmpeg to enable audio playback"
    ))
}

/// Exclusive byte sink feeding one decoder process.
#[derive(Debug)]
pub struct StreamWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    drain_timeout: Duration,
    startup_timeout: Duration,
    bytes_written: u64,
}

impl StreamWriter {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Close the stream and wait for the decoder to finish playing.
    ///
    /// A decoder that was fed audio may legitimately play for longer than
    /// any fixed timeout, so the wait is unbounded once bytes were written;
    /// a decoder that received nothing is reaped after the drain timeout.
    /// Non-zero exits are logged and swallowed.
    pub async fn finish(mut self) -> Result<()> {
        self.stdin.take();

        let waited = if self.bytes_written == 0 {
            match tokio::time::timeout(self.drain_timeout, self.child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("decoder received no input, terminating after drain timeout");
                    let _ = self.child.start_kill();
                    let _ = self.child.wait().await;
                    return Ok(());
                }
            }
        } else {
            self.child.wait().await
        };

        match waited {
            Ok(status) if status.success() => {
                debug!(bytes = self.bytes_written, "stream playback completed");
                Ok(())
            }
            Ok(status) => {
                warn!(?status, "decoder exited non-zero after stream");
                Ok(())
            }
            Err(e) => {
                warn!("decoder wait failed: {e}");
                Ok(())
            }
        }
    }

    /// Terminate the decoder immediately. Used on cancellation.
    pub async fn abort(mut self) {
        self.stdin.take();
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        debug!("decoder aborted");
    }
}

#[async_trait]
impl ByteSink for StreamWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let first = self.bytes_written == 0;
        let startup = self.startup_timeout;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TtsError::Internal("stream writer already closed".into()));
        };

        let write = async {
            stdin.write_all(chunk).await?;
            // Flush keeps first-chunk latency low on small writes.
            let _ = stdin.flush().await;
            Ok::<_, std::io::Error>(())
        };
        // The startup window bounds the first chunk only; once the decoder
        // has accepted input, writes are flow-controlled by its own pace.
        let result = if first {
            match tokio::time::timeout(startup, write).await {
                Ok(result) => result,
                Err(_) => {
                    self.stdin.take();
                    let _ = self.child.start_kill();
                    let _ = self.child.wait().await;
                    return Err(TtsError::Playback(format!(
                        "decoder did not accept input within {}s",
                        startup.as_secs()
                    )));
                }
            }
        } else {
            write.await
        };

        match result {
            Ok(()) => {
                self.bytes_written += chunk.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                let status = self.child.try_wait().ok().flatten();
                Err(TtsError::Playback(format!(
                    "decoder ended early (status: {status:?})"
                )))
            }
            Err(e) => Err(TtsError::Playback(format!("decoder write failed: {e}"))),
        }
    }
}

static MANAGER: Lazy<PlaybackManager> =
    Lazy::new(|| PlaybackManager::new(PlaybackConfig::default()));

/// Process-wide playback manager with default configuration.
pub fn playback_manager() -> &'static PlaybackManager {
    &MANAGER
}

/// Play an audio file on the default device.
///
/// Retained for callers of the original free-function API; forwards to the
/// process-wide [`PlaybackManager`], which is the contractual surface.
pub async fn play_audio_file(path: &Path, cleanup: bool, timeout: Option<Duration>) -> Result<()> {
    playback_manager().play_file(path, cleanup, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[cfg(unix)]
    fn stub_decoder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("stub-decoder");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn manager_with(decoder: &Path) -> PlaybackManager {
        PlaybackManager::new(PlaybackConfig {
            decoder: decoder.to_string_lossy().into_owned(),
            drain_timeout: Duration::from_millis(500),
            startup_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_missing_decoder_is_dependency_error() {
        let manager = PlaybackManager::new(PlaybackConfig {
            decoder: "definitely-not-a-decoder".to_string(),
            ..PlaybackConfig::default()
        });
        let err = manager
            .play_file(Path::new("/tmp/nothing.mp3"), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Dependency(_)));

        let err = manager.probe_decoder().await.unwrap_err();
        assert!(matches!(err, TtsError::Dependency(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_writer_feeds_decoder_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("received.bin");
        // Stub consumes stdin into a file, ignoring decoder flags.
        let decoder = stub_decoder(dir.path(), &format!("cat > {}", out.display()));
        let manager = manager_with(&decoder);

        let mut writer = manager.open_stream(AudioFormat::Mp3).await.unwrap();
        writer.write_chunk(b"first-").await.unwrap();
        writer.write_chunk(b"second-").await.unwrap();
        writer.write_chunk(b"third").await.unwrap();
        assert_eq!(writer.bytes_written(), 18);
        writer.finish().await.unwrap();

        let received = std::fs::read(&out).unwrap();
        assert_eq!(received, b"first-second-third");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_decoder_exit_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = stub_decoder(dir.path(), "cat > /dev/null; exit 3");
        let manager = manager_with(&decoder);

        let mut writer = manager.open_stream(AudioFormat::Wav).await.unwrap();
        writer.write_chunk(b"xx").await.unwrap();
        writer.finish().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_crash_at_startup_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = stub_decoder(dir.path(), "exit 7");
        let manager = manager_with(&decoder);

        let err = manager.open_stream(AudioFormat::Mp3).await.unwrap_err();
        assert!(matches!(err, TtsError::Playback(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresponsive_decoder_is_killed_after_startup_window() {
        let dir = tempfile::tempdir().unwrap();
        // Alive but never reads stdin.
        let decoder = stub_decoder(dir.path(), "sleep 60");
        let manager = PlaybackManager::new(PlaybackConfig {
            decoder: decoder.to_string_lossy().into_owned(),
            drain_timeout: Duration::from_millis(500),
            startup_timeout: Duration::from_millis(300),
        });

        let mut writer = manager.open_stream(AudioFormat::Mp3).await.unwrap();
        // Larger than the pipe buffer, so the write cannot complete without
        // a consumer on the other end.
        let chunk = vec![0u8; 1 << 20];
        let started = std::time::Instant::now();
        let err = writer.write_chunk(&chunk).await.unwrap_err();
        assert!(matches!(err, TtsError::Playback(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abort_kills_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = stub_decoder(dir.path(), "sleep 60");
        let manager = manager_with(&decoder);

        let writer = manager.open_stream(AudioFormat::Mp3).await.unwrap();
        let started = std::time::Instant::now();
        writer.abort().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_play_file_cleanup_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = stub_decoder(dir.path(), "exit 0");
        let audio = dir.path().join("clip.mp3");
        std::fs::write(&audio, b"ID3fake").unwrap();

        let manager = manager_with(&decoder);
        manager.play_file(&audio, true, None).await.unwrap();
        assert!(!audio.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_play_and_forget_reaps_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let decoder = stub_decoder(dir.path(), &format!("touch {}", marker.display()));
        let audio = dir.path().join("clip.mp3");
        std::fs::write(&audio, b"ID3fake").unwrap();

        let manager = manager_with(&decoder);
        let handle = manager.play_and_forget(audio, false, None);
        handle.await.unwrap();
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_playback_timeout_kills_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = stub_decoder(dir.path(), "sleep 60");
        let audio = dir.path().join("clip.mp3");
        std::fs::write(&audio, b"ID3fake").unwrap();

        let manager = manager_with(&decoder);
        let started = std::time::Instant::now();
        manager
            .play_file(&audio, false, Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
