//! Container/codec conversion via an external transcoder
//!
//! Invocation shape is `transcoder -i <in> -y <out>` with the target format
//! inferred from the output extension. Conversions never leave partial
//! files: output is written to a temp name and renamed into place only on
//! success.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use tts_config::Settings;
use tts_core::{AudioFormat, Result, TtsError};

/// Transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    pub command: String,
    pub timeout: Duration,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl TranscodeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            command: settings.audio.transcoder.clone(),
            timeout: Duration::from_secs(settings.timeouts.transcode_s),
        }
    }
}

/// Invokes the external transcoder for container conversions.
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: TranscodeConfig,
}

impl Transcoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    /// Fail with `Dependency` if the transcoder executable is missing.
    pub async fn probe(&self) -> Result<()> {
        let status = Command::new(&self.config.command)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TtsError::Dependency(
                format!(
                    "transcoder '{}' not found; install ffmpeg for format conversion",
                    self.config.command
                ),
            )),
            Err(e) => Err(TtsError::provider(format!(
                "could not probe transcoder '{}': {e}",
                self.config.command
            ))),
        }
    }

    /// Convert `input` into `format` at `output`.
    ///
    /// Writes to a temporary sibling of `output` and renames on success, so
    /// a failed or timed-out conversion leaves nothing at the target path.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
    ) -> Result<()> {
        self.probe().await?;

        let temp = temp_sibling(output, format);
        let result = self.run(input, &temp).await;
        match result {
            Ok(()) => {
                tokio::fs::rename(&temp, output).await.map_err(|e| {
                    TtsError::provider(format!(
                        "could not move converted audio into place: {e}"
                    ))
                })?;
                debug!(
                    input = %input.display(),
                    output = %output.display(),
                    %format,
                    "conversion completed"
                );
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(e)
            }
        }
    }

    /// Convert and always remove the (temporary) input file afterwards,
    /// even when conversion fails.
    pub async fn convert_with_cleanup(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
    ) -> Result<()> {
        let result = self.transcode(input, output, format).await;
        if let Err(e) = tokio::fs::remove_file(input).await {
            debug!(path = %input.display(), "could not clean up conversion input: {e}");
        }
        result
    }

    async fn run(&self, input: &Path, temp: &Path) -> Result<()> {
        let mut child = Command::new(&self.config.command)
            .arg("-i")
            .arg(input)
            .arg("-y")
            .arg(temp)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TtsError::provider(format!("could not start transcoder: {e}")))?;

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(waited) => {
                waited.map_err(|e| TtsError::provider(format!("transcoder wait failed: {e}")))?
            }
            Err(_) => {
                warn!(
                    "transcoder exceeded {}s, terminating",
                    self.config.timeout.as_secs()
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(TtsError::provider(format!(
                    "audio conversion timed out after {}s",
                    self.config.timeout.as_secs()
                )));
            }
        };

        if !status.success() {
            return Err(TtsError::provider(format!(
                "audio conversion failed (transcoder exited {status})"
            )));
        }
        Ok(())
    }
}

/// A unique temp name next to `output` carrying the target extension, so
/// the transcoder still infers the right container.
fn temp_sibling(output: &Path, format: AudioFormat) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("convert");
    let name = format!(".{stem}.{}.{}", Uuid::new_v4().simple(), format.extension());
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_transcoder_is_dependency_error() {
        let transcoder = Transcoder::new(TranscodeConfig {
            command: "definitely-not-a-transcoder".to_string(),
            timeout: Duration::from_secs(1),
        });
        let err = transcoder
            .transcode(
                Path::new("/tmp/in.mp3"),
                Path::new("/tmp/out.flac"),
                AudioFormat::Flac,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Dependency(_)));
    }

    #[test]
    fn test_temp_sibling_keeps_extension() {
        let temp = temp_sibling(Path::new("/tmp/out/clip.flac"), AudioFormat::Flac);
        assert_eq!(temp.extension().unwrap(), "flac");
        assert_eq!(temp.parent(), Some(Path::new("/tmp/out")));
        assert_ne!(temp, Path::new("/tmp/out/clip.flac"));
    }

    #[cfg(unix)]
    fn stub_transcoder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("stub-transcoder");
        let mut file = std::fs::File::create(&path).unwrap();
        // Arguments arrive as: -i <in> -y <out>
        writeln!(file, "#!/bin/sh\nin=$2\nout=$4\n{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_conversion_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder_bin = stub_transcoder(dir.path(), "printf fLaCdata > \"$out\"");
        let input = dir.path().join("in.mp3");
        std::fs::write(&input, b"ID3fake").unwrap();
        let output = dir.path().join("out.flac");

        let transcoder = Transcoder::new(TranscodeConfig {
            command: transcoder_bin.to_string_lossy().into_owned(),
            timeout: Duration::from_secs(5),
        });
        transcoder
            .transcode(&input, &output, AudioFormat::Flac)
            .await
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"fLaC"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_conversion_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder_bin = stub_transcoder(dir.path(), "printf junk > \"$out\"; exit 1");
        let input = dir.path().join("in.mp3");
        std::fs::write(&input, b"ID3fake").unwrap();
        let output = dir.path().join("out.flac");

        let transcoder = Transcoder::new(TranscodeConfig {
            command: transcoder_bin.to_string_lossy().into_owned(),
            timeout: Duration::from_secs(5),
        });
        let err = transcoder
            .transcode(&input, &output, AudioFormat::Flac)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Provider { .. }));
        assert!(!output.exists());
        // No temp leftovers either.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".flac"))
            .filter(|e| e.path() != output)
            .collect();
        assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_with_cleanup_removes_input() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder_bin = stub_transcoder(dir.path(), "printf fLaCdata > \"$out\"");
        let input = dir.path().join("in.mp3");
        std::fs::write(&input, b"ID3fake").unwrap();
        let output = dir.path().join("out.flac");

        let transcoder = Transcoder::new(TranscodeConfig {
            command: transcoder_bin.to_string_lossy().into_owned(),
            timeout: Duration::from_secs(5),
        });
        transcoder
            .convert_with_cleanup(&input, &output, AudioFormat::Flac)
            .await
            .unwrap();
        assert!(!input.exists());
        assert!(output.exists());
    }
}
