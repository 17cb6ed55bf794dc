//! Shared HTTP plumbing for the network providers.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use async_trait::async_trait;
use tts_config::Settings;
use tts_core::{ByteSink, CancelToken, Result, TtsError};

/// Build a client with the configured connect/read timeouts.
pub(crate) fn build_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.timeouts.http_connect_s))
        .read_timeout(Duration::from_secs(settings.timeouts.http_read_s))
        .build()
        .map_err(|e| TtsError::Internal(format!("could not build HTTP client: {e}")))
}

/// Map a transport-level failure onto the error taxonomy.
pub(crate) fn net_err(provider: &str, e: reqwest::Error) -> TtsError {
    if e.is_decode() || e.is_body() {
        TtsError::provider(format!("{provider}: malformed response: {e}"))
    } else {
        TtsError::Network(format!("{provider}: {e}"))
    }
}

/// Pass a successful response through, or map the status onto the taxonomy
/// with the response body as detail.
pub(crate) async fn check_status(
    resp: reqwest::Response,
    provider: &str,
    key_hint: &str,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TtsError::from_status(status.as_u16(), &body, provider, key_hint))
}

/// Pipe response body chunks into the sink in arrival order, checking for
/// cancellation between reads. Returns the byte count.
pub(crate) async fn stream_response(
    mut resp: reqwest::Response,
    sink: &mut dyn ByteSink,
    cancel: &CancelToken,
    provider: &str,
) -> Result<u64> {
    let mut total = 0u64;
    let mut chunks = 0u64;
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            chunk = resp.chunk() => chunk.map_err(|e| net_err(provider, e))?,
        };
        match chunk {
            Some(bytes) => {
                sink.write_chunk(&bytes).await?;
                total += bytes.len() as u64;
                chunks += 1;
            }
            None => break,
        }
    }
    debug!(provider, chunks, bytes = total, "response streamed");
    Ok(total)
}

/// A byte sink writing into a temporary sibling of the target path; the
/// file appears at the target only on [`FileCollector::finalize`], so a
/// failed synthesis never leaves a partial output.
pub(crate) struct FileCollector {
    temp: PathBuf,
    target: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileCollector {
    pub(crate) async fn create(target: &Path) -> Result<Self> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    TtsError::Internal(format!("could not create output directory: {e}"))
                })?;
            }
        }
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio");
        let temp = target.with_file_name(format!(".{name}.{}", Uuid::new_v4().simple()));
        let file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| TtsError::Internal(format!("could not create output file: {e}")))?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
            file: Some(file),
        })
    }

    /// Flush, close, and atomically move the audio into place.
    pub(crate) async fn finalize(mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| TtsError::Internal(format!("could not flush output file: {e}")))?;
        }
        tokio::fs::rename(&self.temp, &self.target)
            .await
            .map_err(|e| TtsError::Internal(format!("could not finalise output file: {e}")))
    }

    /// Remove the temporary file without touching the target.
    pub(crate) async fn discard(mut self) {
        self.file.take();
        let _ = tokio::fs::remove_file(&self.temp).await;
    }
}

#[async_trait]
impl ByteSink for FileCollector {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| TtsError::Internal("file collector already closed".into()))?;
        file.write_all(chunk)
            .await
            .map_err(|e| TtsError::Internal(format!("could not write output file: {e}")))
    }
}

/// Stream a response into `target` atomically, discarding the temp file on
/// any failure or cancellation.
pub(crate) async fn response_to_file(
    resp: reqwest::Response,
    target: &Path,
    cancel: &CancelToken,
    provider: &str,
) -> Result<()> {
    let mut collector = FileCollector::create(target).await?;
    match stream_response(resp, &mut collector, cancel, provider).await {
        Ok(_) => collector.finalize().await,
        Err(e) => {
            collector.discard().await;
            Err(e)
        }
    }
}

/// Write an in-memory payload to `target` atomically.
pub(crate) async fn bytes_to_file(payload: &[u8], target: &Path) -> Result<()> {
    let mut collector = FileCollector::create(target).await?;
    match collector.write_chunk(payload).await {
        Ok(()) => collector.finalize().await,
        Err(e) => {
            collector.discard().await;
            Err(e)
        }
    }
}
