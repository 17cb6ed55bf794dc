//! Local synthesis server lifecycle and wire protocol
//!
//! The server is a persistent out-of-process model host on a TCP port.
//! Requests are JSON lines; every response is a sequence of length-prefixed
//! (u32 big-endian) binary frames terminated by an empty frame. Control
//! operations answer with a single JSON frame; synthesis answers with raw
//! audio chunks.

use parking_lot::Mutex;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info};

use tts_config::Settings;
use tts_core::{ByteSink, CancelToken, Result, TtsError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const FRAME_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on a single frame; anything larger is a protocol violation.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Handle to the local synthesis server: liveness probing, on-demand spawn,
/// and request framing. The server process is intentionally not killed when
/// the handle drops; it outlives invocations so repeat syntheses stay warm.
pub struct ServerHandle {
    host: String,
    port: u16,
    command: String,
    args: Vec<String>,
    startup_timeout: Duration,
    poll_interval: Duration,
    child: Mutex<Option<tokio::process::Child>>,
}

impl ServerHandle {
    pub fn from_settings(settings: &Settings) -> Self {
        let cfg = &settings.local_server;
        Self {
            host: cfg.host.clone(),
            port: cfg.port,
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            startup_timeout: Duration::from_secs(cfg.startup_timeout_s),
            poll_interval: Duration::from_secs(cfg.poll_interval_s.max(1)),
            child: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection probe with a short timeout.
    pub async fn is_running(&self) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(self.endpoint())).await,
            Ok(Ok(_))
        )
    }

    /// Make sure the server accepts connections, spawning and polling it
    /// when absent.
    pub async fn ensure_running(&self, cancel: &CancelToken) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }

        info!(command = %self.command, "starting local synthesis server");
        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TtsError::Dependency(format!(
                        "local synthesis server '{}' not found",
                        self.command
                    ))
                } else {
                    TtsError::Dependency(format!("could not start synthesis server: {e}"))
                }
            })?;
        *self.child.lock() = Some(child);

        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TtsError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if self.is_running().await {
                info!("local synthesis server is up");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TtsError::Dependency(format!(
                    "synthesis server did not come up within {}s",
                    self.startup_timeout.as_secs()
                )));
            }
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(self.endpoint()))
            .await
            .map_err(|_| TtsError::Network("local server: connect timed out".into()))?
            .map_err(|e| TtsError::Network(format!("local server: connect failed: {e}")))
    }

    async fn send_command(&self, stream: &mut TcpStream, command: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(command)
            .map_err(|e| TtsError::Internal(format!("could not encode server command: {e}")))?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .await
            .map_err(|e| TtsError::Network(format!("local server: write failed: {e}")))
    }

    /// Issue a control command and return its JSON reply.
    pub async fn request_json(&self, command: &Value, cancel: &CancelToken) -> Result<Value> {
        let mut stream = self.connect().await?;
        self.send_command(&mut stream, command).await?;

        let first = tokio::select! {
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            frame = read_frame(&mut stream) => frame?,
        };
        let payload = first.ok_or_else(|| {
            TtsError::provider("local server: empty reply to control command")
        })?;
        // Drain up to the terminator so the connection ends cleanly.
        while read_frame(&mut stream).await?.is_some() {}

        let reply: Value = serde_json::from_slice(&payload)
            .map_err(|e| TtsError::provider(format!("local server: malformed reply: {e}")))?;
        check_reply_status(&reply)?;
        Ok(reply)
    }

    /// Issue a synthesis command, forwarding audio frames to `sink` in
    /// production order. Returns the audio byte count.
    pub async fn request_stream(
        &self,
        command: &Value,
        sink: &mut dyn ByteSink,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut stream = self.connect().await?;
        self.send_command(&mut stream, command).await?;

        let mut total = 0u64;
        let mut first = true;
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Err(TtsError::Cancelled),
                frame = read_frame(&mut stream) => frame?,
            };
            let Some(payload) = frame else { break };

            // An error surfaces as a single JSON frame in place of audio.
            if first && payload.first() == Some(&b'{') {
                if let Ok(reply) = serde_json::from_slice::<Value>(&payload) {
                    check_reply_status(&reply)?;
                }
            } else {
                sink.write_chunk(&payload).await?;
                total += payload.len() as u64;
            }
            first = false;
        }

        if total == 0 {
            return Err(TtsError::provider("local server: synthesis produced no audio"));
        }
        debug!(bytes = total, "local synthesis streamed");
        Ok(total)
    }
}

fn check_reply_status(reply: &Value) -> Result<()> {
    match reply.get("status").and_then(Value::as_str) {
        Some("ok") | None => Ok(()),
        Some(_) => {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error");
            Err(TtsError::provider(format!("local server: {message}")))
        }
    }
}

/// Read one length-prefixed frame; `None` is the empty terminator frame.
async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    tokio::time::timeout(FRAME_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| TtsError::Network("local server: read timed out".into()))?
        .map_err(|e| TtsError::Network(format!("local server: read failed: {e}")))?;

    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_FRAME_LEN {
        return Err(TtsError::provider(format!(
            "local server: oversized frame ({len} bytes)"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    tokio::time::timeout(FRAME_TIMEOUT, stream.read_exact(&mut payload))
        .await
        .map_err(|_| TtsError::Network("local server: read timed out".into()))?
        .map_err(|e| TtsError::Network(format!("local server: read failed: {e}")))?;
    Ok(Some(payload))
}


#[cfg(test)]
mod tests {
    use super::test_support::{handle_for, spawn_fake_server, Script};
    use super::*;
    use serde_json::json;
    use tts_core::BufferSink;

    #[tokio::test]
    async fn test_control_round_trip() {
        let (addr, server) = spawn_fake_server(vec![Script::Json(
            r#"{"status":"ok","token":"tok-1"}"#.to_string(),
        )])
        .await;
        let handle = handle_for(addr);

        let reply = handle
            .request_json(&json!({"op": "load_voice", "path": "/v.wav"}), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(reply["token"], "tok-1");

        let received = server.await.unwrap();
        assert!(received[0].contains("load_voice"));
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_provider_error() {
        let (addr, _server) = spawn_fake_server(vec![Script::Json(
            r#"{"status":"error","error":"no such voice"}"#.to_string(),
        )])
        .await;
        let handle = handle_for(addr);

        let err = handle
            .request_json(&json!({"op": "load_voice"}), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Provider { .. }));
        assert!(err.to_string().contains("no such voice"));
    }

    #[tokio::test]
    async fn test_stream_frames_arrive_in_order() {
        let (addr, _server) = spawn_fake_server(vec![Script::Audio(vec![
            b"RIFF".to_vec(),
            b"chunk2".to_vec(),
            b"chunk3".to_vec(),
        ])])
        .await;
        let handle = handle_for(addr);

        let mut sink = BufferSink::new();
        let total = handle
            .request_stream(&json!({"op": "synthesize"}), &mut sink, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(total, 14);
        assert_eq!(sink.bytes(), b"RIFFchunk2chunk3");
        assert_eq!(sink.chunk_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_error_frame() {
        let (addr, _server) = spawn_fake_server(vec![Script::Json(
            r#"{"status":"error","error":"model not loaded"}"#.to_string(),
        )])
        .await;
        let handle = handle_for(addr);

        let mut sink = BufferSink::new();
        let err = handle
            .request_stream(&json!({"op": "synthesize"}), &mut sink, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_missing_server_command_is_dependency_error() {
        let mut settings = Settings::default();
        settings.local_server.command = "definitely-not-a-server".to_string();
        settings.local_server.port = 1;
        settings.local_server.startup_timeout_s = 1;
        let handle = ServerHandle::from_settings(&settings);

        let err = handle.ensure_running(&CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, TtsError::Dependency(_)));
    }
}
