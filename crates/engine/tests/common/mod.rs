//! Shared fixtures for the engine integration tests: a scripted loopback
//! synthesis server and stub decoder/transcoder executables.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use tts_config::Settings;

/// What the fake synthesis server does per accepted command.
#[derive(Clone)]
pub enum Script {
    /// One JSON control frame, then the terminator.
    Json(String),
    /// Audio frames, then the terminator.
    Audio(Vec<Vec<u8>>),
    /// Audio frames, then hold the connection open without terminating.
    AudioStall(Vec<Vec<u8>>),
}

pub async fn spawn_fake_server(
    scripts: Vec<Script>,
) -> (SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let mut scripts = scripts.into_iter();
        let mut current = scripts.next();
        while let Some(script) = current.clone() {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
            // Liveness probes send nothing; skip without consuming a script.
            if line.trim().is_empty() {
                continue;
            }
            received.push(line.trim().to_string());

            let mut stream = reader.into_inner();
            match &script {
                Script::Json(body) => {
                    let bytes = body.as_bytes();
                    let _ = stream.write_all(&(bytes.len() as u32).to_be_bytes()).await;
                    let _ = stream.write_all(bytes).await;
                    let _ = stream.write_all(&0u32.to_be_bytes()).await;
                }
                Script::Audio(frames) => {
                    for frame in frames {
                        let _ = stream.write_all(&(frame.len() as u32).to_be_bytes()).await;
                        let _ = stream.write_all(frame).await;
                    }
                    let _ = stream.write_all(&0u32.to_be_bytes()).await;
                }
                Script::AudioStall(frames) => {
                    for frame in frames {
                        let _ = stream.write_all(&(frame.len() as u32).to_be_bytes()).await;
                        let _ = stream.write_all(frame).await;
                    }
                    let _ = stream.flush().await;
                    // Hold the connection; the client must cancel its way out.
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                }
            }
            let _ = stream.flush().await;
            current = scripts.next();
        }
        received
    });
    (addr, handle)
}

/// Write an executable shell stub. The body sees the stub's arguments.
#[cfg(unix)]
pub fn stub_executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{body}").unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A decoder stub that copies its stdin into `capture`.
#[cfg(unix)]
pub fn stub_stream_decoder(dir: &Path, capture: &Path) -> PathBuf {
    stub_executable(dir, "stub-decoder", &format!("cat > {}", capture.display()))
}

/// A decoder stub that copies the file named by its last argument into
/// `capture` (the `play_file` invocation shape ends with the source path).
#[cfg(unix)]
pub fn stub_file_decoder(dir: &Path, capture: &Path) -> PathBuf {
    stub_executable(
        dir,
        "stub-file-decoder",
        &format!("for last; do :; done\ncat \"$last\" > {}", capture.display()),
    )
}

/// A transcoder stub producing a FLAC-signature file at the `-y` target.
#[cfg(unix)]
pub fn stub_transcoder(dir: &Path) -> PathBuf {
    stub_executable(
        dir,
        "stub-transcoder",
        "in=$2\nout=$4\nprintf 'fLaC' > \"$out\"\ncat \"$in\" >> \"$out\"",
    )
}

/// Settings wired to temp paths; callers overlay endpoints and tools.
pub fn test_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.document.cache_dir = Some(dir.join("doc-cache"));
    settings.local_server.journal_path = Some(dir.join("voices.json"));
    settings.defaults.output_dir = Some(dir.join("out"));
    settings
}

pub fn settings_with_local(dir: &Path, addr: SocketAddr) -> Arc<Settings> {
    let mut settings = test_settings(dir);
    settings.local_server.host = addr.ip().to_string();
    settings.local_server.port = addr.port();
    Arc::new(settings)
}
