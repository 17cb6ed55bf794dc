//! Content-addressed cache of document parse results
//!
//! One JSON file per key under a cache directory. This is a correctness
//! cache: a hit must be observationally indistinguishable from a fresh
//! parse, and eviction is manual (`clear`). The value format is JSON on
//! purpose; binary-serialised cache files from earlier tooling are a
//! deserialization hazard and are never read, only deleted.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use tts_core::{Result, TtsError};

use crate::element::AnnotatedElement;

/// Extension of valid cache entries.
const ENTRY_EXT: &str = "json";
/// Extension the legacy binary-pickle cache used.
const LEGACY_EXT: &str = "result";

/// Content-addressed store of annotated element sequences.
#[derive(Debug, Clone)]
pub struct DocumentCache {
    dir: PathBuf,
}

impl DocumentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache key: hash of the normalised content bytes and every option
    /// that affects the parse result.
    pub fn key(content: &str, format_hint: &str, ssml_platform: &str, emotion_profile: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update([0]);
        hasher.update(format_hint.as_bytes());
        hasher.update([0]);
        hasher.update(ssml_platform.as_bytes());
        hasher.update([0]);
        hasher.update(emotion_profile.as_bytes());
        hex(&hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }

    /// Fetch a cached parse result.
    ///
    /// Corrupt entries are removed and reported as a miss. A legacy binary
    /// entry for the same key is deleted on sight and never deserialised.
    pub fn get(&self, key: &str) -> Option<Vec<AnnotatedElement>> {
        let legacy = self.dir.join(format!("{key}.{LEGACY_EXT}"));
        if legacy.exists() {
            warn!(path = %legacy.display(), "removing legacy binary cache entry");
            let _ = fs::remove_file(&legacy);
        }

        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice::<Vec<AnnotatedElement>>(&raw) {
            Ok(elements) => {
                debug!(key, "document cache hit");
                Some(elements)
            }
            Err(e) => {
                warn!(key, "corrupt cache entry removed: {e}");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Store a parse result atomically (temp file + rename).
    pub fn put(&self, key: &str, value: &[AnnotatedElement]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| TtsError::Internal(format!("could not create cache dir: {e}")))?;

        let payload = serde_json::to_vec_pretty(value)
            .map_err(|e| TtsError::Internal(format!("could not serialise cache entry: {e}")))?;

        let path = self.entry_path(key);
        let temp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&temp, payload)
            .map_err(|e| TtsError::Internal(format!("could not write cache entry: {e}")))?;
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            TtsError::Internal(format!("could not finalise cache entry: {e}"))
        })?;
        debug!(key, "document cache entry written");
        Ok(())
    }

    /// Delete every cache entry, legacy files included. Returns the number
    /// of files removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(TtsError::Internal(format!("could not list cache dir: {e}"))),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "document cache cleared");
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{b:02x}"));
    }
    out
}
