//! Voice cache manager
//!
//! Registry of voice references preloaded into the local synthesis server.
//! Entries are keyed by a content hash of the reference audio, so the same
//! sample under two paths is one reference and re-loading is a no-op. The
//! entry list (not the audio, not the tokens) is journalled under the user
//! config root; tokens are re-established lazily after a server restart.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use tts_core::voice::CLONE_AUDIO_EXTENSIONS;
use tts_core::{CancelToken, Result, TtsError};

use crate::server::ServerHandle;

/// One preloaded voice reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCacheEntry {
    /// Content hash of the reference audio (hex sha-256).
    pub identity: String,
    pub source_path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    /// Server-side reference token; absent until (re-)established.
    #[serde(skip)]
    pub token: Option<String>,
}

/// In-memory registry of loaded voice references with a JSON journal.
pub struct VoiceCacheManager {
    journal_path: PathBuf,
    entries: RwLock<HashMap<String, VoiceCacheEntry>>,
}

impl VoiceCacheManager {
    pub fn new(journal_path: PathBuf) -> Self {
        let entries = read_journal(&journal_path);
        if !entries.is_empty() {
            debug!(count = entries.len(), "voice journal restored");
        }
        Self {
            journal_path,
            entries: RwLock::new(entries),
        }
    }

    /// Stable identity of a reference sample: hash of its content, not its
    /// path.
    pub fn identity_for(path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| {
            TtsError::voice(
                format!("reference audio '{}' not readable: {e}", path.display()),
                Vec::new(),
            )
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect())
    }

    /// Load reference samples into the server. Idempotent per identity:
    /// content already carrying a live token is skipped.
    pub async fn load(
        &self,
        paths: &[PathBuf],
        server: &ServerHandle,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        let mut identities = Vec::with_capacity(paths.len());
        for path in paths {
            cancel.check()?;
            validate_reference(path)?;
            let identity = Self::identity_for(path)?;

            let already_live = self
                .entries
                .read()
                .get(&identity)
                .is_some_and(|entry| entry.token.is_some());
            if already_live {
                debug!(identity = %&identity[..12], "voice already loaded");
                identities.push(identity);
                continue;
            }

            server.ensure_running(cancel).await?;
            let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
            let reply = server
                .request_json(
                    &json!({ "op": "load_voice", "path": canonical }),
                    cancel,
                )
                .await?;
            let token = reply
                .get("token")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    TtsError::provider("local server: load_voice reply carried no token")
                })?
                .to_string();

            info!(path = %path.display(), "voice reference loaded");
            self.entries.write().insert(
                identity.clone(),
                VoiceCacheEntry {
                    identity: identity.clone(),
                    source_path: path.clone(),
                    loaded_at: Utc::now(),
                    token: Some(token),
                },
            );
            identities.push(identity);
        }
        self.persist();
        Ok(identities)
    }

    /// Remove entries by identity and release their server references.
    pub async fn unload(
        &self,
        paths: &[PathBuf],
        server: &ServerHandle,
        cancel: &CancelToken,
    ) -> Result<usize> {
        let mut removed = 0;
        for path in paths {
            let identity = Self::identity_for(path)?;
            let entry = self.entries.write().remove(&identity);
            let Some(entry) = entry else { continue };
            removed += 1;

            if let Some(token) = entry.token {
                if server.is_running().await {
                    if let Err(e) = server
                        .request_json(&json!({ "op": "unload_voice", "token": token }), cancel)
                        .await
                    {
                        warn!("could not release voice reference: {e}");
                    }
                }
            }
        }
        self.persist();
        Ok(removed)
    }

    /// Drop the whole registry and release every server reference.
    pub async fn unload_all(&self, server: &ServerHandle, cancel: &CancelToken) -> Result<usize> {
        if server.is_running().await {
            if let Err(e) = server.request_json(&json!({ "op": "unload_all" }), cancel).await {
                warn!("could not release voice references: {e}");
            }
        }
        let count = {
            let mut entries = self.entries.write();
            let count = entries.len();
            entries.clear();
            count
        };
        self.persist();
        Ok(count)
    }

    /// Token for a reference sample, if its content is loaded and live.
    /// Total: unreadable paths simply report no token.
    pub fn lookup(&self, path: &Path) -> Option<String> {
        let identity = Self::identity_for(path).ok()?;
        self.entries.read().get(&identity)?.token.clone()
    }

    /// Whether this content has a registry entry (live token or not).
    pub fn contains(&self, path: &Path) -> bool {
        Self::identity_for(path)
            .map(|identity| self.entries.read().contains_key(&identity))
            .unwrap_or(false)
    }

    /// The live registry, oldest first.
    pub fn status(&self) -> Vec<VoiceCacheEntry> {
        let mut entries: Vec<VoiceCacheEntry> =
            self.entries.read().values().cloned().collect();
        entries.sort_by_key(|e| e.loaded_at);
        entries
    }

    /// Token for a sample, loading it on the fly when missing or stale.
    pub async fn token_for(
        &self,
        path: &Path,
        server: &ServerHandle,
        cancel: &CancelToken,
    ) -> Result<String> {
        if let Some(token) = self.lookup(path) {
            return Ok(token);
        }
        self.load(&[path.to_path_buf()], server, cancel).await?;
        self.lookup(path).ok_or_else(|| {
            TtsError::Internal("voice load succeeded but no token was registered".into())
        })
    }

    /// Forget the server-side token for a sample (the entry stays). Used
    /// when the server restarted underneath us; the next `token_for`
    /// re-establishes the reference.
    pub fn invalidate_token(&self, path: &Path) {
        if let Ok(identity) = Self::identity_for(path) {
            if let Some(entry) = self.entries.write().get_mut(&identity) {
                entry.token = None;
            }
        }
    }

    fn persist(&self) {
        let entries = self.status();
        if let Some(parent) = self.journal_path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                warn!("could not create journal directory");
                return;
            }
        }
        let payload = match serde_json::to_vec_pretty(&entries) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("could not serialise voice journal: {e}");
                return;
            }
        };
        let temp = self.journal_path.with_extension("json.tmp");
        if std::fs::write(&temp, payload).is_ok() {
            if let Err(e) = std::fs::rename(&temp, &self.journal_path) {
                warn!("could not write voice journal: {e}");
                let _ = std::fs::remove_file(&temp);
            }
        }
    }
}

fn validate_reference(path: &Path) -> Result<()> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            CLONE_AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false);
    if !supported {
        return Err(TtsError::voice(
            format!(
                "unsupported reference audio '{}'; expected one of: {}",
                path.display(),
                CLONE_AUDIO_EXTENSIONS.join(", ")
            ),
            Vec::new(),
        ));
    }
    Ok(())
}

fn read_journal(path: &Path) -> HashMap<String, VoiceCacheEntry> {
    let Ok(raw) = std::fs::read(path) else {
        return HashMap::new();
    };
    match serde_json::from_slice::<Vec<VoiceCacheEntry>>(&raw) {
        Ok(entries) => entries
            .into_iter()
            .map(|entry| (entry.identity.clone(), entry))
            .collect(),
        Err(e) => {
            warn!(path = %path.display(), "corrupt voice journal ignored: {e}");
            HashMap::new()
        }
    }
}
