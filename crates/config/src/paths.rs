//! On-disk locations under the user config root.

use std::path::PathBuf;

/// Root directory for configuration and journals: `~/.config/tts` on Linux,
/// the platform equivalent elsewhere. Falls back to the working directory
/// when the platform reports no config dir (containers, bare init systems).
pub fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tts")
}

/// Directory holding document parse cache entries, one JSON file per key.
pub fn document_cache_dir() -> PathBuf {
    config_root().join("documents")
}

/// Journal file recording loaded voice references across restarts.
pub fn voice_journal_path() -> PathBuf {
    config_root().join("voices.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_root() {
        let root = config_root();
        assert!(document_cache_dir().starts_with(&root));
        assert!(voice_journal_path().starts_with(&root));
    }
}
