//! Error taxonomy for the TTS engine
//!
//! Every provider and pipeline stage reports failures through [`TtsError`].
//! The orchestrator retries only the classes that [`TtsError::retriable`]
//! reports as transient; everything else surfaces to the caller unchanged.

use thiserror::Error;

/// Result type alias using our error taxonomy
pub type Result<T> = std::result::Result<T, TtsError>;

/// Unified error type for synthesis, playback, and document processing
#[derive(Error, Debug)]
pub enum TtsError {
    /// API authentication failed (401/403, missing or rejected key)
    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        /// Configuration key the user should set to remediate
        hint: Option<String>,
    },

    /// Connectivity, DNS, TLS, or timeout while talking to a backend
    #[error("network error: {0}")]
    Network(String),

    /// Rate limit, payment, or billing problem (429/402/409)
    #[error("quota or billing issue: {message}")]
    Quota {
        message: String,
        hint: Option<String>,
    },

    /// Unknown voice, or a voice used with a capability it does not have
    #[error("voice not available: {message}")]
    Voice {
        message: String,
        /// Nearest matches from the catalogue
        suggestions: Vec<String>,
    },

    /// Requested audio container is not supported by the provider
    #[error("unsupported audio format: {0}")]
    Format(String),

    /// A required external tool or library is missing
    #[error("missing dependency: {0}")]
    Dependency(String),

    /// Upstream provider failure (5xx or malformed response)
    #[error("provider error: {message}")]
    Provider {
        message: String,
        /// Whether the orchestrator may retry this failure
        retriable: bool,
    },

    /// A provider option was unknown or outside its schema
    #[error("invalid option `{field}`: {message}")]
    BadOption {
        field: String,
        message: String,
        suggestions: Vec<String>,
    },

    /// The decoder process failed during playback
    #[error("playback failed: {0}")]
    Playback(String),

    /// The synthesis was cancelled by the caller
    #[error("synthesis cancelled")]
    Cancelled,

    /// Invariant violation; never retried, never suppressed
    #[error("internal error: {0}")]
    Internal(String),
}

impl TtsError {
    /// Whether the orchestrator is allowed to retry after this failure.
    ///
    /// Only transient network faults and retriable upstream errors (5xx)
    /// qualify. Quota errors are deliberately excluded: retrying a billing
    /// rejection burns the account's budget for nothing.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            TtsError::Network(_) | TtsError::Provider { retriable: true, .. }
        )
    }

    /// Map an HTTP status code to the matching error class.
    ///
    /// `detail` is the (possibly truncated) response body, `provider` names
    /// the backend for the message prefix, and `key_hint` is the config key
    /// surfaced on authentication and quota failures.
    pub fn from_status(status: u16, detail: &str, provider: &str, key_hint: &str) -> TtsError {
        let detail = truncate(detail, 200);
        match status {
            401 => TtsError::Authentication {
                message: format!("{provider}: API authentication failed (HTTP 401)"),
                hint: Some(key_hint.to_string()),
            },
            403 => TtsError::Authentication {
                message: format!("{provider}: API access forbidden (HTTP 403)"),
                hint: Some(key_hint.to_string()),
            },
            429 | 402 | 409 => TtsError::Quota {
                message: format!("{provider}: quota or billing issue (HTTP {status}): {detail}"),
                hint: Some(key_hint.to_string()),
            },
            500..=599 => TtsError::Provider {
                message: format!("{provider}: server error (HTTP {status}): {detail}"),
                retriable: true,
            },
            _ => TtsError::Provider {
                message: format!("{provider}: API error (HTTP {status}): {detail}"),
                retriable: false,
            },
        }
    }

    /// Shorthand for a non-retriable provider error.
    pub fn provider(message: impl Into<String>) -> TtsError {
        TtsError::Provider {
            message: message.into(),
            retriable: false,
        }
    }

    /// Shorthand for a voice error with nearest-match suggestions.
    pub fn voice(message: impl Into<String>, suggestions: Vec<String>) -> TtsError {
        TtsError::Voice {
            message: message.into(),
            suggestions,
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Return up to `max` candidates closest to `input`, best first.
///
/// Exact prefixes and substrings rank ahead of edit-distance matches; names
/// further than a third of their length away are dropped.
pub fn suggest(input: &str, candidates: &[&str], max: usize) -> Vec<String> {
    let input_lower = input.to_lowercase();
    let mut scored: Vec<(usize, &str)> = candidates
        .iter()
        .filter_map(|cand| {
            let cand_lower = cand.to_lowercase();
            if cand_lower.starts_with(&input_lower) || cand_lower.contains(&input_lower) {
                return Some((0, *cand));
            }
            let dist = edit_distance(&input_lower, &cand_lower);
            let limit = cand_lower.len().max(input_lower.len()) / 3 + 1;
            (dist <= limit).then_some((dist, *cand))
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(max).map(|(_, c)| c.to_string()).collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
