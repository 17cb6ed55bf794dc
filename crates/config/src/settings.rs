//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{paths, ConfigError};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Synthesis defaults
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Per-provider API keys
    #[serde(default)]
    pub keys: ApiKeys,

    /// External decoder/transcoder tools
    #[serde(default)]
    pub audio: AudioConfig,

    /// Local neural synthesis server
    #[serde(default)]
    pub local_server: LocalServerConfig,

    /// Document processing configuration
    #[serde(default)]
    pub document: DocumentConfig,

    /// Operation timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Provider endpoint overrides (tests point these at mock servers)
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "local_server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.timeouts.http_connect_s == 0 || self.timeouts.http_read_s == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeouts".to_string(),
                message: "HTTP timeouts must be non-zero".to_string(),
            });
        }
        if let Some(rate) = &self.defaults.rate {
            if rate.parse::<f64>().is_err() && !rate.ends_with('%') {
                return Err(ConfigError::InvalidValue {
                    field: "defaults.rate".to_string(),
                    message: format!("could not parse '{rate}' as a rate adjustment"),
                });
            }
        }
        Ok(())
    }

    /// API key for a provider, falling back to the conventional environment
    /// variables when the config file carries none.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let configured = match provider {
            "openai" => self.keys.openai.clone(),
            "elevenlabs" => self.keys.elevenlabs.clone(),
            "google" => self.keys.google.clone(),
            _ => None,
        };
        configured.or_else(|| {
            let vars: &[&str] = match provider {
                "openai" => &["OPENAI_API_KEY"],
                "elevenlabs" => &["ELEVENLABS_API_KEY", "ELEVEN_API_KEY"],
                "google" => &["GOOGLE_API_KEY"],
                _ => &[],
            };
            vars.iter().find_map(|var| std::env::var(var).ok())
        })
    }

    /// Directory for document cache entries.
    pub fn document_cache_dir(&self) -> PathBuf {
        self.document
            .cache_dir
            .clone()
            .unwrap_or_else(paths::document_cache_dir)
    }

    /// Path of the voice cache journal.
    pub fn voice_journal_path(&self) -> PathBuf {
        self.local_server
            .journal_path
            .clone()
            .unwrap_or_else(paths::voice_journal_path)
    }
}

/// Synthesis defaults applied when a request leaves a field unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default voice spec, e.g. "edge:en-US-JennyNeural"
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: String,

    /// Default output directory for saved audio
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Default rate adjustment (e.g. "+10%"), unset when absent
    #[serde(default)]
    pub rate: Option<String>,

    /// Default pitch adjustment (e.g. "-5Hz"), unset when absent
    #[serde(default)]
    pub pitch: Option<String>,
}

fn default_voice() -> String {
    "edge:en-US-JennyNeural".to_string()
}
fn default_format() -> String {
    "mp3".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            format: default_format(),
            output_dir: None,
            rate: None,
            pitch: None,
        }
    }
}

/// Per-provider API keys. Prefer environment variables for secrets; these
/// fields exist so a config file can carry them on single-user machines.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeys {
    #[serde(default)]
    pub openai: Option<String>,

    #[serde(default)]
    pub elevenlabs: Option<String>,

    #[serde(default)]
    pub google: Option<String>,

    /// Path to a Google service-account JSON file. Wins over the API key
    /// when both are configured.
    #[serde(default)]
    pub google_service_account: Option<PathBuf>,
}

/// External audio tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Decoder-player command (consumes encoded audio, plays PCM)
    #[serde(default = "default_decoder")]
    pub decoder: String,

    /// Transcoder command for container conversions
    #[serde(default = "default_transcoder")]
    pub transcoder: String,
}

fn default_decoder() -> String {
    "ffplay".to_string()
}
fn default_transcoder() -> String {
    "ffmpeg".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            decoder: default_decoder(),
            transcoder: default_transcoder(),
        }
    }
}

/// Local neural synthesis server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Command used to start the server when it is not running
    #[serde(default = "default_server_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds to wait for the server to accept connections after spawning
    #[serde(default = "default_server_startup")]
    pub startup_timeout_s: u64,

    /// Seconds between liveness polls during startup
    #[serde(default = "default_server_poll")]
    pub poll_interval_s: u64,

    /// Override for the voice cache journal location
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    12345
}
fn default_server_command() -> String {
    "tts-neural-server".to_string()
}
fn default_server_startup() -> u64 {
    30
}
fn default_server_poll() -> u64 {
    1
}

impl Default for LocalServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            command: default_server_command(),
            args: Vec::new(),
            startup_timeout_s: default_server_startup(),
            poll_interval_s: default_server_poll(),
            journal_path: None,
        }
    }
}

/// Document processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Enable the content-addressed parse cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Override for the cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Target speech markup platform: azure, google, amazon, or generic
    #[serde(default = "default_ssml_platform")]
    pub ssml_platform: String,

    /// Emotion profile: auto, technical, marketing, narrative, tutorial
    #[serde(default = "default_emotion_profile")]
    pub emotion_profile: String,
}

fn default_ssml_platform() -> String {
    "generic".to_string()
}
fn default_emotion_profile() -> String {
    "auto".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_dir: None,
            ssml_platform: default_ssml_platform(),
            emotion_profile: default_emotion_profile(),
        }
    }
}

/// Operation timeouts, in seconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_http_connect")]
    pub http_connect_s: u64,

    #[serde(default = "default_http_read")]
    pub http_read_s: u64,

    /// Decoder process startup
    #[serde(default = "default_decoder_startup")]
    pub decoder_startup_s: u64,

    /// Decoder drain after the stream writer closes
    #[serde(default = "default_decoder_drain")]
    pub decoder_drain_s: u64,

    /// Transcoder invocation
    #[serde(default = "default_transcode")]
    pub transcode_s: u64,
}

fn default_http_connect() -> u64 {
    10
}
fn default_http_read() -> u64 {
    30
}
fn default_decoder_startup() -> u64 {
    2
}
fn default_decoder_drain() -> u64 {
    5
}
fn default_transcode() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            http_connect_s: default_http_connect(),
            http_read_s: default_http_read(),
            decoder_startup_s: default_decoder_startup(),
            decoder_drain_s: default_decoder_drain(),
            transcode_s: default_transcode(),
        }
    }
}

/// Authoritative provider endpoints. Overridable so tests can point a
/// provider at a mock server; production deployments leave these alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_openai_endpoint")]
    pub openai: String,

    #[serde(default = "default_elevenlabs_endpoint")]
    pub elevenlabs: String,

    #[serde(default = "default_google_endpoint")]
    pub google: String,

    #[serde(default = "default_google_token_endpoint")]
    pub google_token: String,

    #[serde(default = "default_edge_wss_endpoint")]
    pub edge_wss: String,

    #[serde(default = "default_edge_voices_endpoint")]
    pub edge_voices: String,
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_elevenlabs_endpoint() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}
fn default_google_endpoint() -> String {
    "https://texttospeech.googleapis.com/v1".to_string()
}
fn default_google_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_edge_wss_endpoint() -> String {
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1".to_string()
}
fn default_edge_voices_endpoint() -> String {
    "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list"
        .to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            openai: default_openai_endpoint(),
            elevenlabs: default_elevenlabs_endpoint(),
            google: default_google_endpoint(),
            google_token: default_google_token_endpoint(),
            edge_wss: default_edge_wss_endpoint(),
            edge_voices: default_edge_voices_endpoint(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (TTS_ prefix, `__` separator)
/// 2. An explicit config file path, when given
/// 3. `config.toml` / `config.yaml` under the user config root
pub fn load_settings(config_file: Option<&std::path::Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let root = paths::config_root();
    builder = builder.add_source(
        File::with_name(&root.join("config").to_string_lossy())
            .required(false),
    );

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        builder = builder.add_source(File::from(path.to_path_buf()));
    }

    builder = builder.add_source(
        Environment::with_prefix("TTS")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.local_server.port, 12345);
        assert_eq!(settings.audio.decoder, "ffplay");
        assert_eq!(settings.defaults.format, "mp3");
        assert!(settings.document.cache_enabled);
        assert_eq!(settings.timeouts.decoder_startup_s, 2);
        assert_eq!(settings.timeouts.transcode_s, 30);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.local_server.port = 0;
        assert!(settings.validate().is_err());

        settings.local_server.port = 12345;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[defaults]\nvoice = \"openai:nova\"\nformat = \"wav\"").unwrap();
        writeln!(file, "[local_server]\nport = 23456").unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.defaults.voice, "openai:nova");
        assert_eq!(settings.defaults.format, "wav");
        assert_eq!(settings.local_server.port, 23456);
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let err = load_settings(Some(std::path::Path::new("/no/such/config.toml")));
        assert!(matches!(err, Err(ConfigError::FileNotFound(_))));
    }
}
