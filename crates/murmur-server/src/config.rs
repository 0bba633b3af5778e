//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub endpointing: EndpointingConfig,

    #[serde(default)]
    pub asr: AsrConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub music: MusicConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Network configuration for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "murmur_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Endpointing parameters, applied to every recording window.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointingConfig {
    /// Disabling leaves `audio/start_stream` rejected at runtime; devices
    /// must then end recordings explicitly.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Speech probability threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Trailing silence that ends an utterance, in milliseconds.
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u32,

    /// Device audio sample rate in Hz (8000 or 16000).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// RMS amplitude the energy scorer maps to probability 1.0.
    #[serde(default = "default_energy_reference")]
    pub energy_reference: f32,
}

/// Speech-recognition endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_asr_url")]
    pub url: String,
}

/// Speech-synthesis endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// Bearer token, if the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Reasoning model endpoint (Ollama chat API).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,
}

/// Music search-and-transcode helper endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MusicConfig {
    #[serde(default = "default_music_url")]
    pub url: String,
}

/// Per-connection behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle read timeout after which a connection is torn down, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8889
}

fn default_db_path() -> String {
    "murmur.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f32 {
    0.3
}

fn default_min_silence_ms() -> u32 {
    1_000
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_energy_reference() -> f32 {
    0.05
}

fn default_asr_url() -> String {
    "http://127.0.0.1:50000/api/v1/asr".to_string()
}

fn default_tts_url() -> String {
    "http://127.0.0.1:5001/api/v1/speech".to_string()
}

fn default_llm_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_music_url() -> String {
    "http://127.0.0.1:5002/api/v1/music".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    6_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for EndpointingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_threshold(),
            min_silence_ms: default_min_silence_ms(),
            sample_rate: default_sample_rate(),
            energy_reference: default_energy_reference(),
        }
    }
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: default_asr_url(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            api_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
        }
    }
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            url: default_music_url(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `MURMUR_HOST` overrides `server.host`
/// - `MURMUR_PORT` overrides `server.port`
/// - `MURMUR_DB_PATH` overrides `database.path`
/// - `MURMUR_LOG_LEVEL` overrides `logging.level`
/// - `MURMUR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `MURMUR_ASR_URL`, `MURMUR_TTS_URL`, `MURMUR_TTS_API_KEY`,
///   `MURMUR_LLM_URL`, `MURMUR_LLM_MODEL`, `MURMUR_MUSIC_URL` override the
///   matching capability endpoints
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("MURMUR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("MURMUR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("MURMUR_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("MURMUR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("MURMUR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(url) = std::env::var("MURMUR_ASR_URL") {
        config.asr.url = url;
    }
    if let Ok(url) = std::env::var("MURMUR_TTS_URL") {
        config.tts.url = url;
    }
    if let Ok(key) = std::env::var("MURMUR_TTS_API_KEY") {
        config.tts.api_key = Some(key);
    }
    if let Ok(url) = std::env::var("MURMUR_LLM_URL") {
        config.llm.base_url = url;
    }
    if let Ok(model) = std::env::var("MURMUR_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(url) = std::env::var("MURMUR_MUSIC_URL") {
        config.music.url = url;
    }

    Ok(config)
}
