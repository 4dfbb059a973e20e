//! Configuration management for Fluency.
//!
//! Loads settings from `~/.config/fluency/config.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Daily AI call ceilings (single source of truth)
pub const DEFAULT_ANONYMOUS_DAILY: u32 = 5;
pub const DEFAULT_AUTHENTICATED_DAILY: u32 = 50;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_chat_messages")]
    pub max_chat_messages: usize,
    #[serde(default)]
    pub feedback_stream: StreamMode,
}

/// How an AI endpoint hands the upstream event stream back to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Re-emit `data: {"text": ...}` events followed by `data: [DONE]`.
    #[default]
    Reframe,
    /// Forward upstream bytes untouched.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_anonymous_daily")]
    pub anonymous_daily: u32,
    #[serde(default = "default_authenticated_daily")]
    pub authenticated_daily: u32,
    #[serde(default)]
    pub store: CounterStoreKind,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

/// Backing store for authenticated usage counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterStoreKind {
    #[default]
    Memory,
    Sqlite,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentConfig {
    #[serde(default = "default_content_root")]
    pub root: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_verbosity")]
    pub log_verbosity: LogVerbosity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 3000 }
fn default_base_url() -> String { "https://api.anthropic.com".to_string() }
fn default_model() -> String { "claude-3-5-haiku-20241022".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_api_version() -> String { "2023-06-01".to_string() }
fn default_max_chat_messages() -> usize { 20 }
fn default_anonymous_daily() -> u32 { DEFAULT_ANONYMOUS_DAILY }
fn default_authenticated_daily() -> u32 { DEFAULT_AUTHENTICATED_DAILY }
fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fluency")
        .join("usage.db")
}
fn default_content_root() -> PathBuf { PathBuf::from("content") }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_verbosity() -> LogVerbosity { LogVerbosity::Compact }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
            max_chat_messages: default_max_chat_messages(),
            feedback_stream: StreamMode::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            anonymous_daily: DEFAULT_ANONYMOUS_DAILY,
            authenticated_daily: DEFAULT_AUTHENTICATED_DAILY,
            store: CounterStoreKind::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: default_content_root(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            log_verbosity: default_verbosity(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fluency")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                self.upstream.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = Some(key);
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase.service_key = Some(key);
        }
        if let Ok(root) = std::env::var("FLUENCY_CONTENT_ROOT") {
            self.content.root = PathBuf::from(root);
        }
        if let Ok(val) = std::env::var("FLUENCY_ANONYMOUS_DAILY") {
            if let Ok(limit) = val.parse() {
                self.limits.anonymous_daily = limit;
            }
        }
        if let Ok(val) = std::env::var("FLUENCY_AUTHENTICATED_DAILY") {
            if let Ok(limit) = val.parse() {
                self.limits.authenticated_daily = limit;
            }
        }
        // FLUENCY_MODE wins over NODE_ENV when both are set
        if std::env::var("NODE_ENV").as_deref() == Ok("development") {
            self.app.mode = RunMode::Development;
        }
        match std::env::var("FLUENCY_MODE").as_deref() {
            Ok("development") => self.app.mode = RunMode::Development,
            Ok("production") => self.app.mode = RunMode::Production,
            _ => {}
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }

    pub fn is_development(&self) -> bool {
        self.app.mode == RunMode::Development
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
