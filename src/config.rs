//! Configuration management for granny-news.
//!
//! Loads config from YAML files in standard locations. API keys are never
//! read from the YAML file; they come from the environment (optionally
//! seeded from a `.env` file) and are held as secrets.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::speech::BackendKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound request timeout for upstream APIs, in seconds.
    pub upstream_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8888,
            upstream_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub query: String,
    pub language: String,
    pub page_size: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".into(),
            query: r#"("XR" OR "Extended Reality" OR "AR" OR "VR" AND "AI") -addicted2success.com"#
                .into(),
            language: "en".into(),
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub default_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            temperature: 0.7,
            system_prompt:
                "You are a sassy tech-savvy grandma who reads XR/AI news and chats with users."
                    .into(),
            default_prompt: "What's new in AI and XR today?".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".into(),
            voice_id: "JYX3xP3PaX9s5iYt6Uzk".into(),
            model_id: "eleven_monolingual_v1".into(),
            stability: 0.3,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalVoiceConfig {
    /// Synthesizer executable (espeak-ng, espeak, say, ...).
    pub command: String,
    /// Substrings matched against voice names, in priority order.
    pub preferred_voices: Vec<String>,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for LocalVoiceConfig {
    fn default() -> Self {
        Self {
            command: "espeak-ng".into(),
            preferred_voices: vec![
                "Google UK English".into(),
                "Daniel".into(),
                "en-gb".into(),
            ],
            rate: 0.9,
            pitch: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Base URL of the proxy service the reader talks to.
    pub api_base: String,
    pub backend: BackendKind,
    /// Minimum seconds between two `ask` questions.
    pub ask_cooldown: u64,
    pub local: LocalVoiceConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8888".into(),
            backend: BackendKind::Remote,
            ask_cooldown: 5,
            local: LocalVoiceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub news: NewsConfig,
    pub chat: ChatConfig,
    pub tts: TTSConfig,
    pub reader: ReaderConfig,
}

impl Config {
    /// Load configuration, falling back to defaults when nothing usable is found.
    ///
    /// An explicit `path` wins; otherwise the first existing file among
    /// ./config.yaml, ~/.config/granny-news/config.yaml and
    /// /etc/granny-news/config.yaml is used.
    pub fn load(path: Option<&Path>) -> Self {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => first_existing(candidate_paths()),
        };
        let Some(config_path) = found else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Config locations in priority order: working directory, user config, system.
fn candidate_paths() -> Vec<PathBuf> {
    [
        std::env::current_dir().ok().map(|d| d.join("config.yaml")),
        dirs::home_dir().map(|h| h.join(".config/granny-news/config.yaml")),
        Some(PathBuf::from("/etc/granny-news/config.yaml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.is_file())
}

/// Upstream API credentials, read from the environment.
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub news: Option<SecretString>,
    pub openai: Option<SecretString>,
    pub elevenlabs: Option<SecretString>,
    /// Separate key with the `user_read` scope, used for the credits lookup.
    pub elevenlabs_user: Option<SecretString>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env loaded: {e}");
        }

        let read = |name: &str| {
            let key = std::env::var(name).ok().filter(|v| !v.trim().is_empty());
            info!("{name}: {}", if key.is_some() { "present" } else { "missing" });
            key.map(SecretString::from)
        };

        Self {
            news: read("NEWS_API_KEY"),
            openai: read("OPENAI_API_KEY"),
            elevenlabs: read("ELEVENLABS_API_KEY"),
            elevenlabs_user: read("ELEVENLABS_USER_API_KEY"),
        }
    }
}
