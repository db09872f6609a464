use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Vox pipeline.
///
/// Loaded from `~/.vox/config.toml` by default. Each section corresponds to a
/// pipeline component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
}

impl VoxConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VoxConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Speech-to-text and spell-check API settings.
///
/// The language lives here rather than in ambient mutable state; it is passed
/// into the client at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Transcription endpoint (multipart upload).
    pub transcription_url: String,
    /// Chat-completion endpoint used for spell checking.
    pub chat_url: String,
    /// Bearer token. Empty means "read from the VOX_API_KEY environment variable".
    pub api_key: String,
    /// Transcription model identifier.
    pub model: String,
    /// Chat model used for spell checking.
    pub chat_model: String,
    /// Transcription language hint.
    pub language: String,
    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum upload attempts before surfacing a terminal failure.
    pub max_attempts: u32,
    /// First retry delay in seconds; doubles on each subsequent attempt.
    pub backoff_base_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            transcription_url: "https://api.groq.com/openai/v1/audio/transcriptions".to_string(),
            chat_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "whisper-large-v3-turbo".to_string(),
            chat_model: "mixtral-8x7b-32768".to_string(),
            language: "en".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            backoff_base_secs: 2,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for history, settings, and permanent audio storage.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.vox/data".to_string(),
        }
    }
}

/// Audio capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between elapsed-time preview updates, in milliseconds.
    pub preview_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preview_interval_ms: 500,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
