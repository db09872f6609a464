use thiserror::Error;

/// Top-level error type for the Vox pipeline.
///
/// Subsystem crates return this type directly so that the `?` operator works
/// across crate boundaries. Failures that the pipeline is designed to swallow
/// (audio file deletion, playback of a missing asset) are logged at the call
/// site rather than surfaced through this enum.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoxError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("No active recording session")]
    NoActiveSession,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Audio file too large: {size} bytes exceeds {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Spell check failed: {0}")]
    SpellCheck(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VoxError {
    fn from(err: toml::de::Error) -> Self {
        VoxError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VoxError {
    fn from(err: toml::ser::Error) -> Self {
        VoxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(err: serde_json::Error) -> Self {
        VoxError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Vox operations.
pub type Result<T> = std::result::Result<T, VoxError>;
