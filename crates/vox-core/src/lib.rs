//! Vox Core crate - shared types, error taxonomy, and configuration.
//!
//! Defines the transcription record model, audio settings, the user-visible
//! pipeline state, and the `VoxError` enum used across all Vox crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiConfig, CaptureConfig, StorageConfig, VoxConfig};
pub use error::{Result, VoxError};
pub use types::*;
