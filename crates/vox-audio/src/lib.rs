//! Vox Audio crate - microphone recording lifecycle, elapsed-time preview,
//! and lifecycle-linked playback.
//!
//! Provides a trait-based abstraction over the recording device plus a mock
//! implementation for testing without real audio hardware. At most one
//! recording session is active at a time; the preview ticker spawned by
//! `start_recording` is cancelled on stop or cleanup.

pub mod backend;
pub mod capture;

pub use backend::{MockBackend, RecordingBackend};
pub use capture::{format_elapsed, AudioCapture, PreviewFn};
