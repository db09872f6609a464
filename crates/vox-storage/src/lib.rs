//! Vox Storage crate - key-value JSON persistence for transcription history
//! and audio settings, plus audio file placement and deletion.
//!
//! Two documents live under the data directory: `history.json` (the full
//! record collection, rewritten on every mutation) and `audio_settings.json`.
//! Permanent audio assets live under `<data_dir>/audio/`.

pub mod store;

pub use store::TranscriptionStore;
