//! Vox Engine crate - the transcription orchestrator.
//!
//! Coordinates audio capture, the transcription client, and the persistent
//! store through a strict phase machine: Idle -> Recording -> Processing ->
//! Idle. The phase machine doubles as the single-flight guard; re-entrant
//! start/stop calls are rejected rather than left as unspecified behavior.

pub mod engine;
pub mod phase;
pub mod sink;

pub use engine::TranscriptionEngine;
pub use phase::{EnginePhase, PhaseMachine};
pub use sink::{MockSink, NullSink, TextSink};
