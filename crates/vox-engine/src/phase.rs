//! Engine phase machine.
//!
//! The phase machine is the single-flight guard for the pipeline: exactly one
//! recording or processing flow may run at a time, and every flow entry point
//! claims its phase through `transition` before touching any shared state.

use std::fmt;
use std::sync::{Arc, Mutex};

use vox_core::error::{Result, VoxError};

/// The engine's lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    /// No recording or processing is in flight.
    #[default]
    Idle,
    /// The microphone is open and a session is capturing audio.
    Recording,
    /// Async work (upload, spell check, file transcription) is in flight.
    Processing,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "Idle"),
            EnginePhase::Recording => write!(f, "Recording"),
            EnginePhase::Processing => write!(f, "Processing"),
        }
    }
}

impl EnginePhase {
    /// Whether a direct transition to `next` is legal.
    pub fn can_transition_to(&self, next: EnginePhase) -> bool {
        matches!(
            (self, next),
            (EnginePhase::Idle, EnginePhase::Recording)
                | (EnginePhase::Idle, EnginePhase::Processing)
                | (EnginePhase::Recording, EnginePhase::Processing)
                | (EnginePhase::Recording, EnginePhase::Idle)
                | (EnginePhase::Processing, EnginePhase::Idle)
        )
    }
}

/// Shared, mutex-guarded phase with transition validation.
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    phase: Arc<Mutex<EnginePhase>>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current phase.
    pub fn current(&self) -> EnginePhase {
        *self.phase.lock().expect("phase mutex poisoned")
    }

    /// Attempt a transition, failing if it is not legal from the current
    /// phase. The check and the update are atomic under the lock, so two
    /// concurrent claims of the same phase cannot both succeed.
    pub fn transition(&self, next: EnginePhase) -> Result<()> {
        let mut guard = self.phase.lock().expect("phase mutex poisoned");
        if !guard.can_transition_to(next) {
            return Err(VoxError::InvalidTransition {
                from: guard.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %guard, to = %next, "Phase transition");
        *guard = next;
        Ok(())
    }

    /// Force the phase back to `Idle` regardless of the current phase.
    ///
    /// Used by failure paths so an error can never wedge the engine in a
    /// non-idle phase.
    pub fn reset(&self) {
        let mut guard = self.phase.lock().expect("phase mutex poisoned");
        if *guard != EnginePhase::Idle {
            tracing::debug!(from = %guard, "Phase reset to Idle");
            *guard = EnginePhase::Idle;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
