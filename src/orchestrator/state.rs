//! Per-run state machine
//!
//! Idle → [FeedChecked] → ReleaseFetched → VersionResolved
//!   → (ManifestsReady → DeltaComputed → PackageAssembled → Persisted)*
//!   → [WorkingDirCleared] → Idle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Phase of a packaging run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    /// The announcement feed was polled
    FeedChecked,
    /// A release tree is available locally
    ReleaseFetched,
    VersionResolved,
    ManifestsReady,
    DeltaComputed,
    PackageAssembled,
    Persisted,
    WorkingDirCleared,
}

impl RunPhase {
    /// Phases inside the processing of a single version pair
    pub fn is_pair_phase(&self) -> bool {
        matches!(
            self,
            RunPhase::ManifestsReady | RunPhase::DeltaComputed | RunPhase::PackageAssembled
        )
    }

    /// Check if transition from this phase to target is valid
    pub fn can_transition_to(&self, target: RunPhase) -> bool {
        use RunPhase::*;

        match (self, target) {
            (Idle, FeedChecked) | (Idle, ReleaseFetched) => true,
            (FeedChecked, ReleaseFetched) | (FeedChecked, Idle) => true,
            (ReleaseFetched, VersionResolved) | (ReleaseFetched, Idle) => true,

            // Start of the next pair, also after a failed one
            (VersionResolved, ManifestsReady) | (Persisted, ManifestsReady) => true,
            (from, ManifestsReady) if from.is_pair_phase() => true,

            (ManifestsReady, DeltaComputed) => true,
            (DeltaComputed, PackageAssembled) => true,
            (PackageAssembled, Persisted) => true,

            // End of the pair loop
            (VersionResolved | Persisted, WorkingDirCleared | Idle) => true,
            (from, WorkingDirCleared | Idle) if from.is_pair_phase() => true,
            (WorkingDirCleared, Idle) => true,

            _ => false,
        }
    }
}

/// Errors for run state operations
#[derive(Debug, thiserror::Error)]
pub enum RunStateError {
    #[error("Invalid run phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
}

/// Progress of one packaging run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// A fresh run in `Idle`
    pub fn new() -> Self {
        Self::starting_at(RunPhase::Idle)
    }

    /// A run entered part-way, e.g. packaging an already ingested version.
    pub fn starting_at(phase: RunPhase) -> Self {
        let now = Utc::now();
        Self {
            run_id: Ulid::new().to_string(),
            phase,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move to a new phase
    pub fn transition(&mut self, next: RunPhase) -> Result<(), RunStateError> {
        if !self.phase.can_transition_to(next) {
            return Err(RunStateError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(run_id = %self.run_id, from = ?self.phase, to = ?next, "run phase");
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
