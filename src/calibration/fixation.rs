//! Fixation detection as an explicit two-state machine.
//!
//! The timer must be invalidated the instant distance exceeds the
//! threshold; modelling this as a pure transition of (distance, now) keeps
//! stale progress from leaking across updates.

/// Current detector state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixationState {
    Idle,
    Fixating { start_ms: f64 },
}

/// Result of one detector update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixationProgress {
    /// Gaze is outside the target region
    Idle,
    /// Gaze is inside the region; fraction of the required duration elapsed
    Fixating { fraction: f64 },
    /// Continuous fixation reached the required duration
    Complete,
}

/// Detects sustained fixation on a target within a distance threshold
#[derive(Debug, Clone)]
pub struct FixationGate {
    threshold: f64,
    duration_ms: f64,
    state: FixationState,
}

impl FixationGate {
    #[must_use]
    pub fn new(threshold: f64, duration_ms: f64) -> Self {
        Self {
            threshold,
            duration_ms,
            state: FixationState::Idle,
        }
    }

    /// Advance the state machine with the current gaze-to-target distance.
    ///
    /// Any distance at or above the threshold resets to idle; the timer
    /// starts on the first qualifying frame and completes once `duration`
    /// of continuous fixation has accumulated.
    pub fn update(&mut self, distance: f64, now_ms: f64) -> FixationProgress {
        if distance >= self.threshold {
            self.state = FixationState::Idle;
            return FixationProgress::Idle;
        }

        match self.state {
            FixationState::Idle => {
                self.state = FixationState::Fixating { start_ms: now_ms };
                FixationProgress::Fixating { fraction: 0.0 }
            }
            FixationState::Fixating { start_ms } => {
                let elapsed = now_ms - start_ms;
                if elapsed >= self.duration_ms {
                    FixationProgress::Complete
                } else {
                    FixationProgress::Fixating {
                        fraction: (elapsed / self.duration_ms).clamp(0.0, 1.0),
                    }
                }
            }
        }
    }

    /// True while a fixation timer is running
    #[must_use]
    pub fn is_fixating(&self) -> bool {
        matches!(self.state, FixationState::Fixating { .. })
    }

    #[must_use]
    pub fn state(&self) -> FixationState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = FixationState::Idle;
    }
}
