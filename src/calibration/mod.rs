//! Five-stage interactive calibration.
//!
//! The session walks camera marking, natural-center capture, four-corner
//! calibration, sensitivity calculation and verification in order,
//! collecting raw (uncorrected) samples and producing a per-user
//! [`CalibrationProfile`]. Verification failure discards the profile and
//! restarts from the beginning.

/// Persisted profile types and the calibrated gaze transform
pub mod profile;

/// Fixation detection state machine
pub mod fixation;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CORNER_DISTANCE_THRESHOLD, CORNER_FIXATION_DURATION_MS, NATURAL_CENTER_DURATION_MS,
    NATURAL_CENTER_SETTLE_MS, VERIFICATION_DISTANCE_THRESHOLD, VERIFICATION_FIXATION_DURATION_MS,
    VERIFICATION_POINT_COUNT, VERIFICATION_POINT_TIMEOUT_MS, VERIFICATION_REQUIRED_SUCCESSES,
};
use crate::frame::Point2;
use crate::utils::distance;

use fixation::{FixationGate, FixationProgress};
use profile::{calculate_sensitivity, median_sample, CalibrationProfile, CornerSample, GazeSample};

/// The four fixed corner targets, presented in order
pub const CORNER_TARGETS: [Point2; 4] = [
    Point2 { x: 0.15, y: 0.15 },
    Point2 { x: 0.85, y: 0.15 },
    Point2 { x: 0.85, y: 0.85 },
    Point2 { x: 0.15, y: 0.85 },
];

/// Calibration procedure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Delay before natural-center sampling begins (ms)
    pub settle_ms: f64,
    /// Natural-center sampling window (ms)
    pub natural_center_duration_ms: f64,
    /// Required continuous corner fixation (ms)
    pub corner_fixation_ms: f64,
    /// Corner fixation distance threshold (normalized)
    pub corner_threshold: f64,
    /// Required continuous verification fixation (ms)
    pub verification_fixation_ms: f64,
    /// Verification fixation distance threshold (normalized)
    pub verification_threshold: f64,
    /// Hard per-point verification timeout (ms)
    pub verification_timeout_ms: f64,
    pub verification_point_count: usize,
    pub required_successes: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            settle_ms: NATURAL_CENTER_SETTLE_MS,
            natural_center_duration_ms: NATURAL_CENTER_DURATION_MS,
            corner_fixation_ms: CORNER_FIXATION_DURATION_MS,
            corner_threshold: CORNER_DISTANCE_THRESHOLD,
            verification_fixation_ms: VERIFICATION_FIXATION_DURATION_MS,
            verification_threshold: VERIFICATION_DISTANCE_THRESHOLD,
            verification_timeout_ms: VERIFICATION_POINT_TIMEOUT_MS,
            verification_point_count: VERIFICATION_POINT_COUNT,
            required_successes: VERIFICATION_REQUIRED_SUCCESSES,
        }
    }
}

/// Calibration stages in procedure order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStage {
    CameraMarking,
    NaturalCenter,
    CornerCalibration,
    AutoCalculate,
    Verification,
    Completed,
}

/// Events emitted by the session for the driving UI
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    StageChanged(CalibrationStage),
    /// Natural-center capture produced no samples; the stage restarted
    NaturalCenterRestarted,
    CornerCompleted { index: usize },
    VerificationPointResult { index: usize, success: bool },
    /// Verification passed; the profile is finalized
    Completed { score: f64 },
    /// Verification failed; the profile was discarded and the procedure
    /// restarted from camera marking
    RestartRequired { score: f64 },
}

/// One five-stage calibration run for a single user
pub struct CalibrationSession {
    config: CalibrationConfig,
    stage: CalibrationStage,
    profile: CalibrationProfile,

    stage_started_ms: f64,
    samples: Vec<GazeSample>,

    corner_index: usize,
    corners: Vec<CornerSample>,
    fixation: FixationGate,

    verification_points: Vec<Point2>,
    verification_index: usize,
    verification_results: Vec<bool>,
    point_started_ms: f64,
}

impl CalibrationSession {
    /// Start a new session at CAMERA_MARKING
    #[must_use]
    pub fn new(user_id: &str, config: CalibrationConfig, now_ms: f64) -> Self {
        log::info!("calibration session started for user {user_id}");
        let fixation = FixationGate::new(config.corner_threshold, config.corner_fixation_ms);
        Self {
            config,
            stage: CalibrationStage::CameraMarking,
            profile: CalibrationProfile::empty(user_id, now_ms),
            stage_started_ms: now_ms,
            samples: Vec::new(),
            corner_index: 0,
            corners: Vec::new(),
            fixation,
            verification_points: Vec::new(),
            verification_index: 0,
            verification_results: Vec::new(),
            point_started_ms: now_ms,
        }
    }

    #[must_use]
    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    #[must_use]
    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Consume the session, returning the finished profile
    #[must_use]
    pub fn into_profile(self) -> CalibrationProfile {
        self.profile
    }

    /// The target the user should currently fixate, if any
    #[must_use]
    pub fn current_target(&self) -> Option<Point2> {
        match self.stage {
            CalibrationStage::CornerCalibration => CORNER_TARGETS.get(self.corner_index).copied(),
            CalibrationStage::Verification => {
                self.verification_points.get(self.verification_index).copied()
            }
            _ => None,
        }
    }

    /// True while a fixation timer is running on the current target
    #[must_use]
    pub fn is_fixating(&self) -> bool {
        self.fixation.is_fixating()
    }

    /// Record the user-marked camera position (stage 1). `None` accepts the
    /// default near-top-center position.
    pub fn record_camera_position(
        &mut self,
        position: Option<Point2>,
        now_ms: f64,
    ) -> Vec<CalibrationEvent> {
        if self.stage != CalibrationStage::CameraMarking {
            return Vec::new();
        }

        if let Some(position) = position {
            self.profile.quick_calibration.camera_position = position;
        }
        log::info!(
            "camera position marked at ({:.2}, {:.2})",
            self.profile.quick_calibration.camera_position.x,
            self.profile.quick_calibration.camera_position.y
        );

        self.enter_stage(CalibrationStage::NaturalCenter, now_ms);
        vec![CalibrationEvent::StageChanged(CalibrationStage::NaturalCenter)]
    }

    /// Feed one frame's data into the session.
    ///
    /// `raw` is the uncorrected observation used to build the profile;
    /// `live_gaze` is the current on-screen estimate used for fixation
    /// detection (calibrated during verification, best-effort before).
    pub fn push_sample(
        &mut self,
        now_ms: f64,
        raw: GazeSample,
        live_gaze: Option<Point2>,
    ) -> Vec<CalibrationEvent> {
        match self.stage {
            CalibrationStage::NaturalCenter => self.update_natural_center(now_ms, raw),
            CalibrationStage::CornerCalibration => self.update_corner(now_ms, raw, live_gaze),
            CalibrationStage::Verification => self.update_verification(now_ms, live_gaze),
            _ => Vec::new(),
        }
    }

    /// Discard everything and restart from camera marking
    pub fn retry(&mut self, now_ms: f64) -> Vec<CalibrationEvent> {
        log::info!("calibration retry requested");
        self.restart(now_ms);
        vec![CalibrationEvent::StageChanged(CalibrationStage::CameraMarking)]
    }

    // ---- stage 2: natural center ----

    fn update_natural_center(&mut self, now_ms: f64, raw: GazeSample) -> Vec<CalibrationEvent> {
        let sampling_start = self.stage_started_ms + self.config.settle_ms;
        if now_ms < sampling_start {
            return Vec::new();
        }

        if now_ms < sampling_start + self.config.natural_center_duration_ms {
            self.samples.push(raw);
            return Vec::new();
        }

        if self.samples.is_empty() {
            // Nothing usable arrived; restart the capture window rather
            // than baking a zero baseline into the profile
            log::warn!("no samples collected for natural center, restarting stage");
            self.stage_started_ms = now_ms;
            return vec![CalibrationEvent::NaturalCenterRestarted];
        }

        self.profile.quick_calibration.natural_center = median_sample(&self.samples, now_ms);
        log::info!(
            "natural center captured from {} samples",
            self.samples.len()
        );

        self.enter_stage(CalibrationStage::CornerCalibration, now_ms);
        vec![CalibrationEvent::StageChanged(
            CalibrationStage::CornerCalibration,
        )]
    }

    // ---- stage 3: corner calibration ----

    fn update_corner(
        &mut self,
        now_ms: f64,
        raw: GazeSample,
        live_gaze: Option<Point2>,
    ) -> Vec<CalibrationEvent> {
        let Some(gaze) = live_gaze else {
            return Vec::new();
        };
        let Some(target) = CORNER_TARGETS.get(self.corner_index).copied() else {
            return Vec::new();
        };

        let dist = distance((gaze.x, gaze.y), (target.x, target.y));
        match self.fixation.update(dist, now_ms) {
            FixationProgress::Idle => {
                self.samples.clear();
                Vec::new()
            }
            FixationProgress::Fixating { .. } => {
                self.samples.push(raw);
                Vec::new()
            }
            FixationProgress::Complete => {
                if self.samples.is_empty() {
                    // Fixation completed without raw data; wait for samples
                    return Vec::new();
                }
                self.complete_corner(now_ms, target)
            }
        }
    }

    fn complete_corner(&mut self, now_ms: f64, target: Point2) -> Vec<CalibrationEvent> {
        let measured = median_sample(&self.samples, now_ms);
        self.corners.push(CornerSample {
            target,
            sample_count: self.samples.len(),
            measured,
        });
        log::info!(
            "corner {} completed with {} samples",
            self.corner_index + 1,
            self.samples.len()
        );

        let index = self.corner_index;
        let mut events = vec![CalibrationEvent::CornerCompleted { index }];

        self.samples.clear();
        self.fixation.reset();
        self.corner_index += 1;

        if self.corner_index >= CORNER_TARGETS.len() {
            events.extend(self.auto_calculate(now_ms));
        }

        events
    }

    // ---- stage 4: auto calculate ----

    fn auto_calculate(&mut self, now_ms: f64) -> Vec<CalibrationEvent> {
        self.stage = CalibrationStage::AutoCalculate;
        let mut events = vec![CalibrationEvent::StageChanged(CalibrationStage::AutoCalculate)];

        self.profile.quick_calibration.corners = self.corners.clone();
        self.profile.quick_calibration.sensitivity = calculate_sensitivity(
            &self.profile.quick_calibration.natural_center,
            &self.corners,
        );
        self.profile.updated_at_ms = now_ms;

        self.verification_points = generate_verification_points(self.config.verification_point_count);
        self.verification_index = 0;
        self.verification_results.clear();
        self.point_started_ms = now_ms;
        self.fixation = FixationGate::new(
            self.config.verification_threshold,
            self.config.verification_fixation_ms,
        );

        self.stage = CalibrationStage::Verification;
        events.push(CalibrationEvent::StageChanged(CalibrationStage::Verification));
        events
    }

    // ---- stage 5: verification ----

    fn update_verification(
        &mut self,
        now_ms: f64,
        live_gaze: Option<Point2>,
    ) -> Vec<CalibrationEvent> {
        let Some(target) = self
            .verification_points
            .get(self.verification_index)
            .copied()
        else {
            return Vec::new();
        };

        // The hard timeout counts as a failure for this point
        if now_ms - self.point_started_ms >= self.config.verification_timeout_ms {
            log::warn!(
                "verification point {} timed out",
                self.verification_index + 1
            );
            return self.finish_verification_point(now_ms, false);
        }

        let Some(gaze) = live_gaze else {
            return Vec::new();
        };

        let dist = distance((gaze.x, gaze.y), (target.x, target.y));
        match self.fixation.update(dist, now_ms) {
            FixationProgress::Complete => self.finish_verification_point(now_ms, true),
            _ => Vec::new(),
        }
    }

    fn finish_verification_point(&mut self, now_ms: f64, success: bool) -> Vec<CalibrationEvent> {
        let index = self.verification_index;
        self.verification_results.push(success);
        self.verification_index += 1;
        self.point_started_ms = now_ms;
        self.fixation.reset();

        let mut events = vec![CalibrationEvent::VerificationPointResult { index, success }];

        if self.verification_index >= self.verification_points.len() {
            let successes = self.verification_results.iter().filter(|&&s| s).count();
            let score = successes as f64 / self.verification_points.len() as f64;
            self.profile.quick_calibration.verification_score = score;
            self.profile.updated_at_ms = now_ms;

            if successes >= self.config.required_successes {
                log::info!("calibration verification passed: score {score:.2}");
                self.stage = CalibrationStage::Completed;
                events.push(CalibrationEvent::StageChanged(CalibrationStage::Completed));
                events.push(CalibrationEvent::Completed { score });
            } else {
                log::warn!("calibration verification failed: score {score:.2}");
                self.restart(now_ms);
                events.push(CalibrationEvent::RestartRequired { score });
            }
        }

        events
    }

    // ---- helpers ----

    fn enter_stage(&mut self, stage: CalibrationStage, now_ms: f64) {
        self.stage = stage;
        self.stage_started_ms = now_ms;
        self.samples.clear();
        if stage == CalibrationStage::CornerCalibration {
            self.corner_index = 0;
            self.corners.clear();
            self.fixation =
                FixationGate::new(self.config.corner_threshold, self.config.corner_fixation_ms);
        }
    }

    fn restart(&mut self, now_ms: f64) {
        let user_id = self.profile.user_id.clone();
        self.profile = CalibrationProfile::empty(&user_id, now_ms);
        self.stage = CalibrationStage::CameraMarking;
        self.stage_started_ms = now_ms;
        self.samples.clear();
        self.corner_index = 0;
        self.corners.clear();
        self.verification_points.clear();
        self.verification_results.clear();
        self.verification_index = 0;
        self.fixation =
            FixationGate::new(self.config.corner_threshold, self.config.corner_fixation_ms);
    }
}

/// Random verification targets inside the central region of the screen
fn generate_verification_points(count: usize) -> Vec<Point2> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            Point2::new(
                rng.gen_range(0.3..0.7),
                rng.gen_range(0.3..0.7),
            )
        })
        .collect()
}
