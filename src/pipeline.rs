//! The per-frame gaze tracking pipeline.
//!
//! One [`GazeTracker`] instance exclusively owns all mutable tracking state
//! for a session and is driven synchronously, one frame at a time, by an
//! external frame source. Per-frame failures (no face, closed eyes, no
//! valid estimate) yield `None` for that frame and never an error.

use crate::adaptive::{AdaptiveCorrector, ClickOutcome};
use crate::calibration::profile::{calibrated_gaze, CalibrationProfile, GazeSample};
use crate::config::Config;
use crate::constants::{IRIS_LANDMARK_COUNT, OFF_PAGE_MARGIN, SACCADE_VELOCITY_THRESHOLD};
use crate::correction::VerticalGazeCorrector;
use crate::ellipse::{fit_iris, DilationTracker};
use crate::filters::{create_filter, TemporalFilter};
use crate::frame::{FaceFrame, Point2, Point3};
use crate::fusion::{FusionEngine, GazeEstimate, GazeSource};
use crate::geometry::GeometryEstimator;
use crate::perf::{AdaptiveFrameSkipper, AdaptiveRoiController, BufferPool, PixelBuffer, Roi};
use crate::utils::{clamp01, velocity};
use crate::worker::{PupilDetector, PupilResult, PupilWorker};
use crate::Result;

/// Gaze movement classification for the emitted point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeClassification {
    /// Gaze resting within a small region
    Fixation,
    /// Rapid movement between fixations
    Saccade,
    /// Gaze outside the page bounds
    OffPage,
}

/// One emitted gaze point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub timestamp_ms: f64,
    pub classification: GazeClassification,
}

/// Tracking mode: calibration captures raw, uncorrected samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Normal,
    Calibrating,
}

/// Per-session frame counters
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_no_face: u64,
    pub frames_eyes_closed: u64,
    pub frames_no_estimate: u64,
}

/// The frame-by-frame gaze estimation pipeline
pub struct GazeTracker {
    config: Config,
    geometry: GeometryEstimator,
    fusion: FusionEngine,
    filter: Box<dyn TemporalFilter>,
    corrector: VerticalGazeCorrector,
    adaptive: AdaptiveCorrector,
    skipper: AdaptiveFrameSkipper,
    roi: AdaptiveRoiController,
    pool: BufferPool,
    dilation: DilationTracker,

    worker: Option<PupilWorker>,
    secondary_success: bool,

    profile: Option<CalibrationProfile>,
    mode: TrackingMode,

    last_point: Option<GazePoint>,
    last_raw: Option<GazeSample>,
    last_pose: Option<(f64, f64, f64)>,
    last_face_velocity: f64,
    last_dilation_ratio: f64,
    stopped: bool,
    stats: PipelineStats,
}

impl GazeTracker {
    /// Build a tracker from a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let filter = create_filter(&config.pipeline.filter_type)?;
        log::info!(
            "gaze tracker initialized with filter {}",
            filter.name()
        );

        Ok(Self {
            geometry: GeometryEstimator::default(),
            fusion: FusionEngine::new(config.fusion.clone()),
            filter,
            corrector: VerticalGazeCorrector::new(config.vertical_correction.clone()),
            adaptive: AdaptiveCorrector::new(config.adaptive.clone()),
            skipper: AdaptiveFrameSkipper::new(config.frame_skip.clone()),
            roi: AdaptiveRoiController::new(config.roi.clone()),
            pool: BufferPool::new(config.pipeline.buffer_pool_capacity),
            dilation: DilationTracker::default(),
            worker: None,
            secondary_success: false,
            profile: None,
            mode: TrackingMode::Normal,
            last_point: None,
            last_raw: None,
            last_pose: None,
            last_face_velocity: 0.0,
            last_dilation_ratio: 1.0,
            stopped: false,
            stats: PipelineStats::default(),
            config,
        })
    }

    /// Attach the optional background pupil detector.
    ///
    /// A spawn or initialization failure is returned, but the tracker stays
    /// usable with the two remaining estimators.
    pub fn attach_secondary_detector<D: PupilDetector>(&mut self, detector: D) -> Result<()> {
        match PupilWorker::new(detector) {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                log::warn!("secondary detector unavailable, continuing without it: {e}");
                Err(e)
            }
        }
    }

    /// Install a calibration profile for normal tracking
    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        log::info!("calibration profile installed for user {}", profile.user_id);
        self.profile = Some(profile);
    }

    #[must_use]
    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub fn set_mode(&mut self, mode: TrackingMode) {
        self.mode = mode;
        if mode == TrackingMode::Calibrating {
            self.filter.reset();
        }
    }

    #[must_use]
    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Process one frame. `None` input signals that no face was detected.
    ///
    /// Returns the emitted gaze point, or `None` when the frame was
    /// skipped, the eyes are closed, or no usable estimate exists.
    pub fn process_frame(&mut self, frame: Option<&FaceFrame>) -> Option<GazePoint> {
        if self.stopped {
            return None;
        }
        self.stats.frames_received += 1;

        let Some(frame) = frame else {
            self.stats.frames_no_face += 1;
            self.last_raw = None;
            return None;
        };

        let gaze_velocity = self
            .filter
            .velocity()
            .map_or(0.0, |(vx, vy)| vx.hypot(vy));
        let face_velocity = self.face_velocity(frame);

        if !self.skipper.should_process(gaze_velocity, face_velocity) {
            self.stats.frames_skipped += 1;
            return None;
        }

        // Closed or occluded eyes produce garbage iris positions
        let looking_up = self.last_point.is_some_and(|p| p.y < 0.3);
        let ear_threshold = self
            .corrector
            .adjusted_ear_threshold(self.config.pipeline.ear_threshold, looking_up);
        if frame.ear < ear_threshold {
            self.stats.frames_eyes_closed += 1;
            self.last_raw = None;
            return None;
        }

        // Iris centers via ellipse fitting, with dilation tracking
        let left_iris = self.iris_center(frame.left_eye.iris.as_ref());
        let right_iris = self.iris_center(frame.right_eye.iris.as_ref());

        // Raw signal for calibration and adaptive learning
        self.last_raw = match (left_iris, right_iris) {
            (Some(l), Some(r)) => {
                let offset = frame.iris_offset(l.xy(), r.xy());
                Some(GazeSample {
                    iris_offset_x: offset.x,
                    iris_offset_y: offset.y,
                    head_yaw: frame.head_yaw,
                    head_pitch: frame.head_pitch,
                    timestamp_ms: frame.timestamp_ms,
                })
            }
            _ => None,
        };

        // Reweight fusion when the gaze is moving vertically
        if let Some(last) = self.last_point {
            let vertical = self.corrector.is_vertical_gaze(last.x, last.y);
            self.fusion
                .set_weights(self.corrector.dynamic_weights(vertical));
        }

        let geometry = self.geometry.estimate(frame, left_iris, right_iris);
        let offset = self.offset_estimate(frame, left_iris, right_iris);
        let secondary = self.poll_secondary();

        let fused = self.fusion.fuse(geometry, secondary, offset);
        if !fused.is_valid() {
            self.stats.frames_no_estimate += 1;
            return None;
        }

        let (x, y) = self.apply_output_stages(frame, fused);

        let classification = self.classify(x, y, frame.timestamp_ms);
        let point = GazePoint {
            x: clamp01(x),
            y: clamp01(y),
            confidence: fused.confidence,
            timestamp_ms: frame.timestamp_ms,
            classification,
        };

        self.last_point = Some(point);
        self.stats.frames_processed += 1;
        Some(point)
    }

    /// Calibration transform, vertical correction and temporal filtering
    fn apply_output_stages(&mut self, frame: &FaceFrame, fused: GazeEstimate) -> (f64, f64) {
        let (mut x, mut y) = (fused.x, fused.y);

        if self.mode == TrackingMode::Normal {
            if let (Some(profile), Some(raw)) = (self.profile.as_ref(), self.last_raw.as_ref()) {
                let calibrated = calibrated_gaze(
                    Point2::new(raw.iris_offset_x, raw.iris_offset_y),
                    raw.head_yaw,
                    raw.head_pitch,
                    profile,
                );
                x = calibrated.x;
                y = calibrated.y;
            }
        }

        y = self.corrector.correct_vertical(y, frame.head_pitch, frame.ear);

        self.filter.apply(x, y, frame.timestamp_ms)
    }

    /// Record a user click for adaptive learning.
    ///
    /// Requires a current gaze point and raw sample; the immediately
    /// following frame is force-processed so the correction takes effect
    /// without skip latency. On a `Refined` outcome the caller should
    /// persist the updated profile.
    pub fn record_click(&mut self, click_position: Point2, now_ms: f64) -> Option<ClickOutcome> {
        let point = self.last_point?;
        let raw = self.last_raw?;
        let profile = self.profile.as_mut()?;

        let outcome = self.adaptive.record_click(
            profile,
            click_position,
            Point2::new(point.x, point.y),
            &raw,
            now_ms,
        );
        self.skipper.force_next_frame();
        Some(outcome)
    }

    /// Submit a video frame to the secondary detector with optimized ROIs.
    ///
    /// `left_base`/`right_base` are the eye bounding boxes in frame pixels.
    /// The ROI cache is consulted first; on a miss, fresh padded ROIs are
    /// computed and cached.
    pub fn submit_secondary_frame(
        &mut self,
        frame: PixelBuffer,
        left_base: Roi,
        right_base: Roi,
    ) -> Result<()> {
        let Some(worker) = self.worker.as_mut() else {
            return Ok(());
        };

        let (left, right) = if self.roi.should_reuse_roi(self.last_face_velocity) {
            self.roi.cached_roi().unwrap_or((left_base, right_base))
        } else {
            let success = self.secondary_success;
            let left = self.roi.calculate_optimized_roi(left_base, success, true);
            let right = self.roi.calculate_optimized_roi(right_base, success, true);
            self.roi.cache_roi(left, right);
            (left, right)
        };

        worker.submit(frame, left, right)?;
        Ok(())
    }

    /// Acquire a pooled buffer for staging a frame crop
    pub fn acquire_frame_buffer(&mut self, width: u32, height: u32, channels: u8) -> PixelBuffer {
        self.pool.acquire(width, height, channels)
    }

    /// Return a frame buffer to the pool
    pub fn release_frame_buffer(&mut self, buffer: PixelBuffer) {
        self.pool.release(buffer);
    }

    /// Raw observation from the last processed frame, for calibration
    #[must_use]
    pub fn raw_sample(&self) -> Option<GazeSample> {
        self.last_raw
    }

    /// The most recently emitted gaze point
    #[must_use]
    pub fn last_gaze(&self) -> Option<GazePoint> {
        self.last_point
    }

    /// Pupil dilation ratio from the last frame with iris data
    #[must_use]
    pub fn dilation_ratio(&self) -> f64 {
        self.last_dilation_ratio
    }

    /// Stop tracking: no further gaze points are emitted and the worker is
    /// shut down and joined.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        log::info!("gaze tracking stopped");
        self.stopped = true;
        self.worker = None;
        self.last_point = None;
        self.last_raw = None;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Reset all per-session state for a fresh tracking run
    pub fn reset(&mut self) {
        self.geometry.reset();
        self.filter.reset();
        self.corrector.reset();
        self.dilation.reset();
        self.skipper.reset_stats();
        self.roi.clear_cache();
        self.last_point = None;
        self.last_raw = None;
        self.last_pose = None;
        self.last_face_velocity = 0.0;
        self.last_dilation_ratio = 1.0;
        self.stopped = false;
        self.stats = PipelineStats::default();
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- internals ----

    /// Fit one eye's iris boundary, folding the diameter into the dilation
    /// baseline. A degenerate fit falls back to the raw landmark centroid.
    fn iris_center(
        &mut self,
        boundary: Option<&[Point3; IRIS_LANDMARK_COUNT]>,
    ) -> Option<Point3> {
        let boundary = boundary?;
        let observation = fit_iris(boundary);

        if observation.confidence > 0.0 {
            self.last_dilation_ratio = self.dilation.update(observation.diameter);
            Some(observation.center)
        } else {
            let n = boundary.len() as f64;
            Some(Point3::new(
                boundary.iter().map(|p| p.x).sum::<f64>() / n,
                boundary.iter().map(|p| p.y).sum::<f64>() / n,
                boundary.iter().map(|p| p.z).sum::<f64>() / n,
            ))
        }
    }

    /// Lightweight 2D estimate from the iris offset and head pose
    fn offset_estimate(
        &self,
        frame: &FaceFrame,
        left_iris: Option<Point3>,
        right_iris: Option<Point3>,
    ) -> Option<GazeEstimate> {
        let (left, right) = (left_iris?, right_iris?);
        let offset = frame.iris_offset(left.xy(), right.xy());

        // Head rotation shifts the apparent iris position; compensate, then
        // map around screen center with a conservative sensitivity
        let x = 0.5 + (offset.x - frame.head_yaw * 2.0) * 0.4;
        let y = 0.5 + offset.y * 0.4 + frame.head_pitch * 0.5;

        // Symmetric eyes and a frontal head pose read as high confidence
        let left_offset = (left.x - frame.left_eye.center().x) / frame.left_eye.width().max(1e-9);
        let right_offset =
            (right.x - frame.right_eye.center().x) / frame.right_eye.width().max(1e-9);
        let symmetry = 1.0 - (left_offset - right_offset).abs();
        let frontal = 1.0 - (frame.head_yaw.abs() * 2.0 + frame.head_pitch.abs());
        let confidence = ((symmetry + frontal) / 2.0).clamp(0.3, 1.0);

        Some(GazeEstimate {
            x,
            y,
            confidence,
            source: GazeSource::Offset,
        })
    }

    /// Drain the worker and convert the freshest result to an estimate
    fn poll_secondary(&mut self) -> Option<GazeEstimate> {
        let worker = self.worker.as_mut()?;
        let result = worker.poll();
        self.secondary_success = result.is_some();
        result.and_then(Self::pupils_to_estimate)
    }

    /// Average the available per-eye pupil estimates into screen space
    fn pupils_to_estimate(result: PupilResult) -> Option<GazeEstimate> {
        let (x, y) = match (result.left, result.right) {
            (Some(l), Some(r)) => ((l.center.x + r.center.x) / 2.0, (l.center.y + r.center.y) / 2.0),
            (Some(p), None) | (None, Some(p)) => (p.center.x, p.center.y),
            (None, None) => return None,
        };

        Some(GazeEstimate {
            x,
            y,
            confidence: result.confidence,
            source: GazeSource::Secondary,
        })
    }

    /// Face movement velocity from the head-pose deltas (normalized/s)
    fn face_velocity(&mut self, frame: &FaceFrame) -> f64 {
        let current = (frame.head_yaw, frame.head_pitch, frame.timestamp_ms);
        let v = match self.last_pose {
            Some((yaw, pitch, t)) => velocity(
                (yaw, pitch),
                (current.0, current.1),
                current.2 - t,
            ),
            None => 0.0,
        };
        self.last_pose = Some(current);
        self.last_face_velocity = v;
        v
    }

    /// Classify by inter-frame velocity and page bounds
    fn classify(&self, x: f64, y: f64, timestamp_ms: f64) -> GazeClassification {
        if x < -OFF_PAGE_MARGIN
            || x > 1.0 + OFF_PAGE_MARGIN
            || y < -OFF_PAGE_MARGIN
            || y > 1.0 + OFF_PAGE_MARGIN
        {
            return GazeClassification::OffPage;
        }

        let Some(last) = self.last_point else {
            return GazeClassification::Fixation;
        };

        let v = velocity((last.x, last.y), (x, y), timestamp_ms - last.timestamp_ms);
        if v > SACCADE_VELOCITY_THRESHOLD {
            GazeClassification::Saccade
        } else {
            GazeClassification::Fixation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EyeLandmarks;

    fn eye(cx: f64, cy: f64, iris_shift: f64) -> EyeLandmarks {
        let iris_center = Point2::new(cx + iris_shift, cy);
        let iris = [
            Point3::new(iris_center.x + 3.0, iris_center.y, 0.0),
            Point3::new(iris_center.x, iris_center.y + 3.0, 0.0),
            Point3::new(iris_center.x - 3.0, iris_center.y, 0.0),
            Point3::new(iris_center.x, iris_center.y - 3.0, 0.0),
            Point3::new(
                iris_center.x + 3.0 * 0.7071,
                iris_center.y + 3.0 * 0.7071,
                0.0,
            ),
        ];
        EyeLandmarks {
            outer: Point2::new(cx - 15.0, cy),
            inner: Point2::new(cx + 15.0, cy),
            top: Point2::new(cx, cy - 5.0),
            bottom: Point2::new(cx, cy + 5.0),
            top_mid: Point2::new(cx + 5.0, cy - 4.0),
            bottom_mid: Point2::new(cx + 5.0, cy + 4.0),
            iris: Some(iris),
        }
    }

    fn closed_eye(cx: f64, cy: f64) -> EyeLandmarks {
        EyeLandmarks {
            top: Point2::new(cx, cy - 0.5),
            bottom: Point2::new(cx, cy + 0.5),
            top_mid: Point2::new(cx + 5.0, cy - 0.4),
            bottom_mid: Point2::new(cx + 5.0, cy + 0.4),
            ..eye(cx, cy, 0.0)
        }
    }

    fn nose() -> Vec<Point3> {
        vec![
            Point3::new(318.0, 240.0, 0.0),
            Point3::new(312.0, 232.0, 2.0),
            Point3::new(324.0, 233.0, 2.0),
            Point3::new(317.0, 226.0, 4.0),
            Point3::new(320.0, 248.0, 1.0),
        ]
    }

    fn frame_at(t: f64, iris_shift: f64) -> FaceFrame {
        FaceFrame::new(
            t,
            eye(250.0, 200.0, iris_shift),
            eye(390.0, 200.0, iris_shift),
            nose(),
            640.0,
            480.0,
        )
    }

    fn tracker() -> GazeTracker {
        // Frame skipping off so every frame is observable in tests
        let mut config = Config::default();
        config.frame_skip.enabled = false;
        GazeTracker::new(config).unwrap()
    }

    #[test]
    fn test_emits_gaze_point_for_valid_frame() {
        let mut tracker = tracker();
        let point = tracker.process_frame(Some(&frame_at(33.0, 0.0)));

        let point = point.expect("valid frame should emit a gaze point");
        assert!(point.x >= 0.0 && point.x <= 1.0);
        assert!(point.y >= 0.0 && point.y <= 1.0);
        assert!(point.confidence > 0.0);
        assert_eq!(point.classification, GazeClassification::Fixation);
        assert_eq!(tracker.stats().frames_processed, 1);
    }

    #[test]
    fn test_no_face_yields_none() {
        let mut tracker = tracker();
        assert!(tracker.process_frame(None).is_none());
        assert_eq!(tracker.stats().frames_no_face, 1);
        assert!(tracker.raw_sample().is_none());
    }

    #[test]
    fn test_closed_eyes_skipped() {
        let mut tracker = tracker();
        let frame = FaceFrame::new(
            33.0,
            closed_eye(250.0, 200.0),
            closed_eye(390.0, 200.0),
            nose(),
            640.0,
            480.0,
        );
        assert!(tracker.process_frame(Some(&frame)).is_none());
        assert_eq!(tracker.stats().frames_eyes_closed, 1);
    }

    #[test]
    fn test_raw_sample_tracks_iris_offset() {
        let mut tracker = tracker();
        tracker.process_frame(Some(&frame_at(33.0, 6.0)));

        let raw = tracker.raw_sample().expect("raw sample");
        // 6px shift over a 30px eye
        assert!((raw.iris_offset_x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_stop_halts_emission() {
        let mut tracker = tracker();
        assert!(tracker.process_frame(Some(&frame_at(33.0, 0.0))).is_some());

        tracker.stop();
        assert!(tracker.is_stopped());
        assert!(tracker.process_frame(Some(&frame_at(66.0, 0.0))).is_none());
        assert!(tracker.last_gaze().is_none());
    }

    #[test]
    fn test_frame_skipping_when_still() {
        let mut config = Config::default();
        config.frame_skip.enabled = true;
        let mut tracker = GazeTracker::new(config).unwrap();

        let mut emitted = 0;
        for i in 0..90 {
            let t = 33.0 * (i + 1) as f64;
            if tracker.process_frame(Some(&frame_at(t, 0.0))).is_some() {
                emitted += 1;
            }
        }
        // Still scene: roughly one frame in three processed
        assert!(emitted <= 35, "emitted {emitted} of 90 frames");
        assert!(tracker.stats().frames_skipped > 0);
    }

    #[test]
    fn test_calibrated_profile_changes_output() {
        let mut tracker1 = tracker();
        let frame = frame_at(33.0, 3.0);

        let uncalibrated = tracker1.process_frame(Some(&frame)).unwrap();

        let mut tracker2 = tracker();
        let mut profile = CalibrationProfile::empty("u", 0.0);
        profile.quick_calibration.sensitivity.base_x = 2.0;
        profile.quick_calibration.sensitivity.base_y = 2.0;
        tracker2.set_profile(profile);
        let calibrated = tracker2.process_frame(Some(&frame)).unwrap();

        assert!((uncalibrated.x - calibrated.x).abs() > 1e-6);
    }

    #[test]
    fn test_calibrating_mode_bypasses_profile() {
        let mut tracker1 = tracker();
        let mut profile = CalibrationProfile::empty("u", 0.0);
        profile.quick_calibration.sensitivity.base_x = 50.0;
        tracker1.set_profile(profile);
        tracker1.set_mode(TrackingMode::Calibrating);

        let frame = frame_at(33.0, 3.0);
        let point = tracker1.process_frame(Some(&frame)).unwrap();

        let mut reference = tracker();
        let expected = reference.process_frame(Some(&frame)).unwrap();
        assert!((point.x - expected.x).abs() < 1e-9);
    }

    #[test]
    fn test_click_requires_profile_and_gaze() {
        let mut tracker = tracker();
        assert!(tracker.record_click(Point2::new(0.5, 0.5), 100.0).is_none());

        tracker.set_profile(CalibrationProfile::empty("u", 0.0));
        tracker.process_frame(Some(&frame_at(33.0, 0.0)));
        let outcome = tracker.record_click(Point2::new(0.5, 0.5), 100.0);
        assert!(outcome.is_some());
        assert_eq!(
            tracker.profile().unwrap().adaptive_learning.total_clicks,
            1
        );
    }

    #[test]
    fn test_saccade_classification() {
        let mut tracker = tracker();
        tracker.process_frame(Some(&frame_at(33.0, 0.0)));
        // A large jump between consecutive frames reads as a saccade
        let point = tracker.process_frame(Some(&frame_at(66.0, 12.0))).unwrap();
        assert_eq!(point.classification, GazeClassification::Saccade);
    }

    #[test]
    fn test_dilation_ratio_updates() {
        let mut tracker = tracker();
        tracker.process_frame(Some(&frame_at(33.0, 0.0)));
        assert!((tracker.dilation_ratio() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut tracker = tracker();
        tracker.process_frame(Some(&frame_at(33.0, 0.0)));
        tracker.stop();

        tracker.reset();
        assert!(!tracker.is_stopped());
        assert_eq!(tracker.stats().frames_received, 0);
        assert!(tracker.process_frame(Some(&frame_at(330.0, 0.0))).is_some());
    }
}
