//! Persisted calibration profile types and the calibrated gaze transform.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ADAPTIVE_ADJUSTMENT_RATE, ADAPTIVE_MIN_SAMPLES, ADAPTIVE_RECENT_WINDOW,
    DEFAULT_PITCH_MULTIPLIER, DEFAULT_SENSITIVITY_X, DEFAULT_SENSITIVITY_Y,
    DEFAULT_YAW_MULTIPLIER, PARALLAX_FACTOR,
};
use crate::frame::Point2;
use crate::utils::median;

/// One raw gaze observation: normalized iris offset plus head pose
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GazeSample {
    pub iris_offset_x: f64,
    pub iris_offset_y: f64,
    pub head_yaw: f64,
    pub head_pitch: f64,
    pub timestamp_ms: f64,
}

/// Per-axis median aggregation of raw samples.
///
/// The median (not the mean) is used throughout calibration so single-frame
/// detection glitches cannot skew a stage result.
#[must_use]
pub fn median_sample(samples: &[GazeSample], timestamp_ms: f64) -> GazeSample {
    if samples.is_empty() {
        return GazeSample {
            timestamp_ms,
            ..GazeSample::default()
        };
    }

    GazeSample {
        iris_offset_x: median(&samples.iter().map(|s| s.iris_offset_x).collect::<Vec<_>>()),
        iris_offset_y: median(&samples.iter().map(|s| s.iris_offset_y).collect::<Vec<_>>()),
        head_yaw: median(&samples.iter().map(|s| s.head_yaw).collect::<Vec<_>>()),
        head_pitch: median(&samples.iter().map(|s| s.head_pitch).collect::<Vec<_>>()),
        timestamp_ms,
    }
}

/// Aggregated measurement for one corner target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerSample {
    pub target: Point2,
    /// Number of raw samples collected during the fixation
    pub sample_count: usize,
    /// Median-aggregated measurement
    pub measured: GazeSample,
}

/// Per-user linear mapping from raw signals to screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityMatrix {
    pub base_x: f64,
    pub base_y: f64,
    pub head_yaw_multiplier: f64,
    pub head_pitch_multiplier: f64,
}

impl Default for SensitivityMatrix {
    /// Pre-calibration sensitivity used before AUTO_CALCULATE runs
    fn default() -> Self {
        Self {
            base_x: 35.0,
            base_y: 35.0,
            head_yaw_multiplier: 8.0,
            head_pitch_multiplier: 0.0,
        }
    }
}

/// Quick-calibration results: camera position, baselines and sensitivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickCalibrationData {
    pub camera_position: Point2,
    pub natural_center: GazeSample,
    pub corners: Vec<CornerSample>,
    pub sensitivity: SensitivityMatrix,
    pub verification_score: f64,
}

impl Default for QuickCalibrationData {
    fn default() -> Self {
        Self {
            camera_position: Point2::new(0.5, 0.05),
            natural_center: GazeSample::default(),
            corners: Vec::new(),
            sensitivity: SensitivityMatrix::default(),
            verification_score: 0.0,
        }
    }
}

/// One click-derived error observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub timestamp_ms: f64,
    pub click_position: Point2,
    pub estimated_gaze: Point2,
    pub error: Point2,
    pub iris_offset: Point2,
    pub head_yaw: f64,
    pub head_pitch: f64,
}

/// Record of one automatic sensitivity refinement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementEntry {
    pub timestamp_ms: f64,
    pub adjustment: Point2,
}

/// Click-driven adaptive learning state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdaptiveLearningData {
    pub total_clicks: u64,
    pub error_samples: Vec<ErrorSample>,
    pub refinement_history: Vec<RefinementEntry>,
    /// Accuracy estimate in [0, 100] for UI feedback
    pub current_accuracy: f64,
}

/// The unit of persistence: one user's complete calibration state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub user_id: String,
    pub created_at_ms: f64,
    pub updated_at_ms: f64,
    pub quick_calibration: QuickCalibrationData,
    pub adaptive_learning: AdaptiveLearningData,
}

impl CalibrationProfile {
    /// Create an empty profile for a new calibration run
    #[must_use]
    pub fn empty(user_id: &str, now_ms: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            quick_calibration: QuickCalibrationData::default(),
            adaptive_learning: AdaptiveLearningData::default(),
        }
    }
}

/// Derive the sensitivity matrix from the corner measurements.
///
/// Corners are identified by target position. Any axis whose measured range
/// is zero falls back to its documented default constant so the transform
/// never divides by zero.
#[must_use]
pub fn calculate_sensitivity(
    natural_center: &GazeSample,
    corners: &[CornerSample],
) -> SensitivityMatrix {
    let left = corners.iter().find(|c| c.target.x < 0.5);
    let right = corners.iter().find(|c| c.target.x > 0.5);
    let top = corners.iter().find(|c| c.target.y < 0.5);
    let bottom = corners.iter().find(|c| c.target.y > 0.5);

    let (Some(left), Some(right), Some(top), Some(bottom)) = (left, right, top, bottom) else {
        log::warn!("missing corner data, using default sensitivity");
        return SensitivityMatrix {
            base_x: DEFAULT_SENSITIVITY_X,
            base_y: DEFAULT_SENSITIVITY_Y,
            head_yaw_multiplier: DEFAULT_YAW_MULTIPLIER,
            head_pitch_multiplier: DEFAULT_PITCH_MULTIPLIER,
        };
    };

    let screen_range_x = (right.target.x - left.target.x).abs();
    let screen_range_y = (bottom.target.y - top.target.y).abs();

    let iris_range_x = ((right.measured.iris_offset_x - natural_center.iris_offset_x)
        - (left.measured.iris_offset_x - natural_center.iris_offset_x))
        .abs();
    let iris_range_y = ((bottom.measured.iris_offset_y - natural_center.iris_offset_y)
        - (top.measured.iris_offset_y - natural_center.iris_offset_y))
        .abs();

    let yaw_range = ((right.measured.head_yaw - natural_center.head_yaw)
        - (left.measured.head_yaw - natural_center.head_yaw))
        .abs();
    let pitch_range = ((bottom.measured.head_pitch - natural_center.head_pitch)
        - (top.measured.head_pitch - natural_center.head_pitch))
        .abs();

    let sensitivity = SensitivityMatrix {
        base_x: if iris_range_x > 0.0 {
            screen_range_x / iris_range_x
        } else {
            DEFAULT_SENSITIVITY_X
        },
        base_y: if iris_range_y > 0.0 {
            screen_range_y / iris_range_y
        } else {
            DEFAULT_SENSITIVITY_Y
        },
        head_yaw_multiplier: if yaw_range > 0.0 {
            screen_range_x / yaw_range
        } else {
            DEFAULT_YAW_MULTIPLIER
        },
        head_pitch_multiplier: if pitch_range > 0.0 {
            screen_range_y / pitch_range
        } else {
            DEFAULT_PITCH_MULTIPLIER
        },
    };

    log::info!(
        "calculated sensitivity: base=({:.2}, {:.2}) head=({:.2}, {:.2})",
        sensitivity.base_x,
        sensitivity.base_y,
        sensitivity.head_yaw_multiplier,
        sensitivity.head_pitch_multiplier
    );

    sensitivity
}

/// Camera parallax correction: gaze shifts slightly toward the camera
/// position, more strongly at the vertical extremes.
#[must_use]
pub fn apply_camera_parallax(gaze: Point2, camera: Point2) -> Point2 {
    Point2::new(
        gaze.x + (camera.x - 0.5) * PARALLAX_FACTOR * (gaze.y - 0.5),
        gaze.y + (camera.y - 0.5) * PARALLAX_FACTOR,
    )
}

/// Additive bias from recent click errors, active once enough samples exist
#[must_use]
pub fn adaptive_bias(profile: &CalibrationProfile) -> Point2 {
    let samples = &profile.adaptive_learning.error_samples;
    if samples.len() < ADAPTIVE_MIN_SAMPLES {
        return Point2::new(0.0, 0.0);
    }

    let recent: Vec<&ErrorSample> = samples
        .iter()
        .rev()
        .take(ADAPTIVE_RECENT_WINDOW)
        .collect();
    let error_x = median(&recent.iter().map(|s| s.error.x).collect::<Vec<_>>());
    let error_y = median(&recent.iter().map(|s| s.error.y).collect::<Vec<_>>());

    Point2::new(
        error_x * ADAPTIVE_ADJUSTMENT_RATE,
        error_y * ADAPTIVE_ADJUSTMENT_RATE,
    )
}

/// Map a raw observation to a calibrated screen position.
///
/// The raw signal is normalized against the user's natural center, scaled
/// by the sensitivity matrix around screen center, mirrored horizontally,
/// parallax-corrected for the camera position and finally nudged by the
/// adaptive click-error bias.
#[must_use]
pub fn calibrated_gaze(
    iris_offset: Point2,
    head_yaw: f64,
    head_pitch: f64,
    profile: &CalibrationProfile,
) -> Point2 {
    let quick = &profile.quick_calibration;
    let center = &quick.natural_center;
    let sensitivity = &quick.sensitivity;

    let rel_iris_x = iris_offset.x - center.iris_offset_x;
    let rel_iris_y = iris_offset.y - center.iris_offset_y;
    let rel_yaw = head_yaw - center.head_yaw;
    let rel_pitch = head_pitch - center.head_pitch;

    let raw_x = 0.5 + rel_iris_x * sensitivity.base_x + rel_yaw * sensitivity.head_yaw_multiplier;
    let raw_y =
        0.5 + rel_iris_y * sensitivity.base_y + rel_pitch * sensitivity.head_pitch_multiplier;

    // Webcam mirror flip on the horizontal axis
    let mirrored_x = 1.0 - raw_x;

    let corrected = apply_camera_parallax(Point2::new(mirrored_x, raw_y), quick.camera_position);
    let bias = adaptive_bias(profile);

    // Not clamped here: the pipeline classifies off-page gaze from the
    // unclamped value before clamping the emitted point
    Point2::new(corrected.x + bias.x, corrected.y + bias.y)
}
