//! Constants used throughout the library

/// Number of iris boundary landmarks per eye
pub const IRIS_LANDMARK_COUNT: usize = 5;

/// Eye-aspect-ratio threshold below which eyes are treated as closed/occluded
pub const DEFAULT_EAR_THRESHOLD: f64 = 0.18;

/// Baseline EAR for a normally open eye, used by vertical correction
pub const NORMAL_EAR: f64 = 0.15;

/// Average inter-pupillary distance in mm
pub const INTER_PUPILLARY_DISTANCE: f64 = 63.0;

/// Average human eye radius in mm (24mm diameter)
pub const EYE_RADIUS: f64 = 12.0;

/// Length of the gaze direction smoothing history
pub const GAZE_SMOOTHER_LENGTH: usize = 10;

/// Virtual monitor placement (mm)
pub const MONITOR_DISTANCE: f64 = 500.0;
pub const MONITOR_WIDTH: f64 = 600.0;
pub const MONITOR_HEIGHT: f64 = 400.0;

/// Dead zone around screen center where gaze snaps to exactly 0.5
pub const CENTER_DEAD_ZONE: f64 = 0.05;

/// Kalman filter defaults
pub const DEFAULT_PROCESS_NOISE: f64 = 0.001;
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 0.05;
pub const DEFAULT_INITIAL_COVARIANCE: f64 = 1.0;

/// Frame gap (ms) above which the Kalman filter reinitializes
pub const KALMAN_RESET_GAP_MS: f64 = 1000.0;

/// Adaptive Kalman measurement-noise bounds
pub const ADAPTIVE_NOISE_MIN: f64 = 0.01;
pub const ADAPTIVE_NOISE_MAX: f64 = 0.2;

/// Fusion defaults
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 0.1;
pub const DEFAULT_WEIGHT_OFFSET: f64 = 0.6;
pub const DEFAULT_WEIGHT_SECONDARY: f64 = 0.25;
pub const DEFAULT_WEIGHT_GEOMETRY: f64 = 0.15;

/// Calibration stage timing (ms)
pub const NATURAL_CENTER_SETTLE_MS: f64 = 500.0;
pub const NATURAL_CENTER_DURATION_MS: f64 = 2000.0;
pub const CORNER_FIXATION_DURATION_MS: f64 = 2000.0;
pub const VERIFICATION_FIXATION_DURATION_MS: f64 = 1500.0;
pub const VERIFICATION_POINT_TIMEOUT_MS: f64 = 5000.0;

/// Calibration distance thresholds (normalized screen units)
pub const CORNER_DISTANCE_THRESHOLD: f64 = 0.2;
pub const VERIFICATION_DISTANCE_THRESHOLD: f64 = 0.15;

/// Verification point count and required successes
pub const VERIFICATION_POINT_COUNT: usize = 3;
pub const VERIFICATION_REQUIRED_SUCCESSES: usize = 2;

/// Sensitivity fallbacks when a calibration axis has zero measured range
pub const DEFAULT_SENSITIVITY_X: f64 = 80.0;
pub const DEFAULT_SENSITIVITY_Y: f64 = 50.0;
pub const DEFAULT_YAW_MULTIPLIER: f64 = 15.0;
pub const DEFAULT_PITCH_MULTIPLIER: f64 = 10.0;

/// Camera parallax correction factor
pub const PARALLAX_FACTOR: f64 = 0.05;

/// Adaptive learning defaults
pub const ADAPTIVE_MIN_SAMPLES: usize = 10;
pub const ADAPTIVE_ADJUSTMENT_RATE: f64 = 0.1;
pub const ADAPTIVE_HISTORY_CAP: usize = 100;
pub const ADAPTIVE_RECENT_WINDOW: usize = 20;
pub const ADAPTIVE_REFINE_EVERY: usize = 20;
pub const ADAPTIVE_MAX_CLICK_ERROR: f64 = 0.3;

/// Gaze classification thresholds
pub const SACCADE_VELOCITY_THRESHOLD: f64 = 1.0;
pub const OFF_PAGE_MARGIN: f64 = 0.1;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
