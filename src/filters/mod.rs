//! Temporal filtering for the 2D gaze position stream.
//!
//! Filters consume timestamped measurements so that frame gaps can be
//! detected and treated as tracking loss rather than blended across.

/// Kalman filters (plain and adaptive) for optimal state estimation
pub mod kalman;

use crate::{Error, Result};

/// Trait for all gaze position filters
pub trait TemporalFilter: Send {
    /// Filter a measurement taken at `timestamp_ms` and return the smoothed position
    fn apply(&mut self, x: f64, y: f64, timestamp_ms: f64) -> (f64, f64);

    /// Current velocity estimate in normalized units per second, if available
    fn velocity(&self) -> Option<(f64, f64)>;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes measurements through unchanged
pub struct NoFilter;

impl TemporalFilter for NoFilter {
    fn apply(&mut self, x: f64, y: f64, _timestamp_ms: f64) -> (f64, f64) {
        (x, y)
    }

    fn velocity(&self) -> Option<(f64, f64)> {
        None
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a temporal filter by type name
pub fn create_filter(filter_type: &str) -> Result<Box<dyn TemporalFilter>> {
    match filter_type.to_lowercase().as_str() {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "kalman" => Ok(Box::new(kalman::GazeKalmanFilter::default())),
        "adaptive_kalman" | "adaptivekalman" => {
            Ok(Box::new(kalman::AdaptiveKalmanFilter::default()))
        }
        _ => Err(Error::FilterError(format!(
            "Unknown filter type: {filter_type}"
        ))),
    }
}
