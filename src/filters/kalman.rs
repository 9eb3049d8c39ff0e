//! Kalman filtering for gaze position under a constant-velocity model.

use std::collections::VecDeque;

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

use super::TemporalFilter;
use crate::constants::{
    ADAPTIVE_NOISE_MAX, ADAPTIVE_NOISE_MIN, DEFAULT_INITIAL_COVARIANCE,
    DEFAULT_MEASUREMENT_NOISE, DEFAULT_PROCESS_NOISE, KALMAN_RESET_GAP_MS,
};

/// Kalman filter configuration
#[derive(Debug, Clone, Copy)]
pub struct KalmanConfig {
    /// Process noise covariance (how much the model is trusted)
    pub process_noise: f64,
    /// Measurement noise covariance (how much measurements are trusted)
    pub measurement_noise: f64,
    /// Initial state covariance
    pub initial_covariance: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: DEFAULT_PROCESS_NOISE,
            measurement_noise: DEFAULT_MEASUREMENT_NOISE,
            initial_covariance: DEFAULT_INITIAL_COVARIANCE,
        }
    }
}

/// Internal filter state: position and velocity with covariance
#[derive(Debug, Clone)]
struct KalmanState {
    // [x, y, vx, vy]
    x: Vector4<f64>,
    p: Matrix4<f64>,
    timestamp_ms: f64,
}

/// Kalman filter for 2D gaze position tracking.
///
/// Uses a constant-velocity model; only position is measured, velocity is
/// inferred. A time gap over one second reinitializes the state from the
/// raw measurement, treating the gap as tracking loss rather than an error.
pub struct GazeKalmanFilter {
    state: Option<KalmanState>,
    config: KalmanConfig,
}

impl GazeKalmanFilter {
    #[must_use]
    pub fn new(config: KalmanConfig) -> Self {
        Self {
            state: None,
            config,
        }
    }

    fn initialize(&mut self, x: f64, y: f64, timestamp_ms: f64) {
        self.state = Some(KalmanState {
            x: Vector4::new(x, y, 0.0, 0.0),
            p: Matrix4::identity() * self.config.initial_covariance,
            timestamp_ms,
        });
    }

    fn predict(state: &mut KalmanState, dt: f64, q: f64) {
        // State transition for the constant-velocity model
        let f = Matrix4::new(
            1.0, 0.0, dt, 0.0, //
            0.0, 1.0, 0.0, dt, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );

        // Process noise, position entries scaled by dt
        let process = Matrix4::new(
            q * dt, 0.0, 0.0, 0.0, //
            0.0, q * dt, 0.0, 0.0, //
            0.0, 0.0, q, 0.0, //
            0.0, 0.0, 0.0, q,
        );

        state.x = f * state.x;
        state.p = f * state.p * f.transpose() + process;
    }

    fn update(state: &mut KalmanState, z: Vector2<f64>, r: f64) {
        // Only position is observed
        let h = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0,
        );
        let measurement_noise = Matrix2::identity() * r;

        let innovation = z - h * state.x;
        let s = h * state.p * h.transpose() + measurement_noise;
        let s_inv = s.try_inverse().unwrap_or_else(Matrix2::identity);
        let gain: Matrix4x2<f64> = state.p * h.transpose() * s_inv;

        state.x += gain * innovation;
        state.p = (Matrix4::identity() - gain * h) * state.p;
    }

    fn filter_with_noise(
        &mut self,
        x: f64,
        y: f64,
        timestamp_ms: f64,
        measurement_noise: f64,
    ) -> (f64, f64) {
        let Some(state) = self.state.as_mut() else {
            self.initialize(x, y, timestamp_ms);
            return (x, y);
        };

        let dt = (timestamp_ms - state.timestamp_ms) / 1000.0;
        if dt <= 0.0 || dt > KALMAN_RESET_GAP_MS / 1000.0 {
            self.initialize(x, y, timestamp_ms);
            return (x, y);
        }

        Self::predict(state, dt, self.config.process_noise);
        Self::update(state, Vector2::new(x, y), measurement_noise);
        state.timestamp_ms = timestamp_ms;

        (state.x[0], state.x[1])
    }
}

impl Default for GazeKalmanFilter {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

impl TemporalFilter for GazeKalmanFilter {
    fn apply(&mut self, x: f64, y: f64, timestamp_ms: f64) -> (f64, f64) {
        let noise = self.config.measurement_noise;
        self.filter_with_noise(x, y, timestamp_ms, noise)
    }

    fn velocity(&self) -> Option<(f64, f64)> {
        self.state.as_ref().map(|s| (s.x[2], s.x[3]))
    }

    fn reset(&mut self) {
        self.state = None;
    }

    fn name(&self) -> &str {
        "GazeKalmanFilter"
    }
}

/// Adaptive variant that estimates measurement noise from recent input.
///
/// The last 5 measurements' variance sets the measurement-noise covariance
/// within configured bounds, so a noisy stream is automatically trusted
/// less without manual retuning.
pub struct AdaptiveKalmanFilter {
    inner: GazeKalmanFilter,
    history: VecDeque<(f64, f64)>,
    window: usize,
}

impl AdaptiveKalmanFilter {
    #[must_use]
    pub fn new(config: KalmanConfig) -> Self {
        Self {
            inner: GazeKalmanFilter::new(config),
            history: VecDeque::with_capacity(5),
            window: 5,
        }
    }

    fn measurement_variance(&self) -> Option<f64> {
        if self.history.len() < self.window {
            return None;
        }

        let n = self.history.len() as f64;
        let mean_x = self.history.iter().map(|m| m.0).sum::<f64>() / n;
        let mean_y = self.history.iter().map(|m| m.1).sum::<f64>() / n;
        let var_x = self
            .history
            .iter()
            .map(|m| (m.0 - mean_x).powi(2))
            .sum::<f64>()
            / n;
        let var_y = self
            .history
            .iter()
            .map(|m| (m.1 - mean_y).powi(2))
            .sum::<f64>()
            / n;

        Some((var_x + var_y) / 2.0)
    }
}

impl Default for AdaptiveKalmanFilter {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

impl TemporalFilter for AdaptiveKalmanFilter {
    fn apply(&mut self, x: f64, y: f64, timestamp_ms: f64) -> (f64, f64) {
        if self.history.len() >= self.window {
            self.history.pop_front();
        }
        self.history.push_back((x, y));

        let noise = match self.measurement_variance() {
            Some(variance) => (variance * 10.0).clamp(ADAPTIVE_NOISE_MIN, ADAPTIVE_NOISE_MAX),
            None => self.inner.config.measurement_noise,
        };

        self.inner.filter_with_noise(x, y, timestamp_ms, noise)
    }

    fn velocity(&self) -> Option<(f64, f64)> {
        self.inner.velocity()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.history.clear();
    }

    fn name(&self) -> &str {
        "AdaptiveKalmanFilter"
    }
}
