//! Vertical gaze correction.
//!
//! Vertical accuracy lags horizontal accuracy in iris-based tracking: lids
//! occlude the iris when looking up or down, and head pitch couples into
//! the signal. This module applies three corrections to the Y estimate,
//! with every factor exposed through configuration since the useful values
//! are per-setup tunables rather than universal constants.

use serde::{Deserialize, Serialize};

use crate::constants::NORMAL_EAR;
use crate::fusion::FusionWeights;
use crate::utils::clamp01;

/// Vertical correction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalCorrectionConfig {
    /// Head pitch contribution to the correction
    pub pitch_factor: f64,
    /// EAR deviation contribution to the correction
    pub ear_factor: f64,
    /// Strength of the away-from-center nonlinear boost
    pub nonlinear_factor: f64,
    /// Exponent of the nonlinear term
    pub nonlinear_power: f64,
    /// Baseline EAR for a normally open eye
    pub normal_ear: f64,
    /// Delta-Y above which a movement counts as vertical gaze
    pub vertical_threshold: f64,
    pub enabled: bool,
}

impl Default for VerticalCorrectionConfig {
    fn default() -> Self {
        Self {
            pitch_factor: 0.3,
            ear_factor: 0.5,
            nonlinear_factor: 0.2,
            nonlinear_power: 1.2,
            normal_ear: NORMAL_EAR,
            vertical_threshold: 0.3,
            enabled: true,
        }
    }
}

/// Correction statistics for observability
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionStats {
    pub total_corrections: u64,
    pub vertical_gaze_count: u64,
    pub horizontal_gaze_count: u64,
    pub avg_pitch_correction: f64,
    pub avg_ear_correction: f64,
    pub avg_nonlinear_correction: f64,
}

/// Applies pitch/EAR/nonlinear corrections to the vertical gaze coordinate
pub struct VerticalGazeCorrector {
    config: VerticalCorrectionConfig,
    stats: CorrectionStats,
    prev_gaze: Option<(f64, f64)>,
}

impl VerticalGazeCorrector {
    #[must_use]
    pub fn new(config: VerticalCorrectionConfig) -> Self {
        Self {
            config,
            stats: CorrectionStats::default(),
            prev_gaze: None,
        }
    }

    /// Correct the vertical coordinate given head pitch and the current EAR.
    ///
    /// Output is clamped to [0, 1].
    pub fn correct_vertical(&mut self, gaze_y: f64, head_pitch: f64, ear: f64) -> f64 {
        if !self.config.enabled {
            return gaze_y;
        }

        self.stats.total_corrections += 1;

        // Head tilted up or down drags the apparent gaze with it
        let pitch_correction = head_pitch * self.config.pitch_factor;

        // Looking up narrows the visible eye opening; a reduced EAR pulls
        // the estimate back up
        let ear_correction = (self.config.normal_ear - ear) * self.config.ear_factor;

        // Stronger correction toward the screen edges
        let deviation = gaze_y - 0.5;
        let nonlinear_correction = deviation.signum()
            * deviation.abs().powf(self.config.nonlinear_power)
            * self.config.nonlinear_factor;

        let corrected = gaze_y + pitch_correction - ear_correction + nonlinear_correction;

        self.update_stats(pitch_correction, ear_correction, nonlinear_correction);

        clamp01(corrected)
    }

    /// Classify the current movement as vertical or horizontal gaze.
    ///
    /// Vertical means the Y delta dominates and exceeds the threshold.
    pub fn is_vertical_gaze(&mut self, x: f64, y: f64) -> bool {
        let Some((prev_x, prev_y)) = self.prev_gaze.replace((x, y)) else {
            return false;
        };

        let dx = (x - prev_x).abs();
        let dy = (y - prev_y).abs();

        let vertical = dy > dx && dy > self.config.vertical_threshold;
        if vertical {
            self.stats.vertical_gaze_count += 1;
        } else {
            self.stats.horizontal_gaze_count += 1;
        }
        vertical
    }

    /// Fusion weights adapted to the gaze direction: vertical movement
    /// doubles the geometric model's share at the expense of the offset model.
    #[must_use]
    pub fn dynamic_weights(&self, vertical: bool) -> FusionWeights {
        if vertical {
            FusionWeights {
                offset: 0.45,
                secondary: 0.25,
                geometry: 0.30,
            }
        } else {
            FusionWeights::default()
        }
    }

    /// EAR threshold adjusted for upward gaze, where a lowered lid is normal
    #[must_use]
    pub fn adjusted_ear_threshold(&self, base_threshold: f64, looking_up: bool) -> f64 {
        if looking_up {
            base_threshold * 0.8
        } else {
            base_threshold
        }
    }

    fn update_stats(&mut self, pitch: f64, ear: f64, nonlinear: f64) {
        let n = self.stats.total_corrections as f64;
        self.stats.avg_pitch_correction =
            (self.stats.avg_pitch_correction * (n - 1.0) + pitch.abs()) / n;
        self.stats.avg_ear_correction = (self.stats.avg_ear_correction * (n - 1.0) + ear.abs()) / n;
        self.stats.avg_nonlinear_correction =
            (self.stats.avg_nonlinear_correction * (n - 1.0) + nonlinear.abs()) / n;
    }

    #[must_use]
    pub fn stats(&self) -> CorrectionStats {
        self.stats
    }

    #[must_use]
    pub fn config(&self) -> &VerticalCorrectionConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: VerticalCorrectionConfig) {
        self.config = config;
    }

    pub fn reset(&mut self) {
        self.stats = CorrectionStats::default();
        self.prev_gaze = None;
    }
}

impl Default for VerticalGazeCorrector {
    fn default() -> Self {
        Self::new(VerticalCorrectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_passes_through() {
        let config = VerticalCorrectionConfig {
            enabled: false,
            ..VerticalCorrectionConfig::default()
        };
        let mut corrector = VerticalGazeCorrector::new(config);
        assert_eq!(corrector.correct_vertical(0.3, 0.5, 0.1), 0.3);
    }

    #[test]
    fn test_pitch_pushes_down() {
        let mut corrector = VerticalGazeCorrector::default();
        // Positive pitch (looking down) at neutral EAR moves Y downward
        let corrected = corrector.correct_vertical(0.5, 0.2, NORMAL_EAR);
        assert!(corrected > 0.5);
    }

    #[test]
    fn test_reduced_ear_pulls_up() {
        let mut corrector = VerticalGazeCorrector::default();
        // Narrowed eye opening (looking up) at zero pitch pulls Y upward
        let corrected = corrector.correct_vertical(0.5, 0.0, NORMAL_EAR - 0.05);
        assert!(corrected < 0.5);
    }

    #[test]
    fn test_nonlinear_grows_toward_edges() {
        let mut corrector = VerticalGazeCorrector::default();
        let near_center = corrector.correct_vertical(0.55, 0.0, NORMAL_EAR) - 0.55;
        let near_edge = corrector.correct_vertical(0.9, 0.0, NORMAL_EAR) - 0.9;
        assert!(near_edge > near_center);
    }

    #[test]
    fn test_output_clamped() {
        let mut corrector = VerticalGazeCorrector::default();
        let corrected = corrector.correct_vertical(0.98, 0.5, NORMAL_EAR);
        assert!(corrected <= 1.0);
    }

    #[test]
    fn test_vertical_gaze_classification() {
        let mut corrector = VerticalGazeCorrector::default();
        assert!(!corrector.is_vertical_gaze(0.5, 0.1)); // first sample
        assert!(corrector.is_vertical_gaze(0.5, 0.6)); // big vertical jump
        assert!(!corrector.is_vertical_gaze(0.9, 0.65)); // horizontal move
    }

    #[test]
    fn test_dynamic_weights_shift() {
        let corrector = VerticalGazeCorrector::default();
        let vertical = corrector.dynamic_weights(true);
        let horizontal = corrector.dynamic_weights(false);
        assert!(vertical.geometry > horizontal.geometry);
        assert!(vertical.offset < horizontal.offset);
        assert_eq!(vertical.secondary, horizontal.secondary);
    }

    #[test]
    fn test_adjusted_ear_threshold() {
        let corrector = VerticalGazeCorrector::default();
        assert!((corrector.adjusted_ear_threshold(0.18, true) - 0.144).abs() < 1e-12);
        assert_eq!(corrector.adjusted_ear_threshold(0.18, false), 0.18);
    }
}
