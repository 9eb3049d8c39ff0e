//! Click-driven adaptive learning.
//!
//! Every user click during normal tracking is an implicit ground-truth
//! sample: the user looked where they clicked. Accumulated click errors
//! bias the calibrated gaze output and periodically refine the sensitivity
//! matrix itself.

use serde::{Deserialize, Serialize};

use crate::calibration::profile::{
    CalibrationProfile, ErrorSample, GazeSample, RefinementEntry,
};
use crate::constants::{
    ADAPTIVE_ADJUSTMENT_RATE, ADAPTIVE_HISTORY_CAP, ADAPTIVE_MAX_CLICK_ERROR,
    ADAPTIVE_MIN_SAMPLES, ADAPTIVE_RECENT_WINDOW, ADAPTIVE_REFINE_EVERY,
};
use crate::frame::Point2;
use crate::utils::median;

/// Adaptive learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Fraction of the median error applied as bias / refinement
    pub adjustment_rate: f64,
    /// Minimum error samples before any correction is applied
    pub min_samples: usize,
    /// Error history cap; the oldest sample is evicted beyond this
    pub history_cap: usize,
    /// Window of recent samples used for the bias and accuracy metrics
    pub recent_window: usize,
    /// Sensitivity refinement interval in clicks
    pub refine_every: usize,
    /// Clicks with a larger error are discarded as accidental
    pub max_click_error: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            adjustment_rate: ADAPTIVE_ADJUSTMENT_RATE,
            min_samples: ADAPTIVE_MIN_SAMPLES,
            history_cap: ADAPTIVE_HISTORY_CAP,
            recent_window: ADAPTIVE_RECENT_WINDOW,
            refine_every: ADAPTIVE_REFINE_EVERY,
            max_click_error: ADAPTIVE_MAX_CLICK_ERROR,
        }
    }
}

/// Outcome of recording one click
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickOutcome {
    /// Error sample recorded
    Recorded,
    /// Sample recorded and the sensitivity matrix was refined; the profile
    /// should be persisted now
    Refined { adjustment: Point2 },
    /// Click discarded (error too large to be a deliberate fixation)
    Discarded,
}

/// Maintains click-error history on a profile and applies corrections
pub struct AdaptiveCorrector {
    config: AdaptiveConfig,
}

impl AdaptiveCorrector {
    #[must_use]
    pub fn new(config: AdaptiveConfig) -> Self {
        Self { config }
    }

    /// Record a click with the gaze estimate and raw observation current at
    /// click time. Mutates the profile in place.
    pub fn record_click(
        &self,
        profile: &mut CalibrationProfile,
        click_position: Point2,
        estimated_gaze: Point2,
        raw: &GazeSample,
        now_ms: f64,
    ) -> ClickOutcome {
        let error = Point2::new(
            click_position.x - estimated_gaze.x,
            click_position.y - estimated_gaze.y,
        );

        let magnitude = error.x.hypot(error.y);
        if magnitude > self.config.max_click_error {
            log::debug!("click discarded, error {magnitude:.3} too large");
            return ClickOutcome::Discarded;
        }

        {
            let learning = &mut profile.adaptive_learning;
            learning.total_clicks += 1;
            learning.error_samples.push(ErrorSample {
                timestamp_ms: now_ms,
                click_position,
                estimated_gaze,
                error,
                iris_offset: Point2::new(raw.iris_offset_x, raw.iris_offset_y),
                head_yaw: raw.head_yaw,
                head_pitch: raw.head_pitch,
            });
            if learning.error_samples.len() > self.config.history_cap {
                let excess = learning.error_samples.len() - self.config.history_cap;
                learning.error_samples.drain(..excess);
            }
        }

        profile.adaptive_learning.current_accuracy = self.accuracy(profile);
        profile.updated_at_ms = now_ms;

        if profile.adaptive_learning.total_clicks % self.config.refine_every as u64 == 0 {
            let adjustment = self.refine_sensitivity(profile, now_ms);
            return ClickOutcome::Refined { adjustment };
        }

        ClickOutcome::Recorded
    }

    /// Accuracy metric in [0, 100] from the recent median Euclidean error
    #[must_use]
    pub fn accuracy(&self, profile: &CalibrationProfile) -> f64 {
        let samples = &profile.adaptive_learning.error_samples;
        if samples.is_empty() {
            return 0.0;
        }

        let recent: Vec<f64> = samples
            .iter()
            .rev()
            .take(self.config.recent_window)
            .map(|s| s.error.x.hypot(s.error.y))
            .collect();
        let median_error = median(&recent);

        (100.0 - median_error * 500.0).clamp(0.0, 100.0)
    }

    /// Multiplicative sensitivity refinement from the recent median error
    fn refine_sensitivity(&self, profile: &mut CalibrationProfile, now_ms: f64) -> Point2 {
        let recent: Vec<&ErrorSample> = profile
            .adaptive_learning
            .error_samples
            .iter()
            .rev()
            .take(self.config.recent_window)
            .collect();

        let error_x = median(&recent.iter().map(|s| s.error.x).collect::<Vec<_>>());
        let error_y = median(&recent.iter().map(|s| s.error.y).collect::<Vec<_>>());

        let adjustment = Point2::new(
            error_x * self.config.adjustment_rate,
            error_y * self.config.adjustment_rate,
        );

        let sensitivity = &mut profile.quick_calibration.sensitivity;
        sensitivity.base_x *= 1.0 + adjustment.x;
        sensitivity.base_y *= 1.0 + adjustment.y;

        profile
            .adaptive_learning
            .refinement_history
            .push(RefinementEntry {
                timestamp_ms: now_ms,
                adjustment,
            });
        profile.updated_at_ms = now_ms;

        log::info!(
            "sensitivity refined: adjustment=({:.4}, {:.4}) base=({:.2}, {:.2})",
            adjustment.x,
            adjustment.y,
            sensitivity.base_x,
            sensitivity.base_y
        );

        adjustment
    }

    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }
}

impl Default for AdaptiveCorrector {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CalibrationProfile {
        CalibrationProfile::empty("u", 0.0)
    }

    fn click(
        corrector: &AdaptiveCorrector,
        profile: &mut CalibrationProfile,
        click_pos: (f64, f64),
        gaze: (f64, f64),
        now_ms: f64,
    ) -> ClickOutcome {
        corrector.record_click(
            profile,
            Point2::new(click_pos.0, click_pos.1),
            Point2::new(gaze.0, gaze.1),
            &GazeSample::default(),
            now_ms,
        )
    }

    #[test]
    fn test_click_recorded() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();

        let outcome = click(&corrector, &mut profile, (0.5, 0.5), (0.45, 0.5), 100.0);
        assert_eq!(outcome, ClickOutcome::Recorded);
        assert_eq!(profile.adaptive_learning.total_clicks, 1);
        assert_eq!(profile.adaptive_learning.error_samples.len(), 1);

        let sample = &profile.adaptive_learning.error_samples[0];
        assert!((sample.error.x - 0.05).abs() < 1e-12);
        assert_eq!(sample.error.y, 0.0);
    }

    #[test]
    fn test_large_error_discarded() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();

        let outcome = click(&corrector, &mut profile, (0.9, 0.9), (0.1, 0.1), 100.0);
        assert_eq!(outcome, ClickOutcome::Discarded);
        assert_eq!(profile.adaptive_learning.total_clicks, 0);
        assert!(profile.adaptive_learning.error_samples.is_empty());
    }

    #[test]
    fn test_history_capped_oldest_evicted() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();

        for i in 0..150 {
            click(&corrector, &mut profile, (0.5, 0.5), (0.48, 0.5), i as f64);
        }
        let samples = &profile.adaptive_learning.error_samples;
        assert_eq!(samples.len(), ADAPTIVE_HISTORY_CAP);
        // Oldest entries were evicted, newest kept
        assert_eq!(samples.first().unwrap().timestamp_ms, 50.0);
        assert_eq!(samples.last().unwrap().timestamp_ms, 149.0);
    }

    #[test]
    fn test_refinement_every_20th_click() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();
        let base_x_before = profile.quick_calibration.sensitivity.base_x;

        let mut refined = 0;
        for i in 0..40 {
            let outcome = click(&corrector, &mut profile, (0.55, 0.5), (0.5, 0.5), i as f64);
            if matches!(outcome, ClickOutcome::Refined { .. }) {
                refined += 1;
            }
        }

        assert_eq!(refined, 2);
        assert_eq!(profile.adaptive_learning.refinement_history.len(), 2);
        // Consistent positive x error grows the x sensitivity
        assert!(profile.quick_calibration.sensitivity.base_x > base_x_before);
    }

    #[test]
    fn test_refinement_adjustment_value() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();

        let mut adjustment = None;
        for i in 0..20 {
            let outcome = click(&corrector, &mut profile, (0.6, 0.5), (0.5, 0.5), i as f64);
            if let ClickOutcome::Refined { adjustment: a } = outcome {
                adjustment = Some(a);
            }
        }

        // Median error 0.1 at the default 0.1 rate: 1% multiplicative step
        let a = adjustment.unwrap();
        assert!((a.x - 0.01).abs() < 1e-12);
        assert_eq!(a.y, 0.0);
    }

    #[test]
    fn test_accuracy_metric() {
        let corrector = AdaptiveCorrector::default();
        let mut profile = profile();

        // Perfect clicks: accuracy 100
        for i in 0..5 {
            click(&corrector, &mut profile, (0.5, 0.5), (0.5, 0.5), i as f64);
        }
        assert_eq!(profile.adaptive_learning.current_accuracy, 100.0);

        // 0.1 median error maps to 50
        let mut profile2 = CalibrationProfile::empty("u2", 0.0);
        for i in 0..5 {
            click(&corrector, &mut profile2, (0.6, 0.5), (0.5, 0.5), i as f64);
        }
        assert!((profile2.adaptive_learning.current_accuracy - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_empty_history() {
        let corrector = AdaptiveCorrector::default();
        assert_eq!(corrector.accuracy(&profile()), 0.0);
    }
}
