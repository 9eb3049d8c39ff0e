//! Multi-algorithm gaze fusion.
//!
//! Merges up to three independent per-frame estimates (geometric ray model,
//! secondary classical pupil detector, lightweight 2D offset model) into a
//! single estimate via confidence-gated, weighted averaging with outlier
//! rejection against the per-axis median.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MIN_CONFIDENCE, DEFAULT_OUTLIER_THRESHOLD, DEFAULT_WEIGHT_GEOMETRY,
    DEFAULT_WEIGHT_OFFSET, DEFAULT_WEIGHT_SECONDARY,
};
use crate::utils::median;

/// Origin of a gaze estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GazeSource {
    /// 3D geometric ray model
    Geometry,
    /// Secondary classical-CV pupil detector
    Secondary,
    /// Lightweight 2D iris-offset model
    Offset,
    /// Weighted combination of multiple sources
    Fused,
}

/// One gaze estimate in normalized screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimate {
    pub x: f64,
    pub y: f64,
    /// Estimator self-confidence in [0, 1]
    pub confidence: f64,
    pub source: GazeSource,
}

impl GazeEstimate {
    /// The explicit invalid-result signal: zero position, zero confidence
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
            source: GazeSource::Fused,
        }
    }

    /// True when this estimate carries usable data
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Per-source base weights used in fusion
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub offset: f64,
    pub secondary: f64,
    pub geometry: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            offset: DEFAULT_WEIGHT_OFFSET,
            secondary: DEFAULT_WEIGHT_SECONDARY,
            geometry: DEFAULT_WEIGHT_GEOMETRY,
        }
    }
}

/// Fusion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub base_weights: FusionWeights,
    /// Multiply base weights by each estimate's own confidence
    pub use_dynamic_weighting: bool,
    /// Estimates below this confidence are dropped
    pub min_confidence: f64,
    /// Maximum distance from the per-axis median before an estimate is
    /// rejected as an outlier (normalized screen units)
    pub outlier_threshold: f64,
    pub enable_geometry: bool,
    pub enable_secondary: bool,
    pub enable_offset: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            base_weights: FusionWeights::default(),
            use_dynamic_weighting: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            enable_geometry: true,
            enable_secondary: true,
            enable_offset: true,
        }
    }
}

/// Usage statistics for observability
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionStats {
    pub total_estimates: u64,
    pub geometry_used: u64,
    pub secondary_used: u64,
    pub offset_used: u64,
    pub fused_used: u64,
    pub average_confidence: f64,
}

/// Fuses per-frame gaze estimates into one
pub struct FusionEngine {
    config: FusionConfig,
    stats: FusionStats,
}

impl FusionEngine {
    #[must_use]
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            stats: FusionStats::default(),
        }
    }

    /// Fuse the available estimates for one frame.
    ///
    /// Returns [`GazeEstimate::invalid`] when nothing usable remains; a
    /// single surviving estimate passes through with its source preserved.
    pub fn fuse(
        &mut self,
        geometry: Option<GazeEstimate>,
        secondary: Option<GazeEstimate>,
        offset: Option<GazeEstimate>,
    ) -> GazeEstimate {
        self.stats.total_estimates += 1;

        let mut valid = Vec::with_capacity(3);
        if self.config.enable_geometry {
            if let Some(e) = geometry.filter(|e| e.confidence >= self.config.min_confidence) {
                valid.push(e);
            }
        }
        if self.config.enable_secondary {
            if let Some(e) = secondary.filter(|e| e.confidence >= self.config.min_confidence) {
                valid.push(e);
            }
        }
        if self.config.enable_offset {
            if let Some(e) = offset.filter(|e| e.confidence >= self.config.min_confidence) {
                valid.push(e);
            }
        }

        if valid.len() > 2 {
            valid = self.reject_outliers(valid);
        }

        let result = match valid.len() {
            0 => {
                log::debug!("no valid gaze estimates this frame");
                GazeEstimate::invalid()
            }
            1 => {
                self.count_source(valid[0].source);
                valid[0]
            }
            _ => {
                self.stats.fused_used += 1;
                self.weighted_average(&valid)
            }
        };

        let n = self.stats.total_estimates as f64;
        self.stats.average_confidence =
            (self.stats.average_confidence * (n - 1.0) + result.confidence) / n;

        if self.stats.total_estimates % 100 == 0 {
            self.log_stats();
        }

        result
    }

    /// Drop estimates whose distance from the per-axis median exceeds the threshold
    fn reject_outliers(&self, estimates: Vec<GazeEstimate>) -> Vec<GazeEstimate> {
        let xs: Vec<f64> = estimates.iter().map(|e| e.x).collect();
        let ys: Vec<f64> = estimates.iter().map(|e| e.y).collect();
        let median_x = median(&xs);
        let median_y = median(&ys);

        estimates
            .into_iter()
            .filter(|e| {
                let distance = (e.x - median_x).hypot(e.y - median_y);
                distance <= self.config.outlier_threshold
            })
            .collect()
    }

    fn weighted_average(&self, estimates: &[GazeEstimate]) -> GazeEstimate {
        let mut total_weight = 0.0;
        let mut weighted_x = 0.0;
        let mut weighted_y = 0.0;
        let mut total_confidence = 0.0;

        for estimate in estimates {
            let mut weight = self.base_weight(estimate.source);
            if self.config.use_dynamic_weighting {
                weight *= estimate.confidence;
            }

            weighted_x += estimate.x * weight;
            weighted_y += estimate.y * weight;
            total_weight += weight;
            total_confidence += estimate.confidence;
        }

        if total_weight <= 0.0 {
            return GazeEstimate::invalid();
        }

        GazeEstimate {
            x: weighted_x / total_weight,
            y: weighted_y / total_weight,
            confidence: total_confidence / estimates.len() as f64,
            source: GazeSource::Fused,
        }
    }

    fn base_weight(&self, source: GazeSource) -> f64 {
        match source {
            GazeSource::Offset => self.config.base_weights.offset,
            GazeSource::Secondary => self.config.base_weights.secondary,
            GazeSource::Geometry => self.config.base_weights.geometry,
            GazeSource::Fused => 1.0,
        }
    }

    fn count_source(&mut self, source: GazeSource) {
        match source {
            GazeSource::Geometry => self.stats.geometry_used += 1,
            GazeSource::Secondary => self.stats.secondary_used += 1,
            GazeSource::Offset => self.stats.offset_used += 1,
            GazeSource::Fused => self.stats.fused_used += 1,
        }
    }

    fn log_stats(&self) {
        let total = self.stats.total_estimates.max(1) as f64;
        log::debug!(
            "fusion stats: total={} geometry={:.1}% secondary={:.1}% offset={:.1}% fused={:.1}% avg_conf={:.3}",
            self.stats.total_estimates,
            self.stats.geometry_used as f64 / total * 100.0,
            self.stats.secondary_used as f64 / total * 100.0,
            self.stats.offset_used as f64 / total * 100.0,
            self.stats.fused_used as f64 / total * 100.0,
            self.stats.average_confidence
        );
    }

    /// Replace fusion weights at runtime (e.g. for vertical-gaze reweighting)
    pub fn set_weights(&mut self, weights: FusionWeights) {
        self.config.base_weights = weights;
    }

    #[must_use]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: FusionConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = FusionStats::default();
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}
