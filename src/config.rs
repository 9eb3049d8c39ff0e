//! Configuration management for the gaze estimation engine

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adaptive::AdaptiveConfig;
use crate::calibration::CalibrationConfig;
use crate::constants::DEFAULT_EAR_THRESHOLD;
use crate::correction::VerticalCorrectionConfig;
use crate::fusion::FusionConfig;
use crate::perf::{FrameSkipConfig, RoiConfig};
use crate::{Error, Result};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Pipeline-level configuration
    pub pipeline: PipelineConfig,

    /// Estimate fusion configuration
    pub fusion: FusionConfig,

    /// Calibration procedure configuration
    pub calibration: CalibrationConfig,

    /// Click-driven adaptive learning configuration
    pub adaptive: AdaptiveConfig,

    /// Vertical gaze correction configuration
    pub vertical_correction: VerticalCorrectionConfig,

    /// Adaptive frame skipping configuration
    pub frame_skip: FrameSkipConfig,

    /// Adaptive ROI configuration
    pub roi: RoiConfig,
}

/// Pipeline-level parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// EAR below this treats the eyes as closed and skips the frame
    pub ear_threshold: f64,

    /// Temporal filter type ("adaptive_kalman", "kalman", "none")
    pub filter_type: String,

    /// Buffer pool capacity for detector frame crops
    pub buffer_pool_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            filter_type: "adaptive_kalman".to_string(),
            buffer_pool_capacity: 20,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.pipeline.ear_threshold) {
            return Err(Error::ConfigError(
                "EAR threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.fusion.min_confidence) {
            return Err(Error::ConfigError(
                "Fusion min confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.fusion.outlier_threshold <= 0.0 {
            return Err(Error::ConfigError(
                "Fusion outlier threshold must be positive".to_string(),
            ));
        }
        let weights = &self.fusion.base_weights;
        if weights.offset < 0.0 || weights.secondary < 0.0 || weights.geometry < 0.0 {
            return Err(Error::ConfigError(
                "Fusion weights must be non-negative".to_string(),
            ));
        }

        if self.frame_skip.max_interval == 0 {
            return Err(Error::ConfigError(
                "Max frame-skip interval must be greater than 0".to_string(),
            ));
        }
        if self.frame_skip.med_velocity_threshold > self.frame_skip.high_velocity_threshold {
            return Err(Error::ConfigError(
                "Medium velocity threshold must not exceed the high threshold".to_string(),
            ));
        }

        if self.roi.min_padding > self.roi.max_padding {
            return Err(Error::ConfigError(
                "Min ROI padding must not exceed max padding".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.roi.downsample_scale) {
            return Err(Error::ConfigError(
                "ROI downsample scale must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.calibration.verification_point_count == 0 {
            return Err(Error::ConfigError(
                "Verification point count must be greater than 0".to_string(),
            ));
        }
        if self.calibration.required_successes > self.calibration.verification_point_count {
            return Err(Error::ConfigError(
                "Required successes cannot exceed the verification point count".to_string(),
            ));
        }

        if self.adaptive.history_cap == 0 || self.adaptive.refine_every == 0 {
            return Err(Error::ConfigError(
                "Adaptive history cap and refinement interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Gaze Estimation Configuration

pipeline:
  ear_threshold: 0.18
  filter_type: "adaptive_kalman"
  buffer_pool_capacity: 20

fusion:
  base_weights:
    offset: 0.6
    secondary: 0.25
    geometry: 0.15
  use_dynamic_weighting: true
  min_confidence: 0.3
  outlier_threshold: 0.1
  enable_geometry: true
  enable_secondary: true
  enable_offset: true

calibration:
  settle_ms: 500.0
  natural_center_duration_ms: 2000.0
  corner_fixation_ms: 2000.0
  corner_threshold: 0.2
  verification_fixation_ms: 1500.0
  verification_threshold: 0.15
  verification_timeout_ms: 5000.0
  verification_point_count: 3
  required_successes: 2

adaptive:
  adjustment_rate: 0.1
  min_samples: 10
  history_cap: 100
  recent_window: 20
  refine_every: 20
  max_click_error: 0.3

vertical_correction:
  pitch_factor: 0.3
  ear_factor: 0.5
  nonlinear_factor: 0.2
  nonlinear_power: 1.2
  normal_ear: 0.15
  vertical_threshold: 0.3
  enabled: true

frame_skip:
  base_interval: 1
  max_interval: 3
  high_velocity_threshold: 0.1
  med_velocity_threshold: 0.05
  enabled: true

roi:
  base_padding: 0.2
  min_padding: 0.1
  max_padding: 0.3
  padding_step: 0.02
  cache_duration: 5
  downsample_scale: 0.75
  movement_threshold: 0.05
  history_size: 10
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.filter_type, "adaptive_kalman");
        assert_eq!(config.frame_skip.max_interval, 3);
    }

    #[test]
    fn test_invalid_ear_threshold() {
        let mut config = Config::default();
        config.pipeline.ear_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_roi_padding_order() {
        let mut config = Config::default();
        config.roi.min_padding = 0.5;
        config.roi.max_padding = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_verification_requirements() {
        let mut config = Config::default();
        config.calibration.required_successes = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("pipeline:\n  ear_threshold: 0.2\n").unwrap();
        assert_eq!(config.pipeline.ear_threshold, 0.2);
        assert_eq!(config.frame_skip.max_interval, 3);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.fusion.min_confidence = 0.4;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.fusion.min_confidence, 0.4);
    }
}
