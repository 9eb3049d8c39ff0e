//! Adaptive region-of-interest control for the secondary detector.
//!
//! Padding around the eye regions adapts to recent detection success, and a
//! cached ROI pair is reused across frames while the face stays still.

use serde::{Deserialize, Serialize};

/// Axis-aligned region of interest in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Roi {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// ROI controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub base_padding: f64,
    pub min_padding: f64,
    pub max_padding: f64,
    /// Padding adjustment applied per update
    pub padding_step: f64,
    /// Cache lifetime in frames
    pub cache_duration: u32,
    /// Scale factor applied when downsampling a ROI
    pub downsample_scale: f64,
    /// Face velocity above which the cache is invalidated
    pub movement_threshold: f64,
    /// Window of detection results driving the padding
    pub history_size: usize,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            base_padding: 0.2,
            min_padding: 0.1,
            max_padding: 0.3,
            padding_step: 0.02,
            cache_duration: 5,
            downsample_scale: 0.75,
            movement_threshold: 0.05,
            history_size: 10,
        }
    }
}

/// ROI controller statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct RoiStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_padding: f64,
    pub downsample_count: u64,
}

#[derive(Debug, Clone)]
struct CachedRoi {
    left: Roi,
    right: Roi,
    frame_age: u32,
}

/// Adapts eye-ROI padding and caches the ROI pair across still frames
pub struct AdaptiveRoiController {
    config: RoiConfig,
    stats: RoiStats,
    detection_history: Vec<bool>,
    current_padding: f64,
    cached: Option<CachedRoi>,
}

impl AdaptiveRoiController {
    #[must_use]
    pub fn new(config: RoiConfig) -> Self {
        let current_padding = config.base_padding;
        Self {
            config,
            stats: RoiStats::default(),
            detection_history: Vec::new(),
            current_padding,
            cached: None,
        }
    }

    /// Record a detection result and return the adapted padding.
    ///
    /// A success rate above 0.8 over the recent window shrinks padding
    /// toward the minimum; below 0.5 grows it toward the maximum.
    pub fn adaptive_padding(&mut self, detection_success: bool) -> f64 {
        self.detection_history.push(detection_success);
        if self.detection_history.len() > self.config.history_size {
            self.detection_history.remove(0);
        }

        let successes = self.detection_history.iter().filter(|&&s| s).count();
        let success_rate = successes as f64 / self.detection_history.len() as f64;

        if success_rate > 0.8 {
            self.current_padding =
                (self.current_padding - self.config.padding_step).max(self.config.min_padding);
        } else if success_rate < 0.5 {
            self.current_padding =
                (self.current_padding + self.config.padding_step).min(self.config.max_padding);
        }

        self.stats.avg_padding = self.stats.avg_padding * 0.9 + self.current_padding * 0.1;
        self.current_padding
    }

    /// Whether the cached ROI pair may be reused this frame.
    ///
    /// Exceeding the movement threshold or the cache age invalidates the
    /// cache and counts as a miss.
    pub fn should_reuse_roi(&mut self, face_velocity: f64) -> bool {
        let Some(cached) = self.cached.as_mut() else {
            return false;
        };

        if cached.frame_age >= self.config.cache_duration
            || face_velocity > self.config.movement_threshold
        {
            self.cached = None;
            self.stats.cache_misses += 1;
            return false;
        }

        cached.frame_age += 1;
        self.stats.cache_hits += 1;
        true
    }

    /// Store the ROI pair for reuse
    pub fn cache_roi(&mut self, left: Roi, right: Roi) {
        self.cached = Some(CachedRoi {
            left,
            right,
            frame_age: 0,
        });
    }

    #[must_use]
    pub fn cached_roi(&self) -> Option<(Roi, Roi)> {
        self.cached.as_ref().map(|c| (c.left, c.right))
    }

    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    /// Expand a base rectangle by the adaptive padding, optionally applying
    /// the downsample scale around the same center.
    pub fn calculate_optimized_roi(
        &mut self,
        base: Roi,
        detection_success: bool,
        downsample: bool,
    ) -> Roi {
        let padding = self.adaptive_padding(detection_success);

        let padded = Roi {
            x: (f64::from(base.x) - f64::from(base.width) * padding).floor() as i32,
            y: (f64::from(base.y) - f64::from(base.height) * padding).floor() as i32,
            width: (f64::from(base.width) * (1.0 + padding * 2.0)).floor() as i32,
            height: (f64::from(base.height) * (1.0 + padding * 2.0)).floor() as i32,
        };

        if downsample {
            self.downsample_roi(padded)
        } else {
            padded
        }
    }

    /// Shrink a ROI around its center by the configured scale
    pub fn downsample_roi(&mut self, roi: Roi) -> Roi {
        let scale = self.config.downsample_scale;
        let center_x = f64::from(roi.x) + f64::from(roi.width) / 2.0;
        let center_y = f64::from(roi.y) + f64::from(roi.height) / 2.0;
        let new_width = f64::from(roi.width) * scale;
        let new_height = f64::from(roi.height) * scale;

        self.stats.downsample_count += 1;

        Roi {
            x: (center_x - new_width / 2.0).floor() as i32,
            y: (center_y - new_height / 2.0).floor() as i32,
            width: new_width.floor() as i32,
            height: new_height.floor() as i32,
        }
    }

    #[must_use]
    pub fn current_padding(&self) -> f64 {
        self.current_padding
    }

    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.stats.cache_hits + self.stats.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.stats.cache_hits as f64 / total as f64
    }

    #[must_use]
    pub fn stats(&self) -> RoiStats {
        self.stats
    }

    pub fn update_config(&mut self, config: RoiConfig) {
        self.config = config;
        self.current_padding = self
            .current_padding
            .clamp(self.config.min_padding, self.config.max_padding);
    }

    pub fn reset_stats(&mut self) {
        self.stats = RoiStats::default();
        self.detection_history.clear();
    }
}

impl Default for AdaptiveRoiController {
    fn default() -> Self {
        Self::new(RoiConfig::default())
    }
}
