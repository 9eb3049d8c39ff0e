//! Adaptive frame skipping.
//!
//! When the gaze and face are nearly still, processing every frame buys
//! nothing; when they move fast, skipping frames loses saccades. The skip
//! interval follows the larger of the two velocities.

use serde::{Deserialize, Serialize};

/// Frame skipper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSkipConfig {
    /// Interval used before any velocity information arrives
    pub base_interval: u32,
    /// Largest interval used when the scene is still
    pub max_interval: u32,
    /// Velocity above which every frame is processed
    pub high_velocity_threshold: f64,
    /// Velocity above which every second frame is processed
    pub med_velocity_threshold: f64,
    /// Disabled means every frame is processed
    pub enabled: bool,
}

impl Default for FrameSkipConfig {
    fn default() -> Self {
        Self {
            base_interval: 1,
            max_interval: 3,
            high_velocity_threshold: 0.1,
            med_velocity_threshold: 0.05,
            enabled: true,
        }
    }
}

/// Skipper statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSkipStats {
    pub total_frames: u64,
    pub processed_frames: u64,
    pub skipped_frames: u64,
    pub current_interval: u32,
    /// EMA-smoothed interval
    pub avg_interval: f64,
}

/// Decides per frame whether to run the full pipeline
pub struct AdaptiveFrameSkipper {
    config: FrameSkipConfig,
    stats: FrameSkipStats,
    current_interval: u32,
    frame_counter: u64,
}

impl AdaptiveFrameSkipper {
    #[must_use]
    pub fn new(config: FrameSkipConfig) -> Self {
        let current_interval = config.base_interval.max(1);
        Self {
            config,
            stats: FrameSkipStats {
                current_interval,
                avg_interval: 1.0,
                ..FrameSkipStats::default()
            },
            current_interval,
            frame_counter: 0,
        }
    }

    /// Decide whether to process the current frame given the latest gaze
    /// and face movement velocities (normalized units per second).
    pub fn should_process(&mut self, gaze_velocity: f64, face_velocity: f64) -> bool {
        self.stats.total_frames += 1;
        self.frame_counter += 1;

        if !self.config.enabled {
            self.stats.processed_frames += 1;
            return true;
        }

        self.update_interval(gaze_velocity.max(face_velocity));

        let process = self.frame_counter % u64::from(self.current_interval) == 0;
        if process {
            self.stats.processed_frames += 1;
            self.stats.avg_interval =
                self.stats.avg_interval * 0.9 + f64::from(self.current_interval) * 0.1;
        } else {
            self.stats.skipped_frames += 1;
        }
        process
    }

    fn update_interval(&mut self, max_velocity: f64) {
        self.current_interval = if max_velocity > self.config.high_velocity_threshold {
            1
        } else if max_velocity > self.config.med_velocity_threshold {
            2
        } else {
            self.config.max_interval.max(1)
        };
        self.stats.current_interval = self.current_interval;
    }

    /// Force the immediately following frame to be processed, e.g. after an
    /// externally significant event like a click
    pub fn force_next_frame(&mut self) {
        let interval = u64::from(self.current_interval.max(1));
        self.frame_counter = self.frame_counter - (self.frame_counter % interval) + interval - 1;
    }

    #[must_use]
    pub fn current_interval(&self) -> u32 {
        self.current_interval
    }

    #[must_use]
    pub fn processing_rate(&self) -> f64 {
        if self.stats.total_frames == 0 {
            return 1.0;
        }
        self.stats.processed_frames as f64 / self.stats.total_frames as f64
    }

    #[must_use]
    pub fn skip_rate(&self) -> f64 {
        if self.stats.total_frames == 0 {
            return 0.0;
        }
        self.stats.skipped_frames as f64 / self.stats.total_frames as f64
    }

    #[must_use]
    pub fn stats(&self) -> FrameSkipStats {
        self.stats
    }

    pub fn update_config(&mut self, config: FrameSkipConfig) {
        self.config = config;
        self.current_interval = self.current_interval.clamp(1, self.config.max_interval.max(1));
    }

    pub fn reset_stats(&mut self) {
        self.stats = FrameSkipStats {
            current_interval: self.current_interval,
            avg_interval: 1.0,
            ..FrameSkipStats::default()
        };
        self.frame_counter = 0;
    }
}

impl Default for AdaptiveFrameSkipper {
    fn default() -> Self {
        Self::new(FrameSkipConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_velocity_processes_everything() {
        let mut skipper = AdaptiveFrameSkipper::default();
        for _ in 0..100 {
            assert!(skipper.should_process(0.2, 0.0));
        }
        assert_eq!(skipper.processing_rate(), 1.0);
    }

    #[test]
    fn test_still_scene_processes_one_in_max_interval() {
        let mut skipper = AdaptiveFrameSkipper::default();
        for _ in 0..300 {
            skipper.should_process(0.0, 0.0);
        }
        // maxInterval = 3: about a third of the frames processed
        assert!((skipper.processing_rate() - 1.0 / 3.0).abs() < 0.01);
        assert_eq!(skipper.current_interval(), 3);
    }

    #[test]
    fn test_medium_velocity_alternates() {
        let mut skipper = AdaptiveFrameSkipper::default();
        for _ in 0..200 {
            skipper.should_process(0.07, 0.0);
        }
        assert!((skipper.processing_rate() - 0.5).abs() < 0.01);
        assert_eq!(skipper.current_interval(), 2);
    }

    #[test]
    fn test_face_velocity_counts_too() {
        let mut skipper = AdaptiveFrameSkipper::default();
        skipper.should_process(0.0, 0.2);
        assert_eq!(skipper.current_interval(), 1);
    }

    #[test]
    fn test_disabled_always_processes() {
        let config = FrameSkipConfig {
            enabled: false,
            ..FrameSkipConfig::default()
        };
        let mut skipper = AdaptiveFrameSkipper::new(config);
        for _ in 0..50 {
            assert!(skipper.should_process(0.0, 0.0));
        }
    }

    #[test]
    fn test_force_next_frame() {
        let mut skipper = AdaptiveFrameSkipper::default();
        // Settle into the slow interval
        for _ in 0..9 {
            skipper.should_process(0.0, 0.0);
        }
        skipper.force_next_frame();
        assert!(skipper.should_process(0.0, 0.0));
    }

    #[test]
    fn test_runtime_reconfiguration() {
        let mut skipper = AdaptiveFrameSkipper::default();
        for _ in 0..30 {
            skipper.should_process(0.0, 0.0);
        }
        assert_eq!(skipper.current_interval(), 3);

        skipper.update_config(FrameSkipConfig {
            max_interval: 5,
            ..FrameSkipConfig::default()
        });
        for _ in 0..100 {
            skipper.should_process(0.0, 0.0);
        }
        assert_eq!(skipper.current_interval(), 5);
    }

    #[test]
    fn test_stats_tracking() {
        let mut skipper = AdaptiveFrameSkipper::default();
        for _ in 0..30 {
            skipper.should_process(0.0, 0.0);
        }
        let stats = skipper.stats();
        assert_eq!(stats.total_frames, 30);
        assert_eq!(stats.processed_frames + stats.skipped_frames, 30);
        assert!(stats.avg_interval > 1.0);

        skipper.reset_stats();
        assert_eq!(skipper.stats().total_frames, 0);
    }
}
