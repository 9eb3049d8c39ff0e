//! Performance optimizers bounding the per-frame CPU cost.

/// Adaptive frame skipping driven by gaze and face velocity
pub mod frame_skip;

/// Adaptive ROI padding and cross-frame ROI caching
pub mod roi;

/// Reusable buffer pool for heavy pixel buffers
pub mod pool;

pub use frame_skip::{AdaptiveFrameSkipper, FrameSkipConfig, FrameSkipStats};
pub use pool::{BufferPool, PixelBuffer};
pub use roi::{AdaptiveRoiController, Roi, RoiConfig, RoiStats};
