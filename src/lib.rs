//! Gaze estimation and calibration engine.
//!
//! This library estimates where a user is looking on a screen, in real
//! time, from per-frame facial-geometry observations supplied by an
//! external landmark estimator. It combines:
//! - a 3D geometric ray model with per-session eye-sphere calibration
//! - least-squares iris ellipse fitting
//! - multi-algorithm fusion over up to three independent estimates
//! - adaptive Kalman smoothing of the gaze stream
//! - a five-stage interactive calibration procedure producing a per-user
//!   sensitivity matrix
//! - click-driven adaptive bias correction and sensitivity refinement
//! - frame-skip/ROI/buffer-pool optimizers bounding the per-frame cost
//!
//! The engine is embedded: it has no camera, rendering or network surface.
//! The caller feeds one [`frame::FaceFrame`] per processed video frame and
//! receives one [`pipeline::GazePoint`] (or `None`) back.
//!
//! # Examples
//!
//! ## Frame-by-frame tracking
//!
//! ```no_run
//! use gaze_estimation::config::Config;
//! use gaze_estimation::frame::FaceFrame;
//! use gaze_estimation::pipeline::GazeTracker;
//!
//! # fn next_frame() -> Option<FaceFrame> { None }
//! # fn main() -> gaze_estimation::Result<()> {
//! let mut tracker = GazeTracker::new(Config::default())?;
//!
//! // Driven by the external frame source, once per video frame
//! while let Some(frame) = next_frame() {
//!     if let Some(point) = tracker.process_frame(Some(&frame)) {
//!         println!("gaze at ({:.2}, {:.2})", point.x, point.y);
//!     }
//! }
//! tracker.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the calibration procedure
//!
//! ```no_run
//! use gaze_estimation::calibration::{CalibrationConfig, CalibrationEvent, CalibrationSession};
//! use gaze_estimation::frame::Point2;
//!
//! let mut session = CalibrationSession::new("user-1", CalibrationConfig::default(), 0.0);
//! session.record_camera_position(Some(Point2::new(0.5, 0.02)), 0.0);
//!
//! // Per frame: feed the raw sample and the live gaze estimate
//! # let (now_ms, raw, live) = (33.0, Default::default(), None);
//! for event in session.push_sample(now_ms, raw, live) {
//!     if let CalibrationEvent::Completed { score } = event {
//!         println!("calibration passed with score {score:.2}");
//!     }
//! }
//! ```

/// Per-frame landmark input contract
pub mod frame;

/// Least-squares ellipse fitting for iris observations
pub mod ellipse;

/// 3D geometric gaze model
pub mod geometry;

/// Multi-algorithm estimate fusion
pub mod fusion;

/// Temporal filtering of the gaze stream
pub mod filters;

/// Vertical gaze correction
pub mod correction;

/// Five-stage calibration state machine and profiles
pub mod calibration;

/// Click-driven adaptive learning
pub mod adaptive;

/// Frame-skip, ROI and buffer-pool optimizers
pub mod perf;

/// Background worker boundary for the secondary pupil detector
pub mod worker;

/// The per-frame tracking pipeline
pub mod pipeline;

/// Calibration profile persistence boundary
pub mod storage;

/// Configuration management
pub mod config;

/// Constants used throughout the library
pub mod constants;

/// Small numeric helpers
pub mod utils;

/// Error types and result handling
pub mod error;

pub use error::{Error, Result};
