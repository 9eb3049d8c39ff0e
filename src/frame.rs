//! Per-frame landmark input contract.
//!
//! The external landmark estimator produces one [`FaceFrame`] per processed
//! video frame (or signals "no face" by passing `None` to the pipeline).
//! Coordinates must be in one consistent space per frame, either pixels or
//! normalized; the engine only forms ratios and offsets so either works.

use serde::{Deserialize, Serialize};

use crate::constants::IRIS_LANDMARK_COUNT;

/// 2D point in frame space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 3D point in frame space (z from the landmark estimator's depth estimate)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn xy(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// Six-point eye contour plus optional iris boundary landmarks.
///
/// Contour points follow the blink-detection convention: `outer`/`inner` are
/// the horizontal corners, `top`/`bottom` the main vertical pair and
/// `top_mid`/`bottom_mid` the secondary vertical pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLandmarks {
    pub outer: Point2,
    pub inner: Point2,
    pub top: Point2,
    pub bottom: Point2,
    pub top_mid: Point2,
    pub bottom_mid: Point2,
    /// 5 iris boundary points when the estimator refines them; `None` otherwise
    pub iris: Option<[Point3; IRIS_LANDMARK_COUNT]>,
}

impl EyeLandmarks {
    /// Geometric eye center from the corner and lid landmarks
    #[must_use]
    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.outer.x + self.inner.x) / 2.0,
            (self.top.y + self.bottom.y) / 2.0,
        )
    }

    /// Eye width from the horizontal corners
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.outer.x - self.inner.x).abs()
    }

    /// Eye aspect ratio: (|p2-p6| + |p3-p5|) / (2 * |p1-p4|).
    ///
    /// Values above ~0.2 indicate an open eye; a closed or occluded eye
    /// drops well below that.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        let v1 = dist(self.top_mid, self.bottom_mid);
        let v2 = dist(self.top, self.bottom);
        let h = dist(self.outer, self.inner);
        if h <= f64::EPSILON {
            return 0.0;
        }
        (v1 + v2) / (2.0 * h)
    }
}

fn dist(a: Point2, b: Point2) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// One frame of facial-geometry observations.
///
/// Head yaw/pitch and the eye aspect ratio are derived once at construction
/// so downstream consumers read them without recomputation.
#[derive(Debug, Clone)]
pub struct FaceFrame {
    /// Wall-clock timestamp in milliseconds, supplied by the caller
    pub timestamp_ms: f64,
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
    /// Stable nose reference points used for the face coordinate frame;
    /// at least 3 are required for a well-conditioned basis
    pub nose: Vec<Point3>,
    /// Head yaw as a normalized horizontal nose-vs-eye-line offset
    pub head_yaw: f64,
    /// Head pitch as a normalized vertical nose-vs-eye-line offset
    pub head_pitch: f64,
    /// Average eye aspect ratio over both eyes
    pub ear: f64,
}

impl FaceFrame {
    /// Build a frame and derive head pose and EAR from the landmarks.
    ///
    /// `frame_width`/`frame_height` give the landmark coordinate extents and
    /// are used to normalize the head-pose offsets.
    #[must_use]
    pub fn new(
        timestamp_ms: f64,
        left_eye: EyeLandmarks,
        right_eye: EyeLandmarks,
        nose: Vec<Point3>,
        frame_width: f64,
        frame_height: f64,
    ) -> Self {
        let ear = (left_eye.aspect_ratio() + right_eye.aspect_ratio()) / 2.0;
        let (head_yaw, head_pitch) =
            derive_head_pose(&left_eye, &right_eye, &nose, frame_width, frame_height);

        Self {
            timestamp_ms,
            left_eye,
            right_eye,
            nose,
            head_yaw,
            head_pitch,
            ear,
        }
    }

    /// True when both eyes carry refined iris landmarks
    #[must_use]
    pub fn has_iris(&self) -> bool {
        self.left_eye.iris.is_some() && self.right_eye.iris.is_some()
    }

    /// Midpoint of the two geometric eye centers
    #[must_use]
    pub fn eyes_center(&self) -> Point2 {
        let l = self.left_eye.center();
        let r = self.right_eye.center();
        Point2::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0)
    }

    /// Normalized iris offset relative to the eye centers, averaged over
    /// both eyes. This is the raw horizontal/vertical gaze signal consumed
    /// by calibration. Requires iris centers computed upstream (ellipse fit
    /// or landmark centroid).
    #[must_use]
    pub fn iris_offset(&self, left_iris: Point2, right_iris: Point2) -> Point2 {
        let offset_for = |eye: &EyeLandmarks, iris: Point2| -> Point2 {
            let center = eye.center();
            let w = eye.width().max(f64::EPSILON);
            Point2::new((iris.x - center.x) / w, (iris.y - center.y) / w)
        };

        let l = offset_for(&self.left_eye, left_iris);
        let r = offset_for(&self.right_eye, right_iris);
        Point2::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0)
    }
}

/// Derive head yaw and pitch from the nose position relative to the eye line.
///
/// Yaw is positive when the nose sits right of the eye midpoint (head turned
/// left from the camera's view); pitch is positive when looking down.
fn derive_head_pose(
    left_eye: &EyeLandmarks,
    right_eye: &EyeLandmarks,
    nose: &[Point3],
    frame_width: f64,
    frame_height: f64,
) -> (f64, f64) {
    if nose.is_empty() || frame_width <= 0.0 || frame_height <= 0.0 {
        return (0.0, 0.0);
    }

    let nose_tip = nose[0];
    let eyes_x = (left_eye.center().x + right_eye.center().x) / 2.0;
    let eyes_y = (left_eye.center().y + right_eye.center().y) / 2.0;

    let yaw = (nose_tip.x - eyes_x) / frame_width;
    let pitch = (nose_tip.y - eyes_y) / frame_height;
    (yaw, pitch)
}
