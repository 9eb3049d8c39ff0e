//! Shared helpers for integration tests: synthetic face frames with
//! controllable iris positions.
#![allow(dead_code)]

use gaze_estimation::frame::{EyeLandmarks, FaceFrame, Point2, Point3};

pub const FRAME_MS: f64 = 33.0;

/// An open eye centered at (cx, cy) whose iris is shifted horizontally and
/// vertically by the given pixel amounts.
pub fn eye(cx: f64, cy: f64, iris_dx: f64, iris_dy: f64) -> EyeLandmarks {
    let iris_x = cx + iris_dx;
    let iris_y = cy + iris_dy;
    let r = 3.0;
    let iris = [
        Point3::new(iris_x + r, iris_y, 0.0),
        Point3::new(iris_x, iris_y + r, 0.0),
        Point3::new(iris_x - r, iris_y, 0.0),
        Point3::new(iris_x, iris_y - r, 0.0),
        Point3::new(
            iris_x + r * std::f64::consts::FRAC_1_SQRT_2,
            iris_y + r * std::f64::consts::FRAC_1_SQRT_2,
            0.0,
        ),
    ];

    EyeLandmarks {
        outer: Point2::new(cx - 15.0, cy),
        inner: Point2::new(cx + 15.0, cy),
        top: Point2::new(cx, cy - 5.0),
        bottom: Point2::new(cx, cy + 5.0),
        top_mid: Point2::new(cx + 5.0, cy - 4.0),
        bottom_mid: Point2::new(cx + 5.0, cy + 4.0),
        iris: Some(iris),
    }
}

/// Stable nose landmark cluster
pub fn nose() -> Vec<Point3> {
    vec![
        Point3::new(318.0, 240.0, 0.0),
        Point3::new(312.0, 232.0, 2.0),
        Point3::new(324.0, 233.0, 2.0),
        Point3::new(317.0, 226.0, 4.0),
        Point3::new(320.0, 248.0, 1.0),
        Point3::new(315.0, 244.0, 0.5),
    ]
}

/// A full face frame at `t` with both irises shifted by (dx, dy) pixels
pub fn frame(t: f64, iris_dx: f64, iris_dy: f64) -> FaceFrame {
    FaceFrame::new(
        t,
        eye(250.0, 200.0, iris_dx, iris_dy),
        eye(390.0, 200.0, iris_dx, iris_dy),
        nose(),
        640.0,
        480.0,
    )
}
