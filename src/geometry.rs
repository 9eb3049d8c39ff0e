//! 3D geometric gaze model.
//!
//! Builds an orthonormal face coordinate frame from the nose landmarks via
//! PCA, calibrates per-eye sphere models once per tracking session, derives
//! a binocular gaze ray and intersects it with a virtual monitor plane to
//! produce a normalized screen estimate.

use std::collections::VecDeque;

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use crate::constants::{
    CENTER_DEAD_ZONE, EYE_RADIUS, GAZE_SMOOTHER_LENGTH, INTER_PUPILLARY_DISTANCE,
    MONITOR_DISTANCE, MONITOR_HEIGHT, MONITOR_WIDTH,
};
use crate::frame::{FaceFrame, Point2, Point3};
use crate::fusion::{GazeEstimate, GazeSource};
use crate::utils::clamp01;

/// Confidence levels for the geometric estimate
const CONFIDENCE_CALIBRATED: f64 = 0.7;
const CONFIDENCE_UNCALIBRATED: f64 = 0.4;
const CONFIDENCE_FALLBACK: f64 = 0.25;

/// How strongly head pose shifts the fallback estimate
const FALLBACK_YAW_GAIN: f64 = 2.0;
const FALLBACK_PITCH_GAIN: f64 = 1.5;

/// Per-frame orthonormal face coordinate frame
#[derive(Debug, Clone)]
pub struct FaceCoordinateSystem {
    pub center: Vector3<f64>,
    /// Column vectors are the coordinate axes
    pub axes: Matrix3<f64>,
    /// Mean pairwise nose-landmark distance, used for distance compensation
    pub scale: f64,
}

/// Compute the face coordinate frame from nose landmarks using PCA.
///
/// `previous_axes` enforces temporal continuity: any eigenvector pointing
/// away from its predecessor is flipped, preventing basis-sign flips
/// between frames. Returns `None` for fewer than 3 landmarks.
#[must_use]
pub fn compute_face_coordinate_system(
    nose: &[Point3],
    previous_axes: Option<&Matrix3<f64>>,
) -> Option<FaceCoordinateSystem> {
    if nose.len() < 3 {
        return None;
    }

    let n = nose.len() as f64;
    let center = nose
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p.x, p.y, p.z))
        / n;

    let mut covariance = Matrix3::zeros();
    for p in nose {
        let d = Vector3::new(p.x, p.y, p.z) - center;
        covariance += d * d.transpose();
    }
    covariance /= n;

    let eigen = SymmetricEigen::new(covariance);
    let mut axes = eigen.eigenvectors;

    if let Some(previous) = previous_axes {
        axes = stabilize_axes(&axes, previous);
    }

    Some(FaceCoordinateSystem {
        center,
        axes,
        scale: mean_pairwise_distance(nose),
    })
}

/// Flip any axis whose dot product with the previous frame's axis is negative
fn stabilize_axes(current: &Matrix3<f64>, previous: &Matrix3<f64>) -> Matrix3<f64> {
    let mut stabilized = *current;
    for i in 0..3 {
        let dot = current.column(i).dot(&previous.column(i));
        if dot < 0.0 {
            for r in 0..3 {
                stabilized[(r, i)] = -current[(r, i)];
            }
        }
    }
    stabilized
}

fn mean_pairwise_distance(points: &[Point3]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let a = &points[i];
            let b = &points[j];
            total += ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt();
            count += 1;
        }
    }
    if count > 0 {
        total / count as f64
    } else {
        1.0
    }
}

/// Per-eye sphere in world coordinates for the current frame
#[derive(Debug, Clone, Copy)]
pub struct EyeSphere {
    pub center: Vector3<f64>,
    pub radius: f64,
}

/// Calibrated eye-sphere model held fixed for one tracking session.
///
/// Calibration stores each iris offset in face-local coordinates on the
/// first frame with valid iris data; every later frame re-derives the
/// world-space sphere centers through the current face frame, compensating
/// camera distance via the nose-scale ratio.
#[derive(Debug, Clone)]
pub struct EyeSphereTracker {
    calibration_scale: f64,
    left_offset: Vector3<f64>,
    right_offset: Vector3<f64>,
    dynamic_radius: f64,
    calibrated: bool,
}

impl EyeSphereTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calibration_scale: 1.0,
            left_offset: Vector3::new(-INTER_PUPILLARY_DISTANCE / 2.0, 0.0, 0.0),
            right_offset: Vector3::new(INTER_PUPILLARY_DISTANCE / 2.0, 0.0, 0.0),
            dynamic_radius: EYE_RADIUS,
            calibrated: false,
        }
    }

    /// One-shot calibration from the current iris positions.
    ///
    /// The eye radius is scaled by the measured inter-pupillary distance so
    /// close or distant faces get proportionally sized spheres.
    pub fn calibrate(
        &mut self,
        face: &FaceCoordinateSystem,
        left_iris: Vector3<f64>,
        right_iris: Vector3<f64>,
    ) {
        let transposed = face.axes.transpose();
        self.left_offset = transposed * (left_iris - face.center);
        self.right_offset = transposed * (right_iris - face.center);

        let measured_ipd = (right_iris - left_iris).norm();
        self.dynamic_radius = EYE_RADIUS * measured_ipd / INTER_PUPILLARY_DISTANCE;

        self.calibration_scale = face.scale.max(f64::EPSILON);
        self.calibrated = true;

        log::info!(
            "eye spheres calibrated: ipd={:.1} radius={:.2} scale={:.3}",
            measured_ipd,
            self.dynamic_radius,
            self.calibration_scale
        );
    }

    /// Current-frame world-space sphere positions
    #[must_use]
    pub fn track(&self, face: &FaceCoordinateSystem) -> (EyeSphere, EyeSphere) {
        let scale_ratio = face.scale / self.calibration_scale;
        let radius = self.dynamic_radius * scale_ratio;

        let left = EyeSphere {
            center: face.center + face.axes * (self.left_offset * scale_ratio),
            radius,
        };
        let right = EyeSphere {
            center: face.center + face.axes * (self.right_offset * scale_ratio),
            radius,
        };
        (left, right)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.calibrated
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for EyeSphereTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A gaze ray: origin plus unit direction
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vector3<f64>,
    pub direction: Vector3<f64>,
}

/// Build a gaze ray from an eye sphere center through the iris.
///
/// An iris reported inside the sphere is projected onto the sphere surface
/// first so the direction stays well conditioned.
#[must_use]
pub fn gaze_ray(eye_center: Vector3<f64>, iris: Vector3<f64>, radius: f64) -> Ray {
    let raw = iris - eye_center;
    let dist = raw.norm();

    let direction = if dist < f64::EPSILON {
        Vector3::new(0.0, 0.0, 1.0)
    } else if dist < radius {
        (raw * (radius / dist)).normalize()
    } else {
        raw / dist
    };

    Ray {
        origin: eye_center,
        direction,
    }
}

/// Combine both eye rays into one binocular ray: midpoint origin with an
/// equally weighted, renormalized direction average.
#[must_use]
pub fn combined_gaze(
    left: &EyeSphere,
    right: &EyeSphere,
    left_iris: Vector3<f64>,
    right_iris: Vector3<f64>,
) -> Ray {
    let left_ray = gaze_ray(left.center, left_iris, left.radius);
    let right_ray = gaze_ray(right.center, right_iris, right.radius);

    let summed = left_ray.direction * 0.5 + right_ray.direction * 0.5;
    let direction = summed
        .try_normalize(f64::EPSILON)
        .unwrap_or_else(|| Vector3::new(0.0, 0.0, 1.0));

    Ray {
        origin: (left.center + right.center) / 2.0,
        direction,
    }
}

/// Virtual monitor plane the gaze ray is intersected with
#[derive(Debug, Clone)]
pub struct VirtualMonitor {
    pub center: Vector3<f64>,
    pub normal: Vector3<f64>,
    pub width: f64,
    pub height: f64,
}

impl Default for VirtualMonitor {
    fn default() -> Self {
        Self {
            center: Vector3::new(0.0, 0.0, MONITOR_DISTANCE),
            normal: Vector3::new(0.0, 0.0, 1.0),
            width: MONITOR_WIDTH,
            height: MONITOR_HEIGHT,
        }
    }
}

impl VirtualMonitor {
    /// Ray-plane intersection. Returns `None` for near-parallel rays or
    /// intersections behind the origin.
    #[must_use]
    pub fn intersect(&self, ray: &Ray) -> Option<Vector3<f64>> {
        let denom = self.normal.dot(&ray.direction);
        if denom.abs() < 1e-4 {
            return None;
        }

        let t = self.normal.dot(&(self.center - ray.origin)) / denom;
        if t < 0.0 {
            return None;
        }

        Some(ray.origin + ray.direction * t)
    }

    /// Map an intersection point to normalized screen coordinates.
    ///
    /// Both axes are mirrored to account for the webcam mirror effect, and
    /// a small dead zone snaps near-center gaze to exactly (0.5, 0.5).
    #[must_use]
    pub fn to_screen(&self, intersection: Vector3<f64>) -> Point2 {
        let relative = intersection - self.center;

        let mut x = 0.5 - relative.x / self.width;
        let mut y = 0.5 - relative.y / self.height;

        if (x - 0.5).abs() < CENTER_DEAD_ZONE {
            x = 0.5;
        }
        if (y - 0.5).abs() < CENTER_DEAD_ZONE {
            y = 0.5;
        }

        Point2::new(x, y)
    }
}

/// Fixed-length trailing average over gaze directions
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    history: VecDeque<Vector3<f64>>,
    max_length: usize,
}

impl GazeSmoother {
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_length),
            max_length,
        }
    }

    /// Push a direction sample and return the renormalized history average
    pub fn add_sample(&mut self, direction: Vector3<f64>) -> Vector3<f64> {
        if self.history.len() >= self.max_length {
            self.history.pop_front();
        }
        self.history.push_back(direction);

        let sum: Vector3<f64> = self.history.iter().sum();
        sum.try_normalize(f64::EPSILON)
            .unwrap_or_else(|| Vector3::new(0.0, 0.0, 1.0))
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for GazeSmoother {
    fn default() -> Self {
        Self::new(GAZE_SMOOTHER_LENGTH)
    }
}

/// The full geometric gaze estimator: face frame, eye spheres, ray
/// smoothing and monitor projection with per-session one-shot calibration.
#[derive(Debug, Clone)]
pub struct GeometryEstimator {
    monitor: VirtualMonitor,
    spheres: EyeSphereTracker,
    smoother: GazeSmoother,
    previous_axes: Option<Matrix3<f64>>,
}

impl GeometryEstimator {
    #[must_use]
    pub fn new(monitor: VirtualMonitor) -> Self {
        Self {
            monitor,
            spheres: EyeSphereTracker::new(),
            smoother: GazeSmoother::default(),
            previous_axes: None,
        }
    }

    /// Produce the geometric gaze estimate for one frame.
    ///
    /// Missing iris landmarks drop to an eye-center plus pose-offset
    /// heuristic at reduced confidence instead of failing the frame.
    pub fn estimate(
        &mut self,
        frame: &FaceFrame,
        left_iris: Option<Point3>,
        right_iris: Option<Point3>,
    ) -> Option<GazeEstimate> {
        let face = compute_face_coordinate_system(&frame.nose, self.previous_axes.as_ref())?;
        self.previous_axes = Some(face.axes);

        let (Some(left), Some(right)) = (left_iris, right_iris) else {
            return Some(self.fallback_estimate(frame));
        };

        let left_iris = Vector3::new(left.x, left.y, left.z);
        let right_iris = Vector3::new(right.x, right.y, right.z);

        if !self.spheres.is_ready() {
            self.spheres.calibrate(&face, left_iris, right_iris);
        }

        let (left_sphere, right_sphere) = self.spheres.track(&face);
        let ray = combined_gaze(&left_sphere, &right_sphere, left_iris, right_iris);
        let smoothed = Ray {
            origin: ray.origin,
            direction: self.smoother.add_sample(ray.direction),
        };

        let Some(intersection) = self.monitor.intersect(&smoothed) else {
            return Some(self.fallback_estimate(frame));
        };

        let screen = self.monitor.to_screen(intersection);
        let confidence = if self.spheres.is_ready() {
            CONFIDENCE_CALIBRATED
        } else {
            CONFIDENCE_UNCALIBRATED
        };

        Some(GazeEstimate {
            x: clamp01(screen.x),
            y: clamp01(screen.y),
            confidence,
            source: GazeSource::Geometry,
        })
    }

    /// Head-pose-only heuristic used when iris data is unavailable
    fn fallback_estimate(&self, frame: &FaceFrame) -> GazeEstimate {
        GazeEstimate {
            x: clamp01(0.5 - frame.head_yaw * FALLBACK_YAW_GAIN),
            y: clamp01(0.5 + frame.head_pitch * FALLBACK_PITCH_GAIN),
            confidence: CONFIDENCE_FALLBACK,
            source: GazeSource::Geometry,
        }
    }

    /// Whether the one-shot eye-sphere calibration has completed
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.spheres.is_ready()
    }

    /// Start a fresh tracking session
    pub fn reset(&mut self) {
        self.spheres.reset();
        self.smoother.reset();
        self.previous_axes = None;
    }
}

impl Default for GeometryEstimator {
    fn default() -> Self {
        Self::new(VirtualMonitor::default())
    }
}
