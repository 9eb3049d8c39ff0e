//! Least-squares ellipse fitting for iris center and diameter estimation.
//!
//! The iris boundary landmarks are fitted with a general conic
//! `Ax² + Bxy + Cy² + Dx + Ey + F = 0` (F fixed at -1), then the geometric
//! parameters are extracted algebraically. A near-circular fit is expected
//! for an iris, so confidence is derived from the axis ratio.

use nalgebra::{SMatrix, SVector};

use crate::constants::{EPSILON, IRIS_LANDMARK_COUNT};
use crate::frame::{Point2, Point3};

/// Geometric ellipse parameters from a conic fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseParams {
    pub center: Point2,
    pub major_axis: f64,
    pub minor_axis: f64,
    /// Rotation angle in radians
    pub angle: f64,
    /// Fit quality in [0, 1]; 0 signals a degenerate fit
    pub confidence: f64,
}

impl EllipseParams {
    /// Diameter estimate used for pupil dilation tracking
    #[must_use]
    pub fn diameter(&self) -> f64 {
        (self.major_axis + self.minor_axis) / 2.0
    }

    fn degenerate(center: Point2) -> Self {
        Self {
            center,
            major_axis: 0.0,
            minor_axis: 0.0,
            angle: 0.0,
            confidence: 0.0,
        }
    }
}

/// Per-eye iris observation derived from the boundary landmarks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrisObservation {
    pub center: Point3,
    pub diameter: f64,
    pub confidence: f64,
    pub major_axis: f64,
    pub minor_axis: f64,
    pub angle: f64,
}

/// Fit an ellipse to a set of 2D points by least squares.
///
/// Fewer than 5 points cannot determine a conic: the centroid is returned
/// with zero axes and confidence 0. A near-singular conic discriminant also
/// yields a zero-confidence result rather than an error.
#[must_use]
pub fn fit_ellipse(points: &[Point2]) -> EllipseParams {
    if points.len() < 5 {
        log::debug!(
            "ellipse fit needs at least 5 points, got {}; falling back to centroid",
            points.len()
        );
        return EllipseParams::degenerate(centroid(points));
    }

    // Normalize to the centroid at unit scale for numerical stability
    let c = centroid(points);
    let scale = normalization_scale(points, c);

    // Normal equations for [A, B, C, D, E] with the conic constrained to
    // Ax² + Bxy + Cy² + Dx + Ey = 1
    let mut ata = SMatrix::<f64, 5, 5>::zeros();
    let mut atb = SVector::<f64, 5>::zeros();
    for p in points {
        let x = (p.x - c.x) * scale;
        let y = (p.y - c.y) * scale;
        let row = SVector::<f64, 5>::from([x * x, x * y, y * y, x, y]);
        ata += row * row.transpose();
        atb += row;
    }

    let Some(coeffs) = ata.lu().solve(&atb) else {
        return EllipseParams::degenerate(Point2::new(0.0, 0.0));
    };

    match extract_parameters(&coeffs) {
        Some(mut ellipse) => {
            // Undo the normalization
            ellipse.center.x = ellipse.center.x / scale + c.x;
            ellipse.center.y = ellipse.center.y / scale + c.y;
            ellipse.major_axis /= scale;
            ellipse.minor_axis /= scale;
            ellipse
        }
        None => EllipseParams::degenerate(Point2::new(0.0, 0.0)),
    }
}

/// Fit the 5 iris boundary landmarks of one eye
#[must_use]
pub fn fit_iris(boundary: &[Point3; IRIS_LANDMARK_COUNT]) -> IrisObservation {
    let points: Vec<Point2> = boundary.iter().map(Point3::xy).collect();
    let ellipse = fit_ellipse(&points);
    let z = boundary.iter().map(|p| p.z).sum::<f64>() / boundary.len() as f64;

    IrisObservation {
        center: Point3::new(ellipse.center.x, ellipse.center.y, z),
        diameter: ellipse.diameter(),
        confidence: ellipse.confidence,
        major_axis: ellipse.major_axis,
        minor_axis: ellipse.minor_axis,
        angle: ellipse.angle,
    }
}

/// Extract center, axes and rotation from conic coefficients (F = -1)
fn extract_parameters(coeffs: &SVector<f64, 5>) -> Option<EllipseParams> {
    let (a, b, c, d, e) = (coeffs[0], coeffs[1], coeffs[2], coeffs[3], coeffs[4]);
    let f = -1.0;

    let den = b * b - 4.0 * a * c;
    if den.abs() < EPSILON {
        return None;
    }

    let h = (2.0 * c * d - b * e) / den;
    let k = (2.0 * a * e - b * d) / den;
    let theta = b.atan2(a - c) / 2.0;

    let num = 2.0 * (a * e * e + c * d * d - b * d * e + den * f);
    let sqrt_term = ((a - c) * (a - c) + b * b).sqrt();

    let t1 = num * (a + c - sqrt_term);
    let t2 = num * (a + c + sqrt_term);
    if t1 < 0.0 || t2 < 0.0 {
        return None;
    }

    let axis1 = (t1.sqrt() / den).abs();
    let axis2 = (t2.sqrt() / den).abs();
    if !axis1.is_finite() || !axis2.is_finite() {
        return None;
    }

    let major = axis1.max(axis2);
    let minor = axis1.min(axis2);
    if major < EPSILON {
        return None;
    }

    let eccentricity = (major - minor) / major;
    let confidence = (1.0 - eccentricity).clamp(0.0, 1.0);

    Some(EllipseParams {
        center: Point2::new(h, k),
        major_axis: major,
        minor_axis: minor,
        angle: theta,
        confidence,
    })
}

fn centroid(points: &[Point2]) -> Point2 {
    if points.is_empty() {
        return Point2::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    Point2::new(
        points.iter().map(|p| p.x).sum::<f64>() / n,
        points.iter().map(|p| p.y).sum::<f64>() / n,
    )
}

fn normalization_scale(points: &[Point2], center: Point2) -> f64 {
    let n = points.len() as f64;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - center.x).hypot(p.y - center.y))
        .sum::<f64>()
        / n;
    if mean_dist > EPSILON {
        1.0 / mean_dist
    } else {
        1.0
    }
}

/// Tracks pupil diameter relative to a slowly adapting baseline.
///
/// The baseline follows an exponential moving average so gradual lighting
/// changes are absorbed while short-term dilation still registers.
#[derive(Debug, Clone)]
pub struct DilationTracker {
    baseline: Option<f64>,
    alpha: f64,
}

impl DilationTracker {
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            baseline: None,
            alpha,
        }
    }

    /// Update with a new diameter sample and return the dilation ratio
    /// (current / baseline). The first sample establishes the baseline.
    pub fn update(&mut self, diameter: f64) -> f64 {
        if diameter <= 0.0 {
            return 1.0;
        }

        match self.baseline {
            None => {
                self.baseline = Some(diameter);
                1.0
            }
            Some(baseline) => {
                let ratio = diameter / baseline;
                self.baseline = Some(baseline + self.alpha * (diameter - baseline));
                ratio
            }
        }
    }

    #[must_use]
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

impl Default for DilationTracker {
    fn default() -> Self {
        Self::new(0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_points(cx: f64, cy: f64, r: f64, n: usize) -> Vec<Point2> {
        (0..n)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                Point2::new(cx + r * t.cos(), cy + r * t.sin())
            })
            .collect()
    }

    #[test]
    fn test_too_few_points_returns_centroid() {
        let points = vec![
            Point2::new(1.0, 1.0),
            Point2::new(3.0, 1.0),
            Point2::new(2.0, 4.0),
        ];
        let ellipse = fit_ellipse(&points);
        assert_eq!(ellipse.confidence, 0.0);
        assert!((ellipse.center.x - 2.0).abs() < 1e-12);
        assert!((ellipse.center.y - 2.0).abs() < 1e-12);
        assert_eq!(ellipse.major_axis, 0.0);
        assert_eq!(ellipse.minor_axis, 0.0);
    }

    #[test]
    fn test_circle_recovery() {
        let points = circle_points(100.0, 50.0, 10.0, 8);
        let ellipse = fit_ellipse(&points);

        assert!((ellipse.center.x - 100.0).abs() < 1e-6);
        assert!((ellipse.center.y - 50.0).abs() < 1e-6);
        assert!((ellipse.major_axis - 10.0).abs() < 1e-6);
        assert!((ellipse.minor_axis - 10.0).abs() < 1e-6);
        assert!(ellipse.confidence > 0.99);
        assert!((ellipse.diameter() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_axis_aligned_ellipse() {
        let points: Vec<Point2> = (0..10)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * i as f64 / 10.0;
                Point2::new(5.0 * t.cos(), 2.0 * t.sin())
            })
            .collect();
        let ellipse = fit_ellipse(&points);

        assert!((ellipse.major_axis - 5.0).abs() < 1e-6);
        assert!((ellipse.minor_axis - 2.0).abs() < 1e-6);
        // Elongated fit reads as low confidence for an iris
        assert!(ellipse.confidence < 0.5);
    }

    #[test]
    fn test_degenerate_coincident_points() {
        let points = vec![Point2::new(1.0, 1.0); 6];
        let ellipse = fit_ellipse(&points);
        assert_eq!(ellipse.confidence, 0.0);
    }

    #[test]
    fn test_fit_iris_five_points() {
        let boundary: Vec<Point2> = circle_points(10.0, 20.0, 3.0, 5);
        let mut pts = [Point3::default(); 5];
        for (i, p) in boundary.iter().enumerate() {
            pts[i] = Point3::new(p.x, p.y, 1.5);
        }

        let obs = fit_iris(&pts);
        assert!((obs.center.x - 10.0).abs() < 1e-6);
        assert!((obs.center.y - 20.0).abs() < 1e-6);
        assert!((obs.center.z - 1.5).abs() < 1e-12);
        assert!((obs.diameter - 3.0).abs() < 1e-6);
        assert!(obs.confidence > 0.99);
    }

    #[test]
    fn test_dilation_tracker() {
        let mut tracker = DilationTracker::new(0.1);
        assert_eq!(tracker.update(10.0), 1.0);

        // Sudden dilation registers against the slow baseline
        let ratio = tracker.update(12.0);
        assert!((ratio - 1.2).abs() < 1e-12);

        // Baseline drifts toward the new diameter
        let baseline = tracker.baseline().unwrap();
        assert!(baseline > 10.0 && baseline < 12.0);
    }

    #[test]
    fn test_dilation_tracker_ignores_invalid() {
        let mut tracker = DilationTracker::default();
        tracker.update(10.0);
        assert_eq!(tracker.update(0.0), 1.0);
        assert_eq!(tracker.baseline(), Some(10.0));
    }
}
