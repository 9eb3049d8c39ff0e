//! End-to-end tests of the five-stage calibration flow against synthetic
//! gaze data, including verification failure and profile persistence.

mod common;

use common::FRAME_MS;
use gaze_estimation::calibration::profile::{calibrated_gaze, GazeSample};
use gaze_estimation::calibration::{
    CalibrationConfig, CalibrationEvent, CalibrationSession, CalibrationStage, CORNER_TARGETS,
};
use gaze_estimation::frame::Point2;
use gaze_estimation::storage::{MemoryProfileStore, ProfileStore};

/// Iris offset exactly proportional to screen position by this factor
const K: f64 = 0.04;

fn raw_for_screen_pos(target: Point2, now_ms: f64) -> GazeSample {
    GazeSample {
        iris_offset_x: K * (target.x - 0.5),
        iris_offset_y: K * (target.y - 0.5),
        head_yaw: 0.0,
        head_pitch: 0.0,
        timestamp_ms: now_ms,
    }
}

fn center_raw(now_ms: f64) -> GazeSample {
    raw_for_screen_pos(Point2::new(0.5, 0.5), now_ms)
}

/// Drive the session to the corner stage by looking at screen center
fn run_to_corners(session: &mut CalibrationSession) -> f64 {
    session.record_camera_position(None, 0.0);
    let mut now = 0.0;
    while session.stage() == CalibrationStage::NaturalCenter {
        now += FRAME_MS;
        session.push_sample(now, center_raw(now), None);
        assert!(now < 10_000.0, "natural center never finished");
    }
    now
}

/// Complete all corner fixations with proportional synthetic data
fn run_corners(session: &mut CalibrationSession, now: &mut f64) {
    while session.stage() == CalibrationStage::CornerCalibration {
        let target = session.current_target().expect("corner target");
        *now += FRAME_MS;
        session.push_sample(*now, raw_for_screen_pos(target, *now), Some(target));
        assert!(*now < 120_000.0, "corner calibration never finished");
    }
}

/// Fixate every verification point using the profile's own calibrated gaze
fn run_verification(session: &mut CalibrationSession, now: &mut f64) -> Option<f64> {
    let mut score = None;
    while session.stage() == CalibrationStage::Verification {
        let target = session.current_target().expect("verification target");
        *now += FRAME_MS;

        // Look where the verification target is: the raw signal maps back
        // through the freshly calculated sensitivity
        let raw = raw_for_screen_pos(target, *now);
        // The horizontal mirror in the transform means a screen position x
        // is produced by the mirrored raw signal
        let mirrored = GazeSample {
            iris_offset_x: -raw.iris_offset_x,
            ..raw
        };
        let live = calibrated_gaze(
            Point2::new(mirrored.iris_offset_x, mirrored.iris_offset_y),
            mirrored.head_yaw,
            mirrored.head_pitch,
            session.profile(),
        );

        for event in session.push_sample(*now, mirrored, Some(live)) {
            if let CalibrationEvent::Completed { score: s } = event {
                score = Some(s);
            }
        }
        assert!(*now < 200_000.0, "verification never finished");
    }
    score
}

#[test]
fn full_calibration_produces_expected_sensitivity() {
    let mut session = CalibrationSession::new("reader", CalibrationConfig::default(), 0.0);
    let mut now = run_to_corners(&mut session);
    run_corners(&mut session, &mut now);

    assert_eq!(session.stage(), CalibrationStage::Verification);

    let sensitivity = session.profile().quick_calibration.sensitivity;
    assert!((sensitivity.base_x - 1.0 / K).abs() < 1e-6);
    assert!((sensitivity.base_y - 1.0 / K).abs() < 1e-6);

    let corners = &session.profile().quick_calibration.corners;
    assert_eq!(corners.len(), CORNER_TARGETS.len());
    for (corner, target) in corners.iter().zip(CORNER_TARGETS.iter()) {
        assert_eq!(corner.target, *target);
        assert!(corner.sample_count > 0);
    }
}

#[test]
fn verification_pass_completes_profile() {
    let mut session = CalibrationSession::new("reader", CalibrationConfig::default(), 0.0);
    let mut now = run_to_corners(&mut session);
    run_corners(&mut session, &mut now);

    let score = run_verification(&mut session, &mut now);
    assert_eq!(score, Some(1.0));
    assert_eq!(session.stage(), CalibrationStage::Completed);
    assert_eq!(session.profile().quick_calibration.verification_score, 1.0);
}

#[test]
fn verification_failure_discards_profile_and_restarts() {
    let mut session = CalibrationSession::new("reader", CalibrationConfig::default(), 0.0);
    let mut now = run_to_corners(&mut session);
    run_corners(&mut session, &mut now);

    // Stare at a fixed wrong point: every verification target times out
    let mut restarted = false;
    for _ in 0..3000 {
        now += FRAME_MS;
        let events = session.push_sample(now, center_raw(now), Some(Point2::new(0.05, 0.05)));
        if events
            .iter()
            .any(|e| matches!(e, CalibrationEvent::RestartRequired { score } if *score == 0.0))
        {
            restarted = true;
            break;
        }
    }

    assert!(restarted, "verification failure never surfaced");
    assert_eq!(session.stage(), CalibrationStage::CameraMarking);
    // The discarded profile left no corner data behind
    assert!(session.profile().quick_calibration.corners.is_empty());
}

#[test]
fn completed_profile_round_trips_through_store() {
    let mut session = CalibrationSession::new("reader-42", CalibrationConfig::default(), 0.0);
    let mut now = run_to_corners(&mut session);
    run_corners(&mut session, &mut now);
    run_verification(&mut session, &mut now).expect("verification should pass");

    let profile = session.into_profile();
    let mut store = MemoryProfileStore::new();
    store.save(&profile).unwrap();

    let loaded = store.load("reader-42").unwrap().unwrap();
    assert_eq!(loaded, profile);
    assert_eq!(loaded.quick_calibration.verification_score, 1.0);
}

#[test]
fn calibrated_gaze_recovers_screen_positions() {
    let mut session = CalibrationSession::new("reader", CalibrationConfig::default(), 0.0);
    let mut now = run_to_corners(&mut session);
    run_corners(&mut session, &mut now);

    // With the derived sensitivity, a raw observation proportional to a
    // screen position maps back near that position (modulo the mirror)
    let profile = session.profile();
    for &(sx, sy) in &[(0.3, 0.4), (0.7, 0.6), (0.5, 0.5)] {
        let raw = Point2::new(-K * (sx - 0.5), K * (sy - 0.5));
        let gaze = calibrated_gaze(raw, 0.0, 0.0, profile);
        assert!(
            (gaze.x - sx).abs() < 0.05,
            "x: expected ~{sx}, got {}",
            gaze.x
        );
        // The default camera position sits at the top: allow the small
        // constant parallax shift on y
        assert!(
            (gaze.y - sy).abs() < 0.05,
            "y: expected ~{sy}, got {}",
            gaze.y
        );
    }
}
