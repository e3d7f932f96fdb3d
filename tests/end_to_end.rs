use std::time::Duration;

use approx::assert_abs_diff_eq;
use geo_anchor::sensors::mock::{
    MockCamera, MockCompass, MockGeolocation, RecordingMap, RecordingRenderer, RecordingStatus,
};
use geo_anchor::sensors::UserGesture;
use geo_anchor::{
    Anchor, ArConfig, ArSession, CameraProjection, Collaborators, GeodeticFix, GeodeticOffset,
    GeolocationEvent, HeadingSample, RenderLoop, SensorFusionController, SessionState,
    VisibilityMode,
};

const PARIS: (f64, f64) = (48.8566, 2.3522);

fn paris_fix() -> GeodeticFix {
    GeodeticFix::new(PARIS.0, PARIS.1, 5.0, 0.0)
}

#[test]
fn anchor_north_of_first_fix_follows_heading() {
    for mode in [VisibilityMode::Frustum, VisibilityMode::ForwardCone] {
        let mut fusion = SensorFusionController::default();
        let mut render = RenderLoop::new(
            Anchor::new("cube", GeodeticOffset::default()),
            CameraProjection::default(),
            mode,
        );
        let mut renderer = RecordingRenderer::new();
        render.begin_permissions().unwrap();
        render.await_first_fix().unwrap();

        fusion.on_geodetic_fix(&paris_fix());
        assert_eq!(fusion.reference().coordinates(), Ok(PARIS));
        render.activate().unwrap();

        fusion.on_heading_sample(&HeadingSample::absolute(0.0, 1.0));
        let frame = render.tick(&fusion.snapshot(), &mut renderer).unwrap();
        let position = frame.anchor.local_position.unwrap();
        assert_abs_diff_eq!(position.x, 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(position.z, 5.0, epsilon = 0.05);
        assert!(frame.anchor.visible);

        fusion.on_heading_sample(&HeadingSample::absolute(170.0, 2.0));
        let frame = render.tick(&fusion.snapshot(), &mut renderer).unwrap();
        assert!(!frame.anchor.visible);
        // Position does not depend on heading
        assert_eq!(frame.anchor.local_position, Some(position));
    }
}

#[test]
fn later_fixes_do_not_move_the_anchor() {
    let mut fusion = SensorFusionController::default();
    let mut render = RenderLoop::new(
        Anchor::new("cube", GeodeticOffset::default()),
        CameraProjection::default(),
        VisibilityMode::Frustum,
    );
    let mut renderer = RecordingRenderer::new();
    render.begin_permissions().unwrap();
    render.await_first_fix().unwrap();

    fusion.on_geodetic_fix(&paris_fix());
    let first = render.tick(&fusion.snapshot(), &mut renderer).unwrap();

    fusion.on_geodetic_fix(&GeodeticFix::new(48.8570, 2.3530, 4.0, 5.0));
    let second = render.tick(&fusion.snapshot(), &mut renderer).unwrap();
    assert_eq!(first.anchor.local_position, second.anchor.local_position);
}

#[tokio::test(start_paused = true)]
async fn simulated_session_end_to_end() {
    let geo = MockGeolocation::scripted(vec![
        (Duration::from_millis(200), GeolocationEvent::Fix(paris_fix())),
        (
            Duration::from_secs(1),
            GeolocationEvent::Fix(GeodeticFix::new(48.85661, 2.35221, 4.0, 1.2)),
        ),
    ]);
    let compass = MockCompass::scripted(vec![
        (Duration::from_millis(500), HeadingSample::absolute(0.0, 0.5)),
        (Duration::from_secs(1), HeadingSample::relative(170.0, 1.5)),
        (Duration::from_millis(500), HeadingSample::absolute(170.0, 2.0)),
    ])
    .gesture_gated();
    let renderer = RecordingRenderer::new();
    let map = RecordingMap::new();
    let status = RecordingStatus::new();

    let mut session = ArSession::new(
        ArConfig::default(),
        Collaborators {
            geolocation: Box::new(geo.clone()),
            heading: Box::new(compass.clone()),
            camera: Box::new(MockCamera::default()),
            renderer: Box::new(renderer.clone()),
            map: Some(Box::new(map.clone())),
            status: Box::new(status.clone()),
        },
    )
    .unwrap();

    session.start(Some(UserGesture::now())).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let summary = session.run(tokio::time::sleep(Duration::from_secs(3))).await.unwrap();
    assert_eq!(summary.final_state, SessionState::Stopped);
    assert_eq!(summary.reference, Some(PARIS));
    assert_eq!(summary.headings_accepted, 2);
    assert_eq!(summary.headings_discarded, 1);

    let frames = renderer.frames();
    let visible_north = frames
        .iter()
        .filter(|f| f.camera.yaw_deg == 0.0 && f.anchor.visible)
        .count();
    assert!(visible_north > 0);
    // The relative sample never turned the camera
    assert!(frames
        .iter()
        .all(|f| f.camera.yaw_deg == 0.0 || f.camera.yaw_deg == 170.0));
    assert!(!frames.last().unwrap().anchor.visible);

    let views = map.views();
    assert_eq!(views[0].zoom, Some(18));
    assert!(views.len() >= 2);

    let json = serde_json::to_value(session.status()).unwrap();
    assert_eq!(json["state"], "Stopped");
    assert_eq!(json["reference_locked"], true);
}
