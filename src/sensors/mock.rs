//! Simulated platform used by the binary and the tests
//!
//! Geolocation and compass feeds are either scripted (exact events after
//! exact delays) or generated (a steady walk, a sweeping compass). The
//! recording sinks share their logs through `Arc<Mutex<_>>` so a test can
//! keep a clone after handing the sink to a session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, sleep, MissedTickBehavior};

use super::{
    CameraFacing, CameraSource, GeolocationOptions, GeolocationSensor, HeadingSensor, MapInset,
    Notice, Renderer, StatusSink, Subscription, UserGesture, VideoStream,
};
use crate::error::ArError;
use crate::geodetic::{normalize_heading, offset_for_meters};
use crate::render_loop::FrameOutput;
use crate::types::{
    current_timestamp, GeodeticFix, GeolocationEvent, HeadingSample, SensorFault, SensorKind,
};

/// Counts live feed tasks; decremented when a task ends or is aborted
struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Send each event after its delay, then hold the channel open until the
/// receiver goes away
async fn play_script<T: Send + 'static>(tx: Sender<T>, script: Vec<(Duration, T)>) {
    for (delay, event) in script {
        sleep(delay).await;
        if tx.send(event).await.is_err() {
            return;
        }
    }
    tx.closed().await;
}

// ─── Geolocation ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum GeolocationFeed {
    Scripted(Vec<(Duration, GeolocationEvent)>),
    /// Straight walk from a start point at walking pace
    Walk {
        start_lat: f64,
        start_lon: f64,
        bearing_deg: f64,
        speed_mps: f64,
        period: Duration,
    },
}

#[derive(Clone)]
pub struct MockGeolocation {
    feed: GeolocationFeed,
    permission: Result<(), ArError>,
    once: Result<GeodeticFix, SensorFault>,
    active: Arc<AtomicUsize>,
}

impl MockGeolocation {
    /// The one-shot request answers with the first scripted fix
    pub fn scripted(script: Vec<(Duration, GeolocationEvent)>) -> Self {
        let once = script
            .iter()
            .find_map(|(_, event)| match event {
                GeolocationEvent::Fix(fix) => Some(fix.clone()),
                GeolocationEvent::Fault(_) => None,
            })
            .ok_or(SensorFault::PositionUnavailable);
        Self {
            feed: GeolocationFeed::Scripted(script),
            permission: Ok(()),
            once,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn walk(start_lat: f64, start_lon: f64, bearing_deg: f64, period: Duration) -> Self {
        Self {
            feed: GeolocationFeed::Walk {
                start_lat,
                start_lon,
                bearing_deg,
                speed_mps: 1.4,
                period,
            },
            permission: Ok(()),
            once: Ok(GeodeticFix::new(start_lat, start_lon, 5.0, current_timestamp())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission = Err(ArError::PermissionDenied(SensorKind::Geolocation));
        self
    }

    pub fn with_once(mut self, once: Result<GeodeticFix, SensorFault>) -> Self {
        self.once = once;
        self
    }

    /// Number of feed tasks still running
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeolocationSensor for MockGeolocation {
    async fn request_permission(&self) -> Result<(), ArError> {
        self.permission.clone()
    }

    async fn request_once(&self) -> Result<GeodeticFix, SensorFault> {
        self.permission
            .as_ref()
            .map_err(|_| SensorFault::PermissionDenied)?;
        self.once.clone()
    }

    fn subscribe(&self, tx: Sender<GeolocationEvent>, options: GeolocationOptions) -> Subscription {
        log::debug!(
            "Mock geolocation subscribed (high accuracy: {}, max age {:?})",
            options.high_accuracy,
            options.max_cache_age
        );
        let guard = StreamGuard::enter(&self.active);
        let feed = self.feed.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match feed {
                GeolocationFeed::Scripted(script) => play_script(tx, script).await,
                GeolocationFeed::Walk {
                    start_lat,
                    start_lon,
                    bearing_deg,
                    speed_mps,
                    period,
                } => walk_loop(tx, start_lat, start_lon, bearing_deg, speed_mps, period).await,
            }
        });
        Subscription::new("geolocation", handle)
    }
}

async fn walk_loop(
    tx: Sender<GeolocationEvent>,
    start_lat: f64,
    start_lon: f64,
    bearing_deg: f64,
    speed_mps: f64,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let bearing = bearing_deg.to_radians();
    let mut seq = 0u64;

    loop {
        ticker.tick().await;

        let walked = speed_mps * period.as_secs_f64() * seq as f64;
        let (d_lat, d_lon) =
            offset_for_meters(start_lat, walked * bearing.cos(), walked * bearing.sin());
        let fix = GeodeticFix::new(
            start_lat + d_lat,
            start_lon + d_lon,
            5.0 + (seq as f64 * 0.1).sin() * 2.0,
            current_timestamp(),
        )
        .with_speed(speed_mps);

        match tx.try_send(GeolocationEvent::Fix(fix)) {
            Ok(_) => seq += 1,
            Err(TrySendError::Closed(_)) => {
                log::debug!("Geolocation channel closed after {} fixes", seq);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this fix
            }
        }
    }
}

// ─── Compass ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum HeadingFeed {
    Scripted(Vec<(Duration, HeadingSample)>),
    /// Absolute heading turning `step_deg` every `period`
    Sweep {
        start_deg: f64,
        step_deg: f64,
        period: Duration,
    },
}

#[derive(Clone)]
pub struct MockCompass {
    feed: HeadingFeed,
    requires_gesture: bool,
    permission: Result<(), ArError>,
    active: Arc<AtomicUsize>,
}

impl MockCompass {
    pub fn scripted(script: Vec<(Duration, HeadingSample)>) -> Self {
        Self::with_feed(HeadingFeed::Scripted(script))
    }

    pub fn sweep(start_deg: f64, step_deg: f64, period: Duration) -> Self {
        Self::with_feed(HeadingFeed::Sweep {
            start_deg,
            step_deg,
            period,
        })
    }

    fn with_feed(feed: HeadingFeed) -> Self {
        Self {
            feed,
            requires_gesture: false,
            permission: Ok(()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Behave like platforms that gate orientation behind a user gesture
    pub fn gesture_gated(mut self) -> Self {
        self.requires_gesture = true;
        self
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission = Err(ArError::PermissionDenied(SensorKind::Orientation));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.permission = Err(ArError::SensorUnavailable(SensorKind::Orientation));
        self
    }

    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HeadingSensor for MockCompass {
    fn requires_user_gesture(&self) -> bool {
        self.requires_gesture
    }

    async fn request_permission(&self, gesture: Option<&UserGesture>) -> Result<(), ArError> {
        if self.requires_gesture && gesture.is_none() {
            return Err(ArError::GestureRequired);
        }
        self.permission.clone()
    }

    fn subscribe(&self, tx: Sender<HeadingSample>) -> Subscription {
        let guard = StreamGuard::enter(&self.active);
        let feed = self.feed.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match feed {
                HeadingFeed::Scripted(script) => play_script(tx, script).await,
                HeadingFeed::Sweep {
                    start_deg,
                    step_deg,
                    period,
                } => sweep_loop(tx, start_deg, step_deg, period).await,
            }
        });
        Subscription::new("heading", handle)
    }
}

async fn sweep_loop(tx: Sender<HeadingSample>, start_deg: f64, step_deg: f64, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heading = start_deg;

    loop {
        ticker.tick().await;

        let sample = HeadingSample::absolute(normalize_heading(heading), current_timestamp());
        match tx.try_send(sample) {
            Ok(_) => heading += step_deg,
            Err(TrySendError::Closed(_)) => break,
            Err(TrySendError::Full(_)) => {}
        }
    }
}

// ─── Camera ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct MockCamera {
    result: Result<(u32, u32), ArError>,
}

impl MockCamera {
    pub fn granted(width: u32, height: u32) -> Self {
        Self {
            result: Ok((width, height)),
        }
    }

    pub fn denied() -> Self {
        Self {
            result: Err(ArError::PermissionDenied(SensorKind::Camera)),
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::granted(1280, 720)
    }
}

#[async_trait]
impl CameraSource for MockCamera {
    async fn request_stream(&self, facing: CameraFacing) -> Result<VideoStream, ArError> {
        let (width, height) = self.result.clone()?;
        Ok(VideoStream {
            id: format!("mock-{:?}", facing).to_lowercase(),
            facing,
            width,
            height,
        })
    }
}

// ─── Recording sinks ─────────────────────────────────────────────────────────

fn snapshot_of<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().map(|items| items.clone()).unwrap_or_default()
}

#[derive(Clone, Default)]
pub struct RecordingRenderer {
    frames: Arc<Mutex<Vec<FrameOutput>>>,
    sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<FrameOutput> {
        snapshot_of(&self.frames)
    }

    pub fn last_frame(&self) -> Option<FrameOutput> {
        self.frames.lock().ok().and_then(|frames| frames.last().copied())
    }

    pub fn sizes(&self) -> Vec<(u32, u32)> {
        snapshot_of(&self.sizes)
    }
}

impl Renderer for RecordingRenderer {
    fn draw(&mut self, frame: &FrameOutput) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(*frame);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Ok(mut sizes) = self.sizes.lock() {
            sizes.push((width, height));
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapView {
    pub lat: f64,
    pub lon: f64,
    pub zoom: Option<u8>,
}

#[derive(Clone, Default)]
pub struct RecordingMap {
    views: Arc<Mutex<Vec<MapView>>>,
}

impl RecordingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn views(&self) -> Vec<MapView> {
        snapshot_of(&self.views)
    }
}

impl MapInset for RecordingMap {
    fn set_view(&mut self, lat: f64, lon: f64, zoom: Option<u8>) {
        if let Ok(mut views) = self.views.lock() {
            views.push(MapView { lat, lon, zoom });
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingStatus {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        snapshot_of(&self.notices)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.notices().iter().any(|n| n.message.contains(needle))
    }
}

impl StatusSink for RecordingStatus {
    fn show(&mut self, notice: &Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}
