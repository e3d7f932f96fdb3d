// session.rs: wires sensors, fusion and the render loop into one driver
//
// Everything runs on the task that calls `run`: sensor tasks only push into
// channels, and the select loop below is the single writer of fusion state.

use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};

use crate::anchor::{Anchor, AnchorState};
use crate::config::ArConfig;
use crate::error::{ArError, ArResult};
use crate::fusion::{FusionEvent, SensorFusionController};
use crate::health::HealthMonitor;
use crate::render_loop::{RenderLoop, SessionState};
use crate::sensors::{
    CameraSource, GeolocationSensor, HeadingSensor, MapInset, Notice, NoticeLevel, Renderer,
    StatusSink, Subscription, UserGesture, VideoStream,
};
use crate::status::ArStatus;
use crate::types::{current_timestamp, GeolocationEvent, HeadingSample, SensorFault, SensorKind};

/// Inset zoom applied when the reference frame locks
pub const MAP_ZOOM_ON_LOCK: u8 = 18;

const COMMAND_CAPACITY: usize = 16;

/// The platform pieces a session drives
pub struct Collaborators {
    pub geolocation: Box<dyn GeolocationSensor>,
    pub heading: Box<dyn HeadingSensor>,
    pub camera: Box<dyn CameraSource>,
    pub renderer: Box<dyn Renderer>,
    pub map: Option<Box<dyn MapInset>>,
    pub status: Box<dyn StatusSink>,
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Stop,
    ResetReference,
    Resize { width: u32, height: u32 },
}

/// Sends commands to a running session from outside the select loop
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn stop(&self) -> bool {
        self.send(SessionCommand::Stop)
    }

    pub fn reset_reference(&self) -> bool {
        self.send(SessionCommand::ResetReference)
    }

    pub fn resize(&self, width: u32, height: u32) -> bool {
        self.send(SessionCommand::Resize { width, height })
    }

    fn send(&self, command: SessionCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Dropping session command {:?}: {}", command, err);
                false
            }
        }
    }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub final_state: SessionState,
    pub duration_secs: f64,
    pub frames_rendered: u64,
    pub fixes_received: u64,
    pub headings_accepted: u64,
    pub headings_discarded: u64,
    pub reference: Option<(f64, f64)>,
    pub notices: Vec<Notice>,
}

// ─── The session ─────────────────────────────────────────────────────────────

pub struct ArSession {
    session_id: String,
    config: ArConfig,

    geolocation: Box<dyn GeolocationSensor>,
    heading: Box<dyn HeadingSensor>,
    camera: Box<dyn CameraSource>,
    renderer: Box<dyn Renderer>,
    map: Option<Box<dyn MapInset>>,
    status: Box<dyn StatusSink>,

    fusion: SensorFusionController,
    render_loop: RenderLoop,
    health: HealthMonitor,

    video: Option<VideoStream>,
    subscriptions: Vec<Subscription>,
    geo_rx: Option<Receiver<GeolocationEvent>>,
    heading_rx: Option<Receiver<HeadingSample>>,
    commands_tx: Sender<SessionCommand>,
    commands_rx: Receiver<SessionCommand>,

    heading_enabled: bool,
    first_fix_deadline: Option<Instant>,
    started_at: Option<Instant>,
    notices: Vec<Notice>,
}

impl ArSession {
    pub fn new(config: ArConfig, collaborators: Collaborators) -> ArResult<Self> {
        config.validate()?;

        let anchor = Anchor::new(config.anchor_id.clone(), config.anchor_offset);
        let render_loop = RenderLoop::new(anchor, config.projection, config.visibility);
        let health = HealthMonitor::new(
            config.fix_stale_after(),
            config.heading_stale_after(),
            config.health_check_interval(),
        );
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        Ok(Self {
            session_id: format!("session_{}", Utc::now().timestamp_millis()),
            fusion: SensorFusionController::new(config.fusion.clone()),
            config,
            geolocation: collaborators.geolocation,
            heading: collaborators.heading,
            camera: collaborators.camera,
            renderer: collaborators.renderer,
            map: collaborators.map,
            status: collaborators.status,
            render_loop,
            health,
            video: None,
            subscriptions: Vec::new(),
            geo_rx: None,
            heading_rx: None,
            commands_tx,
            commands_rx,
            heading_enabled: false,
            first_fix_deadline: None,
            started_at: None,
            notices: Vec::new(),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.commands_tx.clone(),
        }
    }

    // ── Start-up ─────────────────────────────────────────────────────────

    /// Request permissions, open the camera and subscribe to both sensors.
    ///
    /// `gesture` must be present when the heading sensor only grants access
    /// from a user interaction; without it nothing is requested and the
    /// session stays idle. Camera or geolocation refusal stops the session.
    /// Orientation refusal only freezes the heading at 0.
    pub async fn start(&mut self, gesture: Option<UserGesture>) -> ArResult<()> {
        if self.state() != SessionState::Idle {
            return Err(ArError::InvalidTransition {
                from: self.state().to_string(),
                action: "start".to_string(),
            });
        }
        if self.heading.requires_user_gesture() && gesture.is_none() {
            let err = ArError::GestureRequired;
            self.notify_error(&err);
            return Err(err);
        }

        self.render_loop.begin_permissions()?;
        self.started_at = Some(Instant::now());
        log::info!("Starting {}", self.session_id);

        match self.camera.request_stream(self.config.camera_facing).await {
            Ok(stream) => {
                log::info!(
                    "Camera stream {} ({}x{})",
                    stream.id,
                    stream.width,
                    stream.height
                );
                self.video = Some(stream);
            }
            Err(err) => return self.fail(err),
        }

        if let Err(err) = self.geolocation.request_permission().await {
            return self.fail(err);
        }

        match self.heading.request_permission(gesture.as_ref()).await {
            Ok(()) => self.heading_enabled = true,
            Err(err) => self.degrade_heading(&err),
        }

        self.subscribe_sensors();
        self.render_loop.await_first_fix()?;
        self.first_fix_deadline = Some(Instant::now() + self.config.first_fix_timeout());

        self.probe_position().await
    }

    fn subscribe_sensors(&mut self) {
        let (geo_tx, geo_rx) = mpsc::channel(self.config.channel_capacity);
        let options = self.config.geolocation_options();
        self.subscriptions.push(self.geolocation.subscribe(geo_tx, options));
        self.geo_rx = Some(geo_rx);
        self.health.geolocation.update();

        if self.heading_enabled {
            let (heading_tx, heading_rx) = mpsc::channel(self.config.channel_capacity);
            self.subscriptions.push(self.heading.subscribe(heading_tx));
            self.heading_rx = Some(heading_rx);
            self.health.heading.update();
        }
    }

    /// One-shot position request. A fix locks the reference right away;
    /// anything short of a denial leaves the subscription to deliver one.
    async fn probe_position(&mut self) -> ArResult<()> {
        let probe_timeout = self.config.permission_probe_timeout();
        match timeout(probe_timeout, self.geolocation.request_once()).await {
            Ok(Ok(fix)) => self.handle_geolocation(GeolocationEvent::Fix(fix)),
            Ok(Err(SensorFault::PermissionDenied)) => {
                return self.fail(ArError::PermissionDenied(SensorKind::Geolocation))
            }
            Ok(Err(fault)) => log::info!("Position probe failed ({}), waiting on updates", fault),
            Err(_) => log::info!(
                "Position probe gave nothing within {:.0}s, waiting on updates",
                probe_timeout.as_secs_f64()
            ),
        }
        Ok(())
    }

    fn degrade_heading(&mut self, err: &ArError) {
        self.notify_error(err);
        self.heading_enabled = false;
        self.heading_rx = None;
        self.health.heading.stop_monitoring();
        log::warn!("Heading frozen at {:.0} degrees", self.fusion.current_heading());
    }

    // ── Main loop ────────────────────────────────────────────────────────

    /// Drive the session until `shutdown` resolves, a stop command arrives,
    /// or no fix shows up before the first-fix deadline.
    pub async fn run<F>(&mut self, shutdown: F) -> ArResult<SessionSummary>
    where
        F: Future<Output = ()>,
    {
        if !self.render_loop.is_rendering() {
            return Err(ArError::InvalidTransition {
                from: self.state().to_string(),
                action: "run".to_string(),
            });
        }

        tokio::pin!(shutdown);
        let mut frames = interval(self.config.frame_period());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut health_checks = interval(self.health.check_interval);
        health_checks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.render_loop.is_rendering() {
            let deadline = self.first_fix_deadline;
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
                command = self.commands_rx.recv() => {
                    if let Some(command) = command {
                        self.apply_command(command);
                    }
                }
                _ = wait_until(deadline) => {
                    let err = ArError::FirstFixTimeout(self.config.first_fix_timeout());
                    return self.fail(err);
                }
                // Frames ahead of the sensors so a busy stream cannot stall them
                _ = frames.tick() => self.frame(),
                event = next_event(&mut self.geo_rx) => match event {
                    Some(event) => self.handle_geolocation(event),
                    None => self.stream_ended(SensorKind::Geolocation),
                },
                sample = next_event(&mut self.heading_rx) => match sample {
                    Some(sample) => self.handle_heading(sample),
                    None => self.stream_ended(SensorKind::Orientation),
                },
                _ = health_checks.tick() => self.check_health(),
            }
        }

        self.stop();
        Ok(self.summary())
    }

    fn apply_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Stop => self.stop(),
            SessionCommand::ResetReference => {
                if let Err(err) = self.reset_reference() {
                    log::warn!("Reset ignored: {}", err);
                }
            }
            SessionCommand::Resize { width, height } => self.resize(width, height),
        }
    }

    fn handle_geolocation(&mut self, event: GeolocationEvent) {
        if !self.render_loop.is_rendering() {
            return;
        }
        match event {
            GeolocationEvent::Fix(fix) => {
                let events = self.fusion.on_geodetic_fix(&fix);
                if !fix.is_valid() {
                    return;
                }
                // A fix after a runtime revocation means the stream is back
                self.health.geolocation.resume();
                let locked_now = events
                    .iter()
                    .any(|e| matches!(e, FusionEvent::ReferenceLocked { .. }));
                self.apply_fusion_events(events);
                if !locked_now {
                    if let Some(map) = self.map.as_mut() {
                        map.set_view(fix.latitude, fix.longitude, None);
                    }
                }
            }
            GeolocationEvent::Fault(fault) => {
                let events = self.fusion.on_geolocation_fault(fault);
                self.apply_fusion_events(events);
                if fault == SensorFault::PermissionDenied {
                    // Revoked mid-session: no more fixes will come
                    self.health.geolocation.stop_monitoring();
                }
            }
        }
    }

    fn apply_fusion_events(&mut self, events: Vec<FusionEvent>) {
        for event in events {
            match event {
                FusionEvent::ReferenceLocked { lat, lon } => {
                    if let Some(map) = self.map.as_mut() {
                        map.set_view(lat, lon, Some(MAP_ZOOM_ON_LOCK));
                    }
                    self.first_fix_deadline = None;
                    if let Err(err) = self.render_loop.activate() {
                        log::warn!("{}", err);
                    }
                    self.notify(Notice::info(format!("Anchored at {:.6}, {:.6}", lat, lon)));
                }
                FusionEvent::GeolocationFault(fault) => {
                    self.notify(Notice::warning(format!("Location: {}", fault)))
                }
                FusionEvent::GeolocationRecovered => self.notify(Notice::info("Location restored")),
                FusionEvent::BeyondValidRange { distance_m } => self.notify(Notice::warning(format!(
                    "{:.0} m from the anchor origin, placement may drift",
                    distance_m
                ))),
                FusionEvent::BackInValidRange { .. }
                | FusionEvent::ReferenceReset
                | FusionEvent::FixRejected { .. }
                | FusionEvent::HeadingDiscarded { .. } => {}
            }
        }
    }

    fn handle_heading(&mut self, sample: HeadingSample) {
        if !self.render_loop.is_rendering() || !self.heading_enabled {
            return;
        }
        if sample.usable_degrees().is_some() {
            self.health.heading.update();
        }
        self.fusion.on_heading_sample(&sample);
    }

    fn stream_ended(&mut self, sensor: SensorKind) {
        match sensor {
            SensorKind::Geolocation => {
                self.geo_rx = None;
                self.health.geolocation.stop_monitoring();
            }
            _ => {
                self.heading_rx = None;
                self.heading_enabled = false;
                self.health.heading.stop_monitoring();
            }
        }
        self.notify(Notice::warning(format!("The {} stream ended", sensor)));
    }

    fn frame(&mut self) {
        let snapshot = self.fusion.snapshot();
        self.render_loop.tick(&snapshot, self.renderer.as_mut());
    }

    fn check_health(&mut self) {
        log::debug!("{}", self.health.format_status());
        for change in self.health.check() {
            if let Some(err) = change.as_error() {
                self.notify_error(&err);
            }
        }
    }

    // ── External controls ────────────────────────────────────────────────

    /// Cancel both subscriptions and release the camera. Idempotent.
    pub fn stop(&mut self) {
        if !self.render_loop.stop() {
            return;
        }
        for mut subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        self.geo_rx = None;
        self.heading_rx = None;
        self.video = None;
        self.first_fix_deadline = None;
        log::info!(
            "{} stopped after {} frames",
            self.session_id,
            self.render_loop.frames_rendered()
        );
    }

    /// Drop the reference so the next fix becomes the new origin
    pub fn reset_reference(&mut self) -> ArResult<()> {
        if self.state() != SessionState::Active {
            return Err(ArError::InvalidTransition {
                from: self.state().to_string(),
                action: "reset the reference".to_string(),
            });
        }
        self.fusion.reset_reference();
        self.render_loop.await_first_fix()?;
        self.first_fix_deadline = Some(Instant::now() + self.config.first_fix_timeout());
        self.notify(Notice::info("Reference reset, waiting for a new fix"));
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.render_loop.resize(width, height);
        self.renderer.resize(width, height);
    }

    // ── Notices ──────────────────────────────────────────────────────────

    fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => log::info!("{}", notice.message),
            NoticeLevel::Warning => log::warn!("{}", notice.message),
            NoticeLevel::Error => log::error!("{}", notice.message),
        }
        self.status.show(&notice);
        self.notices.push(notice);
    }

    fn notify_error(&mut self, err: &ArError) {
        self.notify(Notice::from(err));
    }

    fn fail<T>(&mut self, err: ArError) -> ArResult<T> {
        self.notify_error(&err);
        self.stop();
        Err(err)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.render_loop.state()
    }

    pub fn anchor_state(&self) -> AnchorState {
        self.render_loop.anchor_state()
    }

    pub fn camera_yaw(&self) -> f64 {
        self.render_loop.camera_yaw()
    }

    pub fn fusion(&self) -> &SensorFusionController {
        &self.fusion
    }

    pub fn video(&self) -> Option<&VideoStream> {
        self.video.as_ref()
    }

    pub fn heading_enabled(&self) -> bool {
        self.heading_enabled
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn uptime_secs(&self) -> f64 {
        self.started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            final_state: self.state(),
            duration_secs: self.uptime_secs(),
            frames_rendered: self.render_loop.frames_rendered(),
            fixes_received: self.fusion.fixes_received(),
            headings_accepted: self.fusion.headings_accepted(),
            headings_discarded: self.fusion.headings_discarded(),
            reference: self.fusion.reference().coordinates().ok(),
            notices: self.notices.clone(),
        }
    }

    pub fn status(&self) -> ArStatus {
        let snapshot = self.fusion.snapshot();
        let reference = snapshot.reference.coordinates().ok();
        let anchor = self.render_loop.anchor_state();

        ArStatus {
            timestamp: current_timestamp(),
            generated_at: Utc::now().to_rfc3339(),
            state: self.state(),
            uptime_seconds: self.uptime_secs(),
            frames_rendered: self.render_loop.frames_rendered(),
            fixes_received: self.fusion.fixes_received(),
            fixes_rejected: self.fusion.fixes_rejected(),
            headings_accepted: self.fusion.headings_accepted(),
            headings_discarded: self.fusion.headings_discarded(),
            heading_enabled: self.heading_enabled,
            reference_locked: snapshot.reference.is_locked(),
            reference_lat: reference.map(|(lat, _)| lat),
            reference_lon: reference.map(|(_, lon)| lon),
            distance_from_reference_m: self.fusion.distance_from_reference(),
            beyond_valid_range: snapshot.beyond_valid_range,
            fix_lat: snapshot.fix.as_ref().map(|f| f.latitude),
            fix_lon: snapshot.fix.as_ref().map(|f| f.longitude),
            fix_accuracy: snapshot.fix.as_ref().map(|f| f.accuracy),
            geolocation_fault: snapshot.fault.map(|f| f.to_string()),
            heading_deg: snapshot.heading_deg,
            camera_yaw_deg: self.render_loop.camera_yaw(),
            anchor_id: self.render_loop.anchor().id.clone(),
            anchor_local: anchor.local_position.map(|p| [p.x, p.y, p.z]),
            anchor_visible: anchor.visible,
            health: self.health.report(),
            notices: self.notices.clone(),
        }
    }
}

async fn next_event<T>(rx: &mut Option<Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
