//! Per-frame pipeline and the overlay state machine
//!
//! Each frame: camera yaw from the fused heading, anchor recomputed from the
//! reference frame, visibility decided, result handed to the renderer. Frames
//! only run in `AwaitingFirstFix` and `Active`; a tick in any other state is
//! dropped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::anchor::{Anchor, AnchorState};
use crate::error::{ArError, ArResult};
use crate::fusion::FusionSnapshot;
use crate::sensors::Renderer;
use crate::types::SensorFault;
use crate::visibility::{CameraProjection, CameraState, VisibilityEvaluator, VisibilityMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, nothing requested yet
    Idle,
    /// Waiting on camera, geolocation and orientation grants
    AwaitingPermissions,
    /// Rendering, but no reference frame yet
    AwaitingFirstFix,
    Active,
    /// Terminal
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPermissions => "awaiting permissions",
            SessionState::AwaitingFirstFix => "awaiting first fix",
            SessionState::Active => "active",
            SessionState::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// What the renderer receives every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    pub frame_index: u64,
    pub camera: CameraState,
    pub anchor: AnchorState,
    pub reference_locked: bool,
    pub fault: Option<SensorFault>,
}

pub struct RenderLoop {
    state: SessionState,
    anchor: Anchor,
    evaluator: VisibilityEvaluator,
    camera: CameraState,
    frames_rendered: u64,
}

impl RenderLoop {
    pub fn new(anchor: Anchor, projection: CameraProjection, mode: VisibilityMode) -> Self {
        Self {
            state: SessionState::Idle,
            anchor,
            evaluator: VisibilityEvaluator::new(projection, mode),
            camera: CameraState::default(),
            frames_rendered: 0,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn invalid(&self, action: &str) -> ArError {
        ArError::InvalidTransition {
            from: self.state.to_string(),
            action: action.to_string(),
        }
    }

    /// Idle → AwaitingPermissions
    pub fn begin_permissions(&mut self) -> ArResult<()> {
        match self.state {
            SessionState::Idle => {
                self.set_state(SessionState::AwaitingPermissions);
                Ok(())
            }
            _ => Err(self.invalid("request permissions")),
        }
    }

    /// AwaitingPermissions → AwaitingFirstFix, or Active → AwaitingFirstFix
    /// after a reference reset
    pub fn await_first_fix(&mut self) -> ArResult<()> {
        match self.state {
            SessionState::AwaitingPermissions | SessionState::Active => {
                self.set_state(SessionState::AwaitingFirstFix);
                Ok(())
            }
            SessionState::AwaitingFirstFix => Ok(()),
            SessionState::Idle | SessionState::Stopped => Err(self.invalid("wait for a fix")),
        }
    }

    /// AwaitingFirstFix → Active
    pub fn activate(&mut self) -> ArResult<()> {
        match self.state {
            SessionState::AwaitingFirstFix => {
                self.set_state(SessionState::Active);
                Ok(())
            }
            SessionState::Active => Ok(()),
            _ => Err(self.invalid("activate")),
        }
    }

    /// Any state → Stopped. Returns false when already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }
        self.set_state(SessionState::Stopped);
        self.anchor.set_visible(false);
        true
    }

    fn set_state(&mut self, next: SessionState) {
        log::info!("Session {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_rendering(&self) -> bool {
        matches!(
            self.state,
            SessionState::AwaitingFirstFix | SessionState::Active
        )
    }

    // ── Frame step ───────────────────────────────────────────────────────

    /// Run one frame against `snapshot` and hand the result to `renderer`.
    /// Returns `None` when the loop is not rendering.
    pub fn tick(&mut self, snapshot: &FusionSnapshot, renderer: &mut dyn Renderer) -> Option<FrameOutput> {
        if !self.is_rendering() {
            return None;
        }

        self.camera = CameraState::facing(snapshot.heading_deg);
        self.evaluator.update(&self.camera);

        let was_visible = self.anchor.is_visible();
        let visible = match self.anchor.recompute(&snapshot.reference) {
            Some(position) => self.evaluator.is_visible(&position),
            None => false,
        };
        self.anchor.set_visible(visible);
        if visible != was_visible {
            log::debug!(
                "Anchor {} {} at yaw {:.1}",
                self.anchor.id,
                if visible { "entered view" } else { "left view" },
                self.camera.yaw_deg
            );
        }

        let output = FrameOutput {
            frame_index: self.frames_rendered,
            camera: self.camera,
            anchor: self.anchor.state(),
            reference_locked: snapshot.reference.is_locked(),
            fault: snapshot.fault,
        };
        self.frames_rendered += 1;
        renderer.draw(&output);
        Some(output)
    }

    /// Follow the render surface; zero-sized surfaces are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.evaluator.set_aspect(width as f64 / height as f64);
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn camera_yaw(&self) -> f64 {
        self.camera.yaw_deg
    }

    pub fn anchor_state(&self) -> AnchorState {
        self.anchor.state()
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn projection(&self) -> &CameraProjection {
        self.evaluator.projection()
    }
}
