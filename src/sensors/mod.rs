//! Boundaries to the platform: sensors, camera, renderer, map inset, UI
//!
//! Sensors push into tokio channels from tasks they spawn themselves; each
//! subscription hands back a [`Subscription`] that owns the task.

pub mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

use crate::error::ArError;
use crate::render_loop::FrameOutput;
use crate::types::{current_timestamp, GeodeticFix, GeolocationEvent, HeadingSample, SensorFault};

/// Cancellation handle for a sensor stream. Dropping it also cancels.
pub struct Subscription {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("Cancelled {} subscription", self.name);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    /// Oldest cached position the platform may return
    pub max_cache_age: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_cache_age: Duration::from_millis(1000),
        }
    }
}

/// Proof that a request happens inside a user interaction (tap, click)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UserGesture {
    pub timestamp: f64,
}

impl UserGesture {
    pub fn now() -> Self {
        Self {
            timestamp: current_timestamp(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    /// Rear camera, looking at the world
    #[default]
    Environment,
    User,
}

/// Handle to a live camera feed. Only its existence matters here.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoStream {
    pub id: String,
    pub facing: CameraFacing,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait GeolocationSensor: Send + Sync {
    async fn request_permission(&self) -> Result<(), ArError>;

    /// One-shot position request
    async fn request_once(&self) -> Result<GeodeticFix, SensorFault>;

    /// Stream fixes and faults into `tx` until the subscription is cancelled
    /// or the receiver is dropped
    fn subscribe(&self, tx: Sender<GeolocationEvent>, options: GeolocationOptions) -> Subscription;
}

#[async_trait]
pub trait HeadingSensor: Send + Sync {
    /// Some platforms only grant orientation access from a user gesture
    fn requires_user_gesture(&self) -> bool;

    async fn request_permission(&self, gesture: Option<&UserGesture>) -> Result<(), ArError>;

    fn subscribe(&self, tx: Sender<HeadingSample>) -> Subscription;
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn request_stream(&self, facing: CameraFacing) -> Result<VideoStream, ArError>;
}

/// External 3D renderer
pub trait Renderer: Send {
    fn draw(&mut self, frame: &FrameOutput);

    fn resize(&mut self, width: u32, height: u32);
}

/// Secondary inset map following the live fix
pub trait MapInset: Send {
    fn set_view(&mut self, lat: f64, lon: f64, zoom: Option<u8>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

impl From<&ArError> for Notice {
    fn from(error: &ArError) -> Self {
        let level = if error.is_terminal() {
            NoticeLevel::Error
        } else {
            NoticeLevel::Warning
        };
        Self {
            level,
            message: error.to_string(),
        }
    }
}

/// UI surface that renders notices
pub trait StatusSink: Send {
    fn show(&mut self, notice: &Notice);
}
