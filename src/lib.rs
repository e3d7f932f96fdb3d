//! Geo-anchored camera overlay
//!
//! Fuses a geolocation stream and a compass heading into a local metric
//! frame, keeps a virtual anchor pinned at a fixed geodetic offset from the
//! first fix, and decides each frame whether the anchor is in the camera's
//! view.

pub mod anchor;
pub mod config;
pub mod error;
pub mod fusion;
pub mod geodetic;
pub mod health;
pub mod reference_frame;
pub mod render_loop;
pub mod sensors;
pub mod session;
pub mod status;
pub mod types;
pub mod visibility;

pub use anchor::{Anchor, AnchorState, GeodeticOffset};
pub use config::ArConfig;
pub use error::{ArError, ArResult};
pub use fusion::{FusionConfig, FusionEvent, FusionSnapshot, SensorFusionController};
pub use reference_frame::ReferenceFrame;
pub use render_loop::{FrameOutput, RenderLoop, SessionState};
pub use session::{ArSession, Collaborators, SessionHandle, SessionSummary};
pub use status::ArStatus;
pub use types::{GeodeticFix, GeolocationEvent, HeadingSample, LocalPoint, SensorFault, SensorKind};
pub use visibility::{CameraProjection, CameraState, VisibilityEvaluator, VisibilityMode};
